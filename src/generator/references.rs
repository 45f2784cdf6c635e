//! Table-reference check for generated SQL.
//!
//! Reports tables a statement reads that were not offered to the model.
//! Purely diagnostic: the SQL is never rewritten.

use sqlparser::ast::{Expr, ObjectName, Query, Statement, TableFactor, Visit, Visitor};
use sqlparser::dialect::SnowflakeDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;

#[derive(Default)]
struct RelationCollector {
    relations: Vec<String>,
    ctes: HashSet<String>,
}

impl RelationCollector {
    fn record_ctes(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_uppercase());
            }
        }
    }
}

// Queries are reached through statements, derived tables and subquery
// expressions; each may carry its own WITH clause.
impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        if let Statement::Query(query) = statement {
            self.record_ctes(query);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        if let TableFactor::Derived { subquery, .. } = table_factor {
            self.record_ctes(subquery);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Subquery(query)
            | Expr::Exists { subquery: query, .. }
            | Expr::InSubquery { subquery: query, .. } => self.record_ctes(query),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let name = relation
            .0
            .iter()
            .map(|ident| ident.value.to_uppercase())
            .collect::<Vec<_>>()
            .join(".");
        self.relations.push(name);
        ControlFlow::Continue(())
    }
}

/// Tables referenced by `sql` that are neither in `allowed` (qualified or
/// bare names) nor defined as CTEs. `Err` carries the parser message.
pub fn unknown_tables(sql: &str, allowed: &[String]) -> Result<Vec<String>, String> {
    let statements = Parser::parse_sql(&SnowflakeDialect {}, sql).map_err(|e| e.to_string())?;

    let mut collector = RelationCollector::default();
    for statement in &statements {
        let _ = statement.visit(&mut collector);
    }

    let mut permitted: HashSet<String> = HashSet::new();
    for name in allowed {
        let upper = name.to_uppercase();
        if let Some(bare) = upper.rsplit('.').next() {
            permitted.insert(bare.to_string());
        }
        permitted.insert(upper);
    }

    let mut unknown = Vec::new();
    for relation in collector.relations {
        if permitted.contains(&relation) || collector.ctes.contains(&relation) {
            continue;
        }
        if !unknown.contains(&relation) {
            unknown.push(relation);
        }
    }
    Ok(unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec!["ANALYTICS_COPILOT.RAW.ORDERS".to_string()]
    }

    #[test]
    fn test_only_allowed_tables() {
        let sql = "SELECT COUNT(*) FROM ANALYTICS_COPILOT.RAW.ORDERS \
                   WHERE YEAR(ANALYTICS_COPILOT.RAW.ORDERS.ORDER_PURCHASE_TIMESTAMP) = 2017";
        assert!(unknown_tables(sql, &allowed()).unwrap().is_empty());
    }

    #[test]
    fn test_reports_unlisted_table() {
        let sql = "SELECT o.ORDER_ID FROM ANALYTICS_COPILOT.RAW.ORDERS o \
                   JOIN ANALYTICS_COPILOT.RAW.SELLERS s ON o.ORDER_ID = s.SELLER_ID";
        assert_eq!(
            unknown_tables(sql, &allowed()).unwrap(),
            vec!["ANALYTICS_COPILOT.RAW.SELLERS"]
        );
    }

    #[test]
    fn test_cte_names_are_not_tables() {
        let sql = "WITH yearly AS (SELECT ORDER_ID FROM ANALYTICS_COPILOT.RAW.ORDERS) \
                   SELECT COUNT(*) FROM yearly";
        assert!(unknown_tables(sql, &allowed()).unwrap().is_empty());
    }

    #[test]
    fn test_nested_cte_names_are_not_tables() {
        let sql = "SELECT COUNT(*) FROM (\
                   WITH recent AS (SELECT ORDER_ID FROM ANALYTICS_COPILOT.RAW.ORDERS) \
                   SELECT ORDER_ID FROM recent) t \
                   WHERE t.ORDER_ID IN (WITH ids AS (SELECT ORDER_ID FROM ANALYTICS_COPILOT.RAW.ORDERS) \
                   SELECT ORDER_ID FROM ids)";
        assert!(unknown_tables(sql, &allowed()).unwrap().is_empty());
    }

    #[test]
    fn test_cte_does_not_hide_unlisted_table() {
        let sql = "WITH yearly AS (SELECT SELLER_ID FROM ANALYTICS_COPILOT.RAW.SELLERS) \
                   SELECT COUNT(*) FROM yearly";
        assert_eq!(
            unknown_tables(sql, &allowed()).unwrap(),
            vec!["ANALYTICS_COPILOT.RAW.SELLERS"]
        );
    }

    #[test]
    fn test_parse_error() {
        assert!(unknown_tables("SELEC FROM", &allowed()).is_err());
    }
}
