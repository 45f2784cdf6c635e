//! Generation prompt
//!
//! The prompt is plain text assembled in a fixed order: system block,
//! schema rendering, built-in examples, caller examples, question. The
//! same inputs always produce the same prompt.

use crate::schema::{FewShotExample, TableContext};
use itertools::Itertools;

/// Answer the model is told to give when the listed tables cannot answer the question
pub const INSUFFICIENT_SCHEMA: &str = "ERROR: Insufficient schema information";

/// Placeholder replaced by the `DB.SCHEMA` qualifier
const QUALIFIER: &str = "{qualifier}";

const DATASET_GUIDANCE: &str = r#"DATASET CONTEXT:
This database contains the Olist Brazilian E-Commerce dataset with these tables:
ORDERS, CUSTOMERS, ORDER_ITEMS, ORDER_REVIEWS, ORDER_PAYMENTS, PRODUCTS, SELLERS, GEOLOCATION, PRODUCT_CATEGORY_TRANSLATION

Key relationships:
- ORDERS -> CUSTOMERS (via CUSTOMER_ID)
- ORDER_ITEMS -> ORDERS (via ORDER_ID), PRODUCTS (via PRODUCT_ID), SELLERS (via SELLER_ID)
- ORDER_REVIEWS -> ORDERS (via ORDER_ID)
- ORDER_PAYMENTS -> ORDERS (via ORDER_ID)
- PRODUCTS -> PRODUCT_CATEGORY_TRANSLATION (via PRODUCT_CATEGORY_NAME)
- SELLERS and CUSTOMERS both have CITY and STATE columns

IMPORTANT DATA MODEL NOTE:
- CUSTOMERS.CUSTOMER_ID is a per-order proxy key: each order gets its own CUSTOMER_ID row.
  A single real customer can have multiple CUSTOMER_ID values.
- CUSTOMERS.CUSTOMER_UNIQUE_ID is the true unique customer identifier.
- To count orders per real customer, GROUP BY CUSTOMER_UNIQUE_ID (not CUSTOMER_ID).
  Example: SELECT c.CUSTOMER_UNIQUE_ID, COUNT(o.ORDER_ID) AS order_count
           FROM {qualifier}.ORDERS o
           JOIN {qualifier}.CUSTOMERS c ON o.CUSTOMER_ID = c.CUSTOMER_ID
           GROUP BY c.CUSTOMER_UNIQUE_ID"#;

const RULES: &str = r#"CRITICAL RULES:
1. Use ONLY the tables listed in AVAILABLE TABLES below. Do NOT use any other table.
2. ALWAYS use fully qualified table names: {qualifier}.<table_name>
   Example: {qualifier}.ORDERS (NOT {qualifier}.OLIST_ORDERS, NOT just ORDERS)
3. Do NOT invent table names. If the table you need is not in AVAILABLE TABLES, return: "ERROR: Insufficient schema information"
4. Use Snowflake SQL syntax (NOT MySQL, PostgreSQL, or other dialects)
5. Use uppercase for ALL SQL keywords (SELECT, FROM, WHERE, JOIN, GROUP BY, etc.)
6. Always qualify column names with their table name (e.g., {qualifier}.ORDERS.ORDER_ID)
7. Use proper JOIN syntax based on the key relationships listed above
8. Use appropriate aggregations (SUM, AVG, COUNT, etc.) when asking for totals or averages
9. Return ONLY the SQL query: no explanations, no markdown, no extra text
10. Do NOT use markdown code fences
11. Use standard Snowflake date functions (TO_DATE, DATEADD, DATEDIFF, DATE_TRUNC, etc.)
    DATEDIFF syntax: DATEDIFF('day', start_col, end_col), NOT DATEDIFF(end_col, start_col)
12. For top-N-per-group queries, use a CTE with ROW_NUMBER() then WHERE row_num <= N (do NOT use QUALIFY with aliases)
13. For month-over-month calculations, aggregate first in a CTE, then apply LAG() in the outer query
14. For questions using superlatives (most, highest, lowest, best, worst, top, bottom) without a specific N, add LIMIT 20
    Example: "which customers placed the most orders" -> ORDER BY order_count DESC LIMIT 20
15. Only SELECT the columns directly needed to answer the question, never every column of a table.
    For ranking/aggregation questions, select only the grouping identifier(s) and the aggregate metric."#;

const BUILTIN_EXAMPLES: &str = r#"EXAMPLE QUERIES (correct SQL patterns to follow):

Example A - Top-N per group (use CTE + WHERE, NOT QUALIFY with aliases):
Question: Find the top 2 sellers by revenue in each state
SQL:
WITH ranked_sellers AS (
    SELECT
        {qualifier}.SELLERS.SELLER_STATE,
        {qualifier}.SELLERS.SELLER_ID,
        SUM({qualifier}.ORDER_ITEMS.PRICE) AS TOTAL_REVENUE,
        ROW_NUMBER() OVER (PARTITION BY {qualifier}.SELLERS.SELLER_STATE ORDER BY SUM({qualifier}.ORDER_ITEMS.PRICE) DESC) AS row_num
    FROM {qualifier}.SELLERS
    JOIN {qualifier}.ORDER_ITEMS ON {qualifier}.SELLERS.SELLER_ID = {qualifier}.ORDER_ITEMS.SELLER_ID
    GROUP BY {qualifier}.SELLERS.SELLER_STATE, {qualifier}.SELLERS.SELLER_ID
)
SELECT SELLER_STATE, SELLER_ID, TOTAL_REVENUE FROM ranked_sellers WHERE row_num <= 2

Example B - Month-over-month growth (aggregate in CTE first, then LAG):
Question: What is the month-over-month growth rate in total payments?
SQL:
WITH monthly_totals AS (
    SELECT
        DATE_TRUNC('MONTH', {qualifier}.ORDERS.ORDER_PURCHASE_TIMESTAMP) AS MONTH,
        SUM({qualifier}.ORDER_PAYMENTS.PAYMENT_VALUE) AS TOTAL_PAYMENT
    FROM {qualifier}.ORDER_PAYMENTS
    JOIN {qualifier}.ORDERS ON {qualifier}.ORDER_PAYMENTS.ORDER_ID = {qualifier}.ORDERS.ORDER_ID
    GROUP BY DATE_TRUNC('MONTH', {qualifier}.ORDERS.ORDER_PURCHASE_TIMESTAMP)
)
SELECT
    MONTH,
    TOTAL_PAYMENT,
    LAG(TOTAL_PAYMENT) OVER (ORDER BY MONTH) AS PREV_MONTH_PAYMENT,
    (TOTAL_PAYMENT - LAG(TOTAL_PAYMENT) OVER (ORDER BY MONTH)) / NULLIF(LAG(TOTAL_PAYMENT) OVER (ORDER BY MONTH), 0) AS GROWTH_RATE
FROM monthly_totals
ORDER BY MONTH
"#;

/// Builds generation prompts for one `DB.SCHEMA` qualifier
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    qualifier: String,
}

impl PromptBuilder {
    pub fn new(qualifier: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into().trim_end_matches('.').to_string(),
        }
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// Fully qualified name for a linked table
    pub fn qualify(&self, table_name: &str) -> String {
        let prefix = format!("{}.", self.qualifier);
        if table_name.to_uppercase().starts_with(&prefix.to_uppercase()) {
            table_name.to_string()
        } else {
            format!("{}{}", prefix, table_name)
        }
    }

    /// Qualified names of every table in `context`, in context order
    pub fn allowed_tables(&self, context: &[TableContext]) -> Vec<String> {
        context
            .iter()
            .filter(|t| !t.table_name.is_empty())
            .map(|t| self.qualify(&t.table_name))
            .collect()
    }

    pub fn build(&self, question: &str, context: &[TableContext], examples: &[FewShotExample]) -> String {
        let allowed = self.allowed_tables(context);
        let allowed = if allowed.is_empty() {
            "none".to_string()
        } else {
            allowed.join(", ")
        };

        let system = format!(
            "You are a Senior Snowflake Data Engineer. Your task is to generate accurate SQL queries based on user questions.\n\n\
             {}\n\n{}\n\n\
             AVAILABLE TABLES (use ONLY these, with {}. prefix):\n{}\n\n\
             If the table you need is NOT in the list above, return: \"{}\"\n",
            self.fill(DATASET_GUIDANCE),
            self.fill(RULES),
            self.qualifier,
            allowed,
            INSUFFICIENT_SCHEMA
        );

        format!(
            "{}\nDATABASE SCHEMA (column details for the available tables):\n{}\n\n{}\nUSER QUESTION:\n{}\n\n\
             Generate the SQL query now (SQL only, no explanations, no markdown):\n",
            system,
            self.render_schema(context),
            self.render_examples(examples),
            question
        )
    }

    /// One block per table: qualified name, rounded score, one line per column
    pub fn render_schema(&self, context: &[TableContext]) -> String {
        context
            .iter()
            .map(|table| {
                let header = format!(
                    "\nTable: {} (Relevance: {:.2})",
                    self.qualify(&table.table_name),
                    table.relevance_score
                );
                let columns = table.columns.iter().map(|col| {
                    let description = if col.description.trim().is_empty() {
                        "No description"
                    } else {
                        col.description.as_str()
                    };
                    let mut line = format!("  - {} ({}): {}", col.column_name, col.data_type, description);
                    if !col.synonyms.trim().is_empty() {
                        line.push_str(&format!(" [Synonyms: {}]", col.synonyms));
                    }
                    line
                });
                std::iter::once(header).chain(columns).join("\n")
            })
            .join("\n")
    }

    fn render_examples(&self, examples: &[FewShotExample]) -> String {
        let mut text = self.fill(BUILTIN_EXAMPLES);
        let usable: Vec<&FewShotExample> = examples
            .iter()
            .filter(|e| !e.question.trim().is_empty() && !e.sql.trim().is_empty())
            .collect();
        if !usable.is_empty() {
            text.push_str("\nADDITIONAL EXAMPLES:\n");
            for (i, example) in usable.iter().enumerate() {
                text.push_str(&format!(
                    "Example {}:\nQuestion: {}\nSQL:\n{}\n\n",
                    i + 1,
                    example.question,
                    example.sql
                ));
            }
        }
        text
    }

    fn fill(&self, template: &str) -> String {
        template.replace(QUALIFIER, &self.qualifier)
    }
}
