//! Metadata Store
//!
//! Read-only access to the two schema sources:
//! - the enriched description table (name, type, description, synonyms)
//! - the raw catalog (`INFORMATION_SCHEMA.COLUMNS`), which has no semantics
//!   but is always present

use crate::error::{CopilotError, Result};
use crate::schema::ColumnDescriptor;
use crate::warehouse::{escape_literal, RowBatch, WarehouseGateway};
use async_trait::async_trait;
use itertools::Itertools;
use std::sync::Arc;
use tracing::debug;

/// One column row together with the table it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    pub table_name: String,
    pub column: ColumnDescriptor,
}

/// Column row returned by the keyword search
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub table_name: String,
    pub column: ColumnDescriptor,
    /// Number of matching columns in the same table
    pub match_count: u64,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Enriched columns whose name, description or synonyms contain any
    /// keyword, ordered by per-table match count desc then table name,
    /// capped at `row_limit` rows.
    async fn keyword_columns(&self, keywords: &[String], row_limit: usize) -> Result<Vec<KeywordMatch>>;

    /// Enriched columns of the named tables, ordered by table name
    async fn described_columns(&self, tables: &[String]) -> Result<Vec<TableColumn>>;

    /// Raw catalog columns ordered by table then ordinal position.
    /// `None` means every table in the data schema.
    async fn catalog_columns(&self, tables: Option<&[String]>) -> Result<Vec<TableColumn>>;
}

/// Metadata store backed by warehouse queries
pub struct WarehouseMetadataStore {
    gateway: Arc<dyn WarehouseGateway>,
    description_table: String,
    database: String,
    schema: String,
}

/// Upper bound on rows materialized from a catalog query
const MAX_CATALOG_ROWS: usize = 10_000;

impl WarehouseMetadataStore {
    pub fn new(
        gateway: Arc<dyn WarehouseGateway>,
        description_table: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            description_table: description_table.into(),
            database: database.into(),
            schema: schema.into(),
        }
    }

    pub fn keyword_sql(&self, keywords: &[String], row_limit: usize) -> String {
        let conditions = keywords
            .iter()
            .map(|kw| {
                let kw = escape_literal(&kw.to_lowercase());
                format!(
                    "LOWER(description) ILIKE '%{kw}%' OR LOWER(column_name) ILIKE '%{kw}%' OR LOWER(synonyms) ILIKE '%{kw}%'"
                )
            })
            .join(" OR ");

        format!(
            "SELECT table_name, column_name, description, data_type, synonyms, \
             COUNT(*) OVER (PARTITION BY table_name) AS match_count \
             FROM {} WHERE {} ORDER BY match_count DESC, table_name LIMIT {}",
            self.description_table, conditions, row_limit
        )
    }

    pub fn described_sql(&self, tables: &[String]) -> String {
        format!(
            "SELECT table_name, column_name, description, data_type, synonyms \
             FROM {} WHERE table_name IN ({}) ORDER BY table_name",
            self.description_table,
            quoted_list(tables)
        )
    }

    pub fn catalog_sql(&self, tables: Option<&[String]>) -> String {
        let filter = match tables {
            Some(names) => format!(" AND table_name IN ({})", quoted_list(names)),
            None => String::new(),
        };
        format!(
            "SELECT table_name, column_name, data_type \
             FROM {}.INFORMATION_SCHEMA.COLUMNS \
             WHERE table_schema = '{}'{} ORDER BY table_name, ordinal_position",
            self.database,
            escape_literal(&self.schema),
            filter
        )
    }

    async fn query(&self, sql: &str) -> Result<RowBatch> {
        debug!("Metadata query: {}", sql);
        self.gateway
            .collect(sql, MAX_CATALOG_ROWS)
            .await
            .map_err(|e| CopilotError::Metadata(e.detail()))
    }
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{}'", escape_literal(n)))
        .join(", ")
}

fn described_rows(batch: &RowBatch) -> Vec<TableColumn> {
    batch
        .rows
        .iter()
        .map(|row| TableColumn {
            table_name: batch.text(row, "TABLE_NAME").unwrap_or_default(),
            column: ColumnDescriptor::new(
                batch.text(row, "COLUMN_NAME").unwrap_or_default(),
                batch.text(row, "DATA_TYPE").unwrap_or_default(),
                batch.text(row, "DESCRIPTION").unwrap_or_default(),
                batch.text(row, "SYNONYMS").unwrap_or_default(),
            ),
        })
        .collect()
}

#[async_trait]
impl MetadataStore for WarehouseMetadataStore {
    async fn keyword_columns(&self, keywords: &[String], row_limit: usize) -> Result<Vec<KeywordMatch>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.query(&self.keyword_sql(keywords, row_limit)).await?;
        Ok(batch
            .rows
            .iter()
            .zip(described_rows(&batch))
            .map(|(row, tc)| KeywordMatch {
                table_name: tc.table_name,
                column: tc.column,
                match_count: batch
                    .text(row, "MATCH_COUNT")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0),
            })
            .collect())
    }

    async fn described_columns(&self, tables: &[String]) -> Result<Vec<TableColumn>> {
        if tables.is_empty() {
            return Ok(Vec::new());
        }
        let batch = self.query(&self.described_sql(tables)).await?;
        Ok(described_rows(&batch))
    }

    async fn catalog_columns(&self, tables: Option<&[String]>) -> Result<Vec<TableColumn>> {
        if matches!(tables, Some(names) if names.is_empty()) {
            return Ok(Vec::new());
        }
        let batch = self.query(&self.catalog_sql(tables)).await?;
        Ok(batch
            .rows
            .iter()
            .map(|row| TableColumn {
                table_name: batch.text(row, "TABLE_NAME").unwrap_or_default(),
                column: ColumnDescriptor::bare(
                    batch.text(row, "COLUMN_NAME").unwrap_or_default(),
                    batch.text(row, "DATA_TYPE").unwrap_or_default(),
                ),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::ResultHandle;

    struct NoWarehouse;

    #[async_trait]
    impl WarehouseGateway for NoWarehouse {
        async fn explain(&self, _sql: &str) -> Result<()> {
            Ok(())
        }
        async fn run(&self, _sql: &str) -> Result<ResultHandle> {
            Err(CopilotError::Warehouse("offline".to_string()))
        }
    }

    fn store() -> WarehouseMetadataStore {
        WarehouseMetadataStore::new(
            Arc::new(NoWarehouse),
            "ANALYTICS_COPILOT.METADATA.TABLE_DESCRIPTIONS",
            "ANALYTICS_COPILOT",
            "RAW",
        )
    }

    #[test]
    fn test_keyword_sql_escapes_and_orders() {
        let sql = store().keyword_sql(&["customer's".to_string(), "state".to_string()], 75);
        assert!(sql.contains("ILIKE '%customer''s%'"));
        assert!(sql.contains("LOWER(synonyms) ILIKE '%state%'"));
        assert!(sql.contains("ORDER BY match_count DESC, table_name LIMIT 75"));
    }

    #[test]
    fn test_keyword_sql_doubles_backslashes() {
        let sql = store().keyword_sql(&["review\\".to_string()], 15);
        assert!(sql.contains("LOWER(description) ILIKE '%review\\\\%'"));
    }

    #[test]
    fn test_catalog_sql_filters_schema_and_tables() {
        let all = store().catalog_sql(None);
        assert!(all.contains("ANALYTICS_COPILOT.INFORMATION_SCHEMA.COLUMNS"));
        assert!(all.contains("table_schema = 'RAW' ORDER BY"));

        let some = store().catalog_sql(Some(&["ORDERS".to_string(), "CUSTOMERS".to_string()]));
        assert!(some.contains("AND table_name IN ('ORDERS', 'CUSTOMERS')"));
    }

    #[tokio::test]
    async fn test_failures_surface_as_metadata_errors() {
        let err = store()
            .described_columns(&["ORDERS".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, CopilotError::Metadata(_)));
        assert!(store().described_columns(&[]).await.unwrap().is_empty());
    }
}
