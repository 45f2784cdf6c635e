//! Warehouse Gateway
//!
//! The only path by which the copilot touches the data warehouse:
//! - `explain` validates a statement without materializing anything
//! - `run` executes it and hands back a lazily fetched result

pub mod result;
pub mod snowflake;

pub use result::{batch_to_dataframe, PartitionSource, ResultColumn, ResultHandle, Row, RowBatch};
pub use snowflake::SnowflakeGateway;

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait WarehouseGateway: Send + Sync {
    /// Static/semantic validation of `sql` (EXPLAIN)
    async fn explain(&self, sql: &str) -> Result<()>;

    /// Execute `sql`; rows are fetched from the handle on demand
    async fn run(&self, sql: &str) -> Result<ResultHandle>;

    /// Run and materialize up to `max_rows` rows
    async fn collect(&self, sql: &str, max_rows: usize) -> Result<RowBatch> {
        self.run(sql).await?.fetch(max_rows).await
    }
}

/// Escape a value for use inside a single-quoted SQL literal. Backslash is
/// an escape character in Snowflake string literals, so it is doubled first.
pub fn escape_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "''")
}
