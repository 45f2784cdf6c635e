//! Query Result - lazily materialized rows returned by a successful `run`

use crate::error::Result;
use async_trait::async_trait;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One result row; the SQL API renders every value as text (or null)
pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    pub name: String,
    /// Warehouse type name (e.g. "fixed", "real", "text", "boolean")
    pub data_type: String,
    /// Decimal scale for fixed-point columns
    pub scale: Option<i64>,
}

impl ResultColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            scale: None,
        }
    }
}

/// Fetches result partitions beyond the first one
#[async_trait]
pub trait PartitionSource: Send + Sync {
    async fn fetch_partition(&self, index: usize) -> Result<Vec<Row>>;
}

/// Materialized slice of a result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowBatch {
    pub columns: Vec<ResultColumn>,
    pub rows: Vec<Row>,
    /// More rows exist than were fetched
    pub truncated: bool,
}

impl RowBatch {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Value of `column` in `row`, empty string for null
    pub fn text(&self, row: &Row, column: &str) -> Option<String> {
        let idx = self.column_index(column)?;
        Some(row.get(idx).cloned().flatten().unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Handle to the rows of an executed statement.
///
/// Only the first partition arrives with the execution response; later
/// partitions are requested when `fetch` needs them.
#[derive(Clone)]
pub struct ResultHandle {
    statement_id: String,
    columns: Vec<ResultColumn>,
    total_rows: Option<u64>,
    first_partition: Vec<Row>,
    partition_count: usize,
    source: Option<Arc<dyn PartitionSource>>,
}

impl fmt::Debug for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("statement_id", &self.statement_id)
            .field("columns", &self.columns)
            .field("total_rows", &self.total_rows)
            .field("partition_count", &self.partition_count)
            .finish()
    }
}

impl ResultHandle {
    /// Result whose rows are all held in memory
    pub fn in_memory(columns: Vec<ResultColumn>, rows: Vec<Row>) -> Self {
        Self {
            statement_id: String::new(),
            total_rows: Some(rows.len() as u64),
            columns,
            first_partition: rows,
            partition_count: 1,
            source: None,
        }
    }

    pub fn partitioned(
        statement_id: String,
        columns: Vec<ResultColumn>,
        total_rows: Option<u64>,
        first_partition: Vec<Row>,
        partition_count: usize,
        source: Arc<dyn PartitionSource>,
    ) -> Self {
        Self {
            statement_id,
            columns,
            total_rows,
            first_partition,
            partition_count: partition_count.max(1),
            source: Some(source),
        }
    }

    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    pub fn columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    pub fn total_rows(&self) -> Option<u64> {
        self.total_rows
    }

    /// Fetch at most `max_rows` rows, pulling further partitions on demand.
    pub async fn fetch(&self, max_rows: usize) -> Result<RowBatch> {
        let mut rows: Vec<Row> = self
            .first_partition
            .iter()
            .take(max_rows)
            .cloned()
            .collect();

        let mut partition = 1;
        while rows.len() < max_rows && partition < self.partition_count {
            let Some(source) = self.source.as_ref() else {
                break;
            };
            let batch = source.fetch_partition(partition).await?;
            let remaining = max_rows - rows.len();
            rows.extend(batch.into_iter().take(remaining));
            partition += 1;
        }

        let truncated = match self.total_rows {
            Some(total) => (rows.len() as u64) < total,
            None => partition < self.partition_count || self.first_partition.len() > max_rows,
        };

        Ok(RowBatch {
            columns: self.columns.clone(),
            rows,
            truncated,
        })
    }

    /// Materialize up to `max_rows` rows as a typed DataFrame
    pub async fn to_dataframe(&self, max_rows: usize) -> Result<DataFrame> {
        let batch = self.fetch(max_rows).await?;
        batch_to_dataframe(&batch)
    }
}

/// Convert text rows to typed series with null handling
pub fn batch_to_dataframe(batch: &RowBatch) -> Result<DataFrame> {
    let mut series_vec = Vec::with_capacity(batch.columns.len());

    for (col_idx, col) in batch.columns.iter().enumerate() {
        let values: Vec<Option<&str>> = batch
            .rows
            .iter()
            .map(|row| row.get(col_idx).and_then(|v| v.as_deref()))
            .collect();

        let series = match col.data_type.to_lowercase().as_str() {
            "fixed" if col.scale.unwrap_or(0) == 0 => {
                let nums: Vec<Option<i64>> = values
                    .iter()
                    .map(|v| v.and_then(|s| s.parse::<i64>().ok()))
                    .collect();
                // NUMBER(38,0) can exceed i64; keep such columns as text
                let fits = values.iter().zip(&nums).all(|(v, n)| v.is_none() || n.is_some());
                if fits {
                    Series::new(&col.name, nums)
                } else {
                    text_series(&col.name, &values)
                }
            }
            "fixed" | "real" | "float" | "double" | "number" => {
                let nums: Vec<Option<f64>> = values
                    .iter()
                    .map(|v| v.and_then(|s| s.parse::<f64>().ok()))
                    .collect();
                Series::new(&col.name, nums)
            }
            "boolean" => {
                let bools: Vec<Option<bool>> = values
                    .iter()
                    .map(|v| {
                        v.and_then(|s| match s.to_lowercase().as_str() {
                            "true" | "1" => Some(true),
                            "false" | "0" => Some(false),
                            _ => None,
                        })
                    })
                    .collect();
                Series::new(&col.name, bools)
            }
            _ => text_series(&col.name, &values),
        };
        series_vec.push(series);
    }

    Ok(DataFrame::new(series_vec)?)
}

fn text_series(name: &str, values: &[Option<&str>]) -> Series {
    let strings: Vec<Option<String>> = values.iter().map(|v| v.map(|s| s.to_string())).collect();
    Series::new(name, strings)
}
