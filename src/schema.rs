//! Schema Context
//!
//! Column/table metadata handed from the schema linker to the SQL generator.

use serde::{Deserialize, Serialize};

/// Semantic metadata about one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub column_name: String,
    pub data_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub synonyms: String,
}

impl ColumnDescriptor {
    pub fn new(
        column_name: impl Into<String>,
        data_type: impl Into<String>,
        description: impl Into<String>,
        synonyms: impl Into<String>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: data_type.into(),
            description: description.into(),
            synonyms: synonyms.into(),
        }
    }

    /// Column from the raw catalog: type only, no semantics
    pub fn bare(column_name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::new(column_name, data_type, "", "")
    }
}

/// One table plus the columns that made it relevant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableContext {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub relevance_score: f64,
}

impl TableContext {
    pub fn new(table_name: impl Into<String>, relevance_score: f64) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            relevance_score: clamp_score(relevance_score),
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnDescriptor>) -> Self {
        self.columns = columns;
        self
    }
}

/// Ranked table list; order is the order tables appear in the prompt
pub type SchemaContext = Vec<TableContext>;

/// Worked (question, SQL) pair used to steer generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub question: String,
    pub sql: String,
}

impl FewShotExample {
    pub fn new(question: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            sql: sql.into(),
        }
    }
}

/// Keep scores inside [0, 1]; NaN counts as irrelevant.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Stable sort, highest relevance first
pub fn sort_by_relevance(tables: &mut [TableContext]) {
    tables.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

pub fn table_names(context: &[TableContext]) -> Vec<String> {
    context.iter().map(|t| t.table_name.clone()).collect()
}
