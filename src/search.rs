//! Semantic Search Service
//!
//! Column-level semantic search over the enriched schema descriptions.

use crate::error::{CopilotError, Result};
use crate::schema::clamp_score;
use crate::warehouse::{escape_literal, WarehouseGateway};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Fields requested from the search index for schema linking
pub const SCHEMA_FIELDS: &[&str] = &[
    "table_name",
    "column_name",
    "description",
    "synonyms",
    "data_type",
];

/// One column-level match
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub table_name: String,
    pub column_name: String,
    pub description: String,
    pub synonyms: String,
    pub data_type: String,
    /// Relevance in [0, 1]
    pub score: f64,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Option<Vec<RawHit>>,
}

/// Result item as the service returns it; any field may be absent or null
#[derive(Deserialize)]
struct RawHit {
    table_name: Option<String>,
    column_name: Option<String>,
    description: Option<String>,
    synonyms: Option<String>,
    data_type: Option<String>,
    score: Option<f64>,
    #[serde(rename = "@scores")]
    scores: Option<RawScores>,
}

#[derive(Deserialize)]
struct RawScores {
    cosine_similarity: Option<f64>,
}

impl From<RawHit> for SearchHit {
    fn from(raw: RawHit) -> Self {
        let unknown = || "UNKNOWN".to_string();
        let score = raw
            .score
            .or_else(|| raw.scores.and_then(|s| s.cosine_similarity))
            .unwrap_or(0.0);
        Self {
            table_name: raw.table_name.unwrap_or_else(unknown),
            column_name: raw.column_name.unwrap_or_else(unknown),
            description: raw.description.unwrap_or_default(),
            synonyms: raw.synonyms.unwrap_or_default(),
            data_type: raw.data_type.unwrap_or_else(unknown),
            score: clamp_score(score),
        }
    }
}

#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Ranked matches for `query`. A missing service is reported as
    /// `CopilotError::SearchServiceNotFound`.
    async fn search(&self, query: &str, fields: &[&str], limit: usize) -> Result<Vec<SearchHit>>;
}

/// Cortex Search queried through `SNOWFLAKE.CORTEX.SEARCH_PREVIEW`
pub struct CortexSearch {
    gateway: Arc<dyn WarehouseGateway>,
    service: String,
}

impl CortexSearch {
    pub fn new(gateway: Arc<dyn WarehouseGateway>, service: impl Into<String>) -> Self {
        Self {
            gateway,
            service: service.into(),
        }
    }

    fn build_query(&self, query: &str, fields: &[&str], limit: usize) -> String {
        let request = serde_json::json!({
            "query": query,
            "columns": fields,
            "limit": limit,
        });
        format!(
            "SELECT SNOWFLAKE.CORTEX.SEARCH_PREVIEW('{}', '{}') AS SEARCH_RESULTS",
            escape_literal(&self.service),
            escape_literal(&request.to_string())
        )
    }

    fn classify_error(&self, err: CopilotError) -> CopilotError {
        let message = err.detail();
        let lower = message.to_lowercase();
        if lower.contains("does not exist") && lower.contains(&self.service.to_lowercase()) {
            CopilotError::SearchServiceNotFound(message)
        } else {
            CopilotError::Search(message)
        }
    }
}

#[async_trait]
impl SemanticSearch for CortexSearch {
    async fn search(&self, query: &str, fields: &[&str], limit: usize) -> Result<Vec<SearchHit>> {
        let sql = self.build_query(query, fields, limit);
        let batch = self
            .gateway
            .collect(&sql, 1)
            .await
            .map_err(|e| self.classify_error(e))?;

        let Some(row) = batch.rows.first() else {
            return Ok(Vec::new());
        };
        let raw = batch
            .text(row, "SEARCH_RESULTS")
            .or_else(|| row.first().cloned().flatten())
            .unwrap_or_default();

        let hits = parse_search_response(&raw)?;
        debug!("Search service {} returned {} hits", self.service, hits.len());
        Ok(hits)
    }
}

/// Parse a `{"results": [...]}` search payload
pub fn parse_search_response(raw: &str) -> Result<Vec<SearchHit>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let payload: SearchResponse = serde_json::from_str(raw)
        .map_err(|e| CopilotError::Search(format!("Malformed search response: {}", e)))?;

    Ok(payload
        .results
        .unwrap_or_default()
        .into_iter()
        .map(SearchHit::from)
        .collect())
}
