//! Schema Linker
//!
//! Turns a question into the few tables (and their columns) the generator
//! needs. Retrieval runs as an ordered list of tiers; the first tier that
//! produces a usable context wins.

use crate::config::DEFAULT_LINK_LIMIT;
use crate::error::CopilotError;
use crate::metadata::{MetadataStore, TableColumn};
use crate::schema::{sort_by_relevance, table_names, ColumnDescriptor, SchemaContext, TableContext};
use crate::schema_rag::keyword::extract_keywords;
use crate::schema_rag::relations::{filter_dataset_mixing, is_excluded, missing_partners};
use crate::search::{SearchHit, SemanticSearch, SCHEMA_FIELDS};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Column-level hits requested per table wanted
pub const SEARCH_OVERFETCH: usize = 10;
/// Raw keyword rows requested per table wanted
pub const KEYWORD_OVERFETCH: usize = 15;

pub const KEYWORD_SCORE: f64 = 0.5;
pub const PARTNER_DESCRIBED_SCORE: f64 = 0.4;
pub const PARTNER_CATALOG_SCORE: f64 = 0.3;
pub const CATALOG_SCORE: f64 = 0.1;

/// Retrieval strategies, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkTier {
    Semantic,
    Keyword,
    FullCatalog,
}

impl LinkTier {
    pub const ORDER: [LinkTier; 3] = [LinkTier::Semantic, LinkTier::Keyword, LinkTier::FullCatalog];
}

impl fmt::Display for LinkTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkTier::Semantic => write!(f, "semantic"),
            LinkTier::Keyword => write!(f, "keyword"),
            LinkTier::FullCatalog => write!(f, "full-catalog"),
        }
    }
}

/// Linked context plus which tiers ran to produce it
#[derive(Debug, Clone, Default)]
pub struct SchemaLink {
    pub context: SchemaContext,
    pub attempted: Vec<LinkTier>,
    pub resolved_by: Option<LinkTier>,
}

pub struct SchemaLinker {
    search: Arc<dyn SemanticSearch>,
    metadata: Arc<dyn MetadataStore>,
}

impl SchemaLinker {
    pub fn new(search: Arc<dyn SemanticSearch>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { search, metadata }
    }

    /// Relevant tables for `question`, best first. Never fails; an empty
    /// context means nothing could be linked.
    pub async fn link_schema(&self, question: &str, limit: usize) -> SchemaContext {
        self.link(question, limit).await.context
    }

    /// Same as `link_schema`, also reporting the tiers attempted
    pub async fn link(&self, question: &str, limit: usize) -> SchemaLink {
        if question.trim().is_empty() {
            warn!("Empty question provided to schema linker, returning empty context");
            return SchemaLink::default();
        }

        let limit = if limit < 1 {
            warn!("Invalid limit ({}), using default limit of {}", limit, DEFAULT_LINK_LIMIT);
            DEFAULT_LINK_LIMIT
        } else {
            limit
        };

        let mut link = SchemaLink::default();
        for tier in LinkTier::ORDER {
            link.attempted.push(tier);
            if let Some(context) = self.run_tier(tier, question, limit).await {
                info!(
                    "Linked {} table(s) via {} tier: {:?}",
                    context.len(),
                    tier,
                    table_names(&context)
                );
                link.context = context;
                link.resolved_by = Some(tier);
                return link;
            }
        }

        warn!("No schema could be linked for question: {}", question);
        link
    }

    /// `None` sends the linker on to the next tier
    async fn run_tier(&self, tier: LinkTier, question: &str, limit: usize) -> Option<SchemaContext> {
        let context = match tier {
            LinkTier::Semantic => self.semantic_tier(question, limit).await,
            LinkTier::Keyword => self.keyword_tier(question, limit).await,
            LinkTier::FullCatalog => self.catalog_tier(limit).await,
        };
        context.filter(|c| !c.is_empty())
    }

    async fn semantic_tier(&self, question: &str, limit: usize) -> Option<SchemaContext> {
        let hits = match self
            .search
            .search(question, SCHEMA_FIELDS, limit * SEARCH_OVERFETCH)
            .await
        {
            Ok(hits) => hits,
            Err(CopilotError::SearchServiceNotFound(msg)) => {
                warn!("Search service not found ({}), falling back to keyword search", msg);
                return None;
            }
            Err(e) => {
                warn!("Semantic search failed: {}. Falling back to keyword search", e);
                return None;
            }
        };

        if hits.is_empty() {
            warn!("Semantic search returned no matches for question: {}", question);
            return None;
        }

        let mut tables = group_hits(hits);
        sort_by_relevance(&mut tables);
        let mut tables = filter_dataset_mixing(tables);
        tables.truncate(limit);
        Some(tables)
    }

    async fn keyword_tier(&self, question: &str, limit: usize) -> Option<SchemaContext> {
        let keywords = extract_keywords(question);
        debug!("Keyword search with {:?}", keywords);

        let rows = match self
            .metadata
            .keyword_columns(&keywords, limit * KEYWORD_OVERFETCH)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Keyword search failed: {}. Trying full table list", e);
                return None;
            }
        };
        if rows.is_empty() {
            return None;
        }

        let mut order: Vec<(TableContext, u64)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in rows {
            let slot = *index.entry(row.table_name.clone()).or_insert_with(|| {
                order.push((TableContext::new(row.table_name.clone(), KEYWORD_SCORE), row.match_count));
                order.len() - 1
            });
            order[slot].0.columns.push(row.column);
        }
        order.sort_by(|(a, a_count), (b, b_count)| {
            b_count
                .cmp(a_count)
                .then_with(|| a.table_name.cmp(&b.table_name))
        });

        let tables: Vec<TableContext> = order.into_iter().map(|(t, _)| t).collect();
        let mut tables = filter_dataset_mixing(tables);
        tables.truncate(limit);
        if tables.is_empty() {
            return None;
        }

        Some(self.supplement_related_tables(tables).await)
    }

    async fn catalog_tier(&self, limit: usize) -> Option<SchemaContext> {
        let rows = match self.metadata.catalog_columns(None).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Could not retrieve table info: {}", e);
                return None;
            }
        };

        let mut tables = filter_dataset_mixing(group_columns(rows, CATALOG_SCORE));
        tables.truncate(limit);
        Some(tables)
    }

    /// Append declared join partners missing from `tables`, preferring the
    /// enriched store and falling back to the raw catalog per table.
    async fn supplement_related_tables(&self, mut tables: Vec<TableContext>) -> Vec<TableContext> {
        let needed: Vec<String> = missing_partners(&tables)
            .into_iter()
            .filter(|t| !is_excluded(t))
            .collect();
        if needed.is_empty() {
            return tables;
        }
        debug!("Supplementing join partners {:?}", needed);

        let described = match self.metadata.described_columns(&needed).await {
            Ok(rows) => group_columns(rows, PARTNER_DESCRIBED_SCORE),
            Err(e) => {
                warn!("Enriched metadata unavailable for {:?}: {}", needed, e);
                Vec::new()
            }
        };

        let remaining: Vec<String> = needed
            .iter()
            .filter(|n| !described.iter().any(|t| t.table_name.eq_ignore_ascii_case(n)))
            .cloned()
            .collect();

        let from_catalog = if remaining.is_empty() {
            Vec::new()
        } else {
            match self.metadata.catalog_columns(Some(&remaining)).await {
                Ok(rows) => group_columns(rows, PARTNER_CATALOG_SCORE),
                Err(e) => {
                    warn!("Could not fetch related tables {:?}: {}", remaining, e);
                    Vec::new()
                }
            }
        };

        tables.extend(described);
        tables.extend(from_catalog);
        tables
    }
}

/// Group column-level hits by table, scoring each table by its mean hit score
fn group_hits(hits: Vec<SearchHit>) -> Vec<TableContext> {
    let mut grouped: Vec<(TableContext, Vec<f64>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for hit in hits {
        let slot = *index.entry(hit.table_name.clone()).or_insert_with(|| {
            grouped.push((TableContext::new(hit.table_name.clone(), 0.0), Vec::new()));
            grouped.len() - 1
        });
        let (table, scores) = &mut grouped[slot];
        table.columns.push(ColumnDescriptor::new(
            hit.column_name,
            hit.data_type,
            hit.description,
            hit.synonyms,
        ));
        scores.push(hit.score);
    }

    grouped
        .into_iter()
        .map(|(table, scores)| {
            let mean = scores.iter().sum::<f64>() / scores.len().max(1) as f64;
            let columns = table.columns;
            TableContext::new(table.table_name, mean).with_columns(columns)
        })
        .collect()
}

/// Group column rows by table in first-seen order, all with `score`
fn group_columns(rows: Vec<TableColumn>, score: f64) -> Vec<TableContext> {
    let mut tables: Vec<TableContext> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let slot = *index.entry(row.table_name.clone()).or_insert_with(|| {
            tables.push(TableContext::new(row.table_name.clone(), score));
            tables.len() - 1
        });
        tables[slot].columns.push(row.column);
    }
    tables
}
