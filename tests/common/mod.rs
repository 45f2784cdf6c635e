//! In-process fakes for the copilot's collaborators.
#![allow(dead_code)]

use analytics_copilot::error::{CopilotError, Result};
use analytics_copilot::generator::{PromptBuilder, SqlGenerator};
use analytics_copilot::llm::TextCompletion;
use analytics_copilot::metadata::{KeywordMatch, MetadataStore, TableColumn};
use analytics_copilot::schema::{ColumnDescriptor, TableContext};
use analytics_copilot::search::{SearchHit, SemanticSearch};
use analytics_copilot::warehouse::{ResultColumn, ResultHandle, WarehouseGateway};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const QUALIFIER: &str = "ANALYTICS_COPILOT.RAW";

/// Gateway answering from scripts. Empty scripts mean success.
#[derive(Default)]
pub struct ScriptedGateway {
    explain_script: Mutex<VecDeque<std::result::Result<(), String>>>,
    run_script: Mutex<VecDeque<std::result::Result<ResultHandle, String>>>,
    pub explain_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
    pub explained_sql: Mutex<Vec<String>>,
    pub executed_sql: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn explain_fails(self, message: &str) -> Self {
        self.explain_script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn explain_ok(self) -> Self {
        self.explain_script.lock().unwrap().push_back(Ok(()));
        self
    }

    pub fn run_fails(self, message: &str) -> Self {
        self.run_script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn run_returns(self, handle: ResultHandle) -> Self {
        self.run_script.lock().unwrap().push_back(Ok(handle));
        self
    }

    pub fn explains(&self) -> usize {
        self.explain_calls.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }
}

/// Gateway whose explain always fails with the same message
pub struct AlwaysFailingGateway {
    pub message: String,
    pub explain_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
}

impl AlwaysFailingGateway {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            explain_calls: AtomicUsize::new(0),
            run_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WarehouseGateway for AlwaysFailingGateway {
    async fn explain(&self, _sql: &str) -> Result<()> {
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        Err(CopilotError::Warehouse(self.message.clone()))
    }

    async fn run(&self, _sql: &str) -> Result<ResultHandle> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        Err(CopilotError::Warehouse(self.message.clone()))
    }
}

pub fn count_result(count: i64) -> ResultHandle {
    ResultHandle::in_memory(
        vec![ResultColumn {
            name: "ORDER_COUNT".to_string(),
            data_type: "fixed".to_string(),
            scale: Some(0),
        }],
        vec![vec![Some(count.to_string())]],
    )
}

#[async_trait]
impl WarehouseGateway for ScriptedGateway {
    async fn explain(&self, sql: &str) -> Result<()> {
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        self.explained_sql.lock().unwrap().push(sql.to_string());
        match self.explain_script.lock().unwrap().pop_front() {
            Some(Err(message)) => Err(CopilotError::Warehouse(message)),
            _ => Ok(()),
        }
    }

    async fn run(&self, sql: &str) -> Result<ResultHandle> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        self.executed_sql.lock().unwrap().push(sql.to_string());
        match self.run_script.lock().unwrap().pop_front() {
            Some(Ok(handle)) => Ok(handle),
            Some(Err(message)) => Err(CopilotError::Warehouse(message)),
            None => Ok(count_result(0)),
        }
    }
}

/// Completion returning scripted responses in order
#[derive(Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, response: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(response.to_string()));
        self
    }

    pub fn fail(self, err: CopilotError) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(&self, _model: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CopilotError::Llm("no scripted response left".to_string())))
    }
}

pub enum SearchBehavior {
    ServiceMissing,
    Broken,
    Hits(Vec<SearchHit>),
}

pub struct FakeSearch {
    behavior: SearchBehavior,
    pub requested_limits: Mutex<Vec<usize>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeSearch {
    pub fn new(behavior: SearchBehavior, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            behavior,
            requested_limits: Mutex::new(Vec::new()),
            log,
        }
    }
}

#[async_trait]
impl SemanticSearch for FakeSearch {
    async fn search(&self, _query: &str, _fields: &[&str], limit: usize) -> Result<Vec<SearchHit>> {
        self.log.lock().unwrap().push("search".to_string());
        self.requested_limits.lock().unwrap().push(limit);
        match &self.behavior {
            SearchBehavior::ServiceMissing => Err(CopilotError::SearchServiceNotFound(
                "Cortex Search Service 'SCHEMA_SEARCH_SERVICE' does not exist".to_string(),
            )),
            SearchBehavior::Broken => Err(CopilotError::Search("request timed out".to_string())),
            SearchBehavior::Hits(hits) => Ok(hits.clone()),
        }
    }
}

pub fn hit(table: &str, column: &str, score: f64) -> SearchHit {
    SearchHit {
        table_name: table.to_string(),
        column_name: column.to_string(),
        description: format!("{} of the {}", column.to_lowercase(), table.to_lowercase()),
        synonyms: String::new(),
        data_type: "VARCHAR".to_string(),
        score,
    }
}

/// Metadata store over in-memory rows
#[derive(Default)]
pub struct InMemoryMetadata {
    pub described: Vec<TableColumn>,
    pub catalog: Vec<TableColumn>,
    /// Rows returned by the keyword query as-is, in store order
    pub keyword_rows: Option<Vec<KeywordMatch>>,
    pub keyword_broken: bool,
    pub described_broken: bool,
    pub catalog_broken: bool,
    pub log: Arc<Mutex<Vec<String>>>,
}

pub fn column(table: &str, name: &str, description: &str) -> TableColumn {
    TableColumn {
        table_name: table.to_string(),
        column: ColumnDescriptor::new(name, "VARCHAR", description, ""),
    }
}

pub fn catalog_column(table: &str, name: &str) -> TableColumn {
    TableColumn {
        table_name: table.to_string(),
        column: ColumnDescriptor::bare(name, "TEXT"),
    }
}

impl InMemoryMetadata {
    pub fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn matches(row: &TableColumn, keyword: &str) -> bool {
        let c = &row.column;
        [&c.column_name, &c.description, &c.synonyms]
            .iter()
            .any(|field| field.to_lowercase().contains(keyword))
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadata {
    async fn keyword_columns(&self, keywords: &[String], row_limit: usize) -> Result<Vec<KeywordMatch>> {
        self.record("keyword".to_string());
        if self.keyword_broken {
            return Err(CopilotError::Metadata("TABLE_DESCRIPTIONS does not exist".to_string()));
        }
        if let Some(rows) = &self.keyword_rows {
            return Ok(rows.clone());
        }

        let hits: Vec<&TableColumn> = self
            .described
            .iter()
            .filter(|row| keywords.iter().any(|k| Self::matches(row, k)))
            .collect();

        let mut rows: Vec<KeywordMatch> = hits
            .iter()
            .map(|row| KeywordMatch {
                table_name: row.table_name.clone(),
                column: row.column.clone(),
                match_count: hits.iter().filter(|h| h.table_name == row.table_name).count() as u64,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then_with(|| a.table_name.cmp(&b.table_name))
        });
        rows.truncate(row_limit);
        Ok(rows)
    }

    async fn described_columns(&self, tables: &[String]) -> Result<Vec<TableColumn>> {
        self.record(format!("described:{}", tables.join(",")));
        if self.described_broken {
            return Err(CopilotError::Metadata("TABLE_DESCRIPTIONS does not exist".to_string()));
        }
        let mut rows: Vec<TableColumn> = self
            .described
            .iter()
            .filter(|row| tables.contains(&row.table_name))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(rows)
    }

    async fn catalog_columns(&self, tables: Option<&[String]>) -> Result<Vec<TableColumn>> {
        match tables {
            Some(names) => self.record(format!("catalog:{}", names.join(","))),
            None => self.record("catalog:*".to_string()),
        }
        if self.catalog_broken {
            return Err(CopilotError::Metadata("INFORMATION_SCHEMA unavailable".to_string()));
        }
        Ok(self
            .catalog
            .iter()
            .filter(|row| tables.map_or(true, |names| names.contains(&row.table_name)))
            .cloned()
            .collect())
    }
}

/// The served dataset's tables, as the enriched store describes them
pub fn olist_descriptions() -> Vec<TableColumn> {
    vec![
        column("CUSTOMERS", "CUSTOMER_ID", "Per-order customer key"),
        column("CUSTOMERS", "CUSTOMER_UNIQUE_ID", "Unique customer identifier"),
        column("CUSTOMERS", "CUSTOMER_STATE", "Customer state"),
        column("ORDERS", "ORDER_ID", "Unique order identifier"),
        column("ORDERS", "CUSTOMER_ID", "Customer who placed the order"),
        column("ORDERS", "ORDER_PURCHASE_TIMESTAMP", "When the order was purchased"),
        column("ORDER_ITEMS", "ORDER_ID", "Order the item belongs to"),
        column("ORDER_ITEMS", "PRICE", "Item price paid by the customer"),
        column("ORDER_ITEMS", "FREIGHT_VALUE", "Freight charged for the item"),
        column("ORDER_REVIEWS", "REVIEW_SCORE", "Review score from 1 to 5"),
        column("SUPERSTORE_SALES", "SALES", "Item price and sales amount"),
        column("SUPERSTORE_SALES", "PROFIT", "Profit on the sale price"),
        column("SUPERSTORE_SALES", "DISCOUNT", "Discount off the price"),
    ]
}

pub fn olist_catalog() -> Vec<TableColumn> {
    vec![
        catalog_column("CUSTOMERS", "CUSTOMER_ID"),
        catalog_column("CUSTOMERS", "CUSTOMER_STATE"),
        catalog_column("GEOLOCATION", "GEOLOCATION_ZIP_CODE_PREFIX"),
        catalog_column("ORDERS", "ORDER_ID"),
        catalog_column("ORDERS", "CUSTOMER_ID"),
        catalog_column("ORDER_ITEMS", "ORDER_ID"),
        catalog_column("ORDER_ITEMS", "PRICE"),
        catalog_column("SUPERSTORE_SALES", "SALES"),
    ]
}

pub fn orders_context() -> Vec<TableContext> {
    vec![TableContext::new("ORDERS", 0.9).with_columns(vec![
        ColumnDescriptor::new("ORDER_ID", "VARCHAR", "Unique order identifier", "order number"),
        ColumnDescriptor::new(
            "ORDER_PURCHASE_TIMESTAMP",
            "TIMESTAMP_NTZ",
            "When the order was purchased",
            "order date",
        ),
    ])]
}

pub fn generator(completion: Arc<ScriptedCompletion>) -> SqlGenerator {
    SqlGenerator::new(completion, "llama3.1-70b", PromptBuilder::new(QUALIFIER))
}

pub fn log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}
