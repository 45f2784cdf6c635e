//! Copilot pipeline: schema linking -> SQL generation -> validation/execution.

use crate::config::{CompletionBackend, CopilotConfig};
use crate::error::Result;
use crate::execution_loop::{AttemptRecord, ExecutionLoop, ExecutionOutcome};
use crate::generator::{PromptBuilder, SqlGenerator};
use crate::llm::{CortexCompletion, LlmClient, TextCompletion};
use crate::metadata::{MetadataStore, WarehouseMetadataStore};
use crate::schema::{FewShotExample, SchemaContext};
use crate::schema_rag::{LinkTier, SchemaLinker};
use crate::search::{CortexSearch, SemanticSearch};
use crate::warehouse::{SnowflakeGateway, WarehouseGateway};
use std::sync::Arc;
use tracing::{info, warn};

pub const NO_TABLES_ERROR: &str =
    "Could not find relevant tables for your question. Please try rephrasing or check if the data exists.";
pub const NO_SQL_ERROR: &str =
    "Could not generate SQL query. The LLM may be unavailable or the question is unclear.";

/// Everything produced while answering one question
#[derive(Debug, Clone)]
pub struct CopilotAnswer {
    pub schema_context: SchemaContext,
    pub link_tiers: Vec<LinkTier>,
    /// Empty when no SQL was ever generated
    pub final_sql: String,
    pub outcome: ExecutionOutcome,
    pub attempts: Vec<AttemptRecord>,
}

impl CopilotAnswer {
    fn failed(schema_context: SchemaContext, link_tiers: Vec<LinkTier>, message: &str) -> Self {
        Self {
            schema_context,
            link_tiers,
            final_sql: String::new(),
            outcome: ExecutionOutcome::Failure(message.to_string()),
            attempts: Vec::new(),
        }
    }
}

/// The three stages wired to one warehouse session. Questions are answered
/// one at a time; concurrent callers should each own a `Copilot`.
pub struct Copilot {
    linker: SchemaLinker,
    generator: SqlGenerator,
    executor: ExecutionLoop,
    examples: Vec<FewShotExample>,
}

impl Copilot {
    pub fn new(linker: SchemaLinker, generator: SqlGenerator, executor: ExecutionLoop) -> Self {
        Self {
            linker,
            generator,
            executor,
            examples: Vec::new(),
        }
    }

    /// Wire every collaborator from configuration over a fresh gateway
    pub fn from_config(config: &CopilotConfig) -> Result<Self> {
        let gateway: Arc<dyn WarehouseGateway> = Arc::new(SnowflakeGateway::new(config.snowflake.clone())?);

        let search: Arc<dyn SemanticSearch> =
            Arc::new(CortexSearch::new(Arc::clone(&gateway), config.search_service.clone()));
        let metadata: Arc<dyn MetadataStore> = Arc::new(WarehouseMetadataStore::new(
            Arc::clone(&gateway),
            config.metadata_table.clone(),
            config.snowflake.database.clone(),
            config.snowflake.schema.clone(),
        ));
        let completion: Arc<dyn TextCompletion> = match &config.completion {
            CompletionBackend::Cortex => Arc::new(CortexCompletion::new(Arc::clone(&gateway))),
            CompletionBackend::OpenAi { api_key, base_url } => {
                Arc::new(LlmClient::new(api_key.clone(), base_url.clone()))
            }
        };

        info!(
            "Copilot ready (model {}, search service {})",
            config.model, config.search_service
        );

        Ok(Self::new(
            SchemaLinker::new(search, metadata),
            SqlGenerator::new(
                completion,
                config.model.clone(),
                PromptBuilder::new(config.snowflake.qualifier()),
            ),
            ExecutionLoop::new(gateway),
        ))
    }

    /// Few-shot examples passed to the first generation of every question
    pub fn with_examples(mut self, examples: Vec<FewShotExample>) -> Self {
        self.examples = examples;
        self
    }

    pub fn linker(&self) -> &SchemaLinker {
        &self.linker
    }

    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    pub fn executor(&self) -> &ExecutionLoop {
        &self.executor
    }

    pub fn examples(&self) -> &[FewShotExample] {
        &self.examples
    }

    pub async fn answer_question(&self, question: &str, limit: usize, max_retries: i32) -> CopilotAnswer {
        let link = self.linker.link(question, limit).await;
        if link.context.is_empty() {
            warn!("No relevant tables for question: {}", question);
            return CopilotAnswer::failed(link.context, link.attempted, NO_TABLES_ERROR);
        }

        let Some(sql) = self
            .generator
            .generate_sql(question, &link.context, &self.examples)
            .await
        else {
            return CopilotAnswer::failed(link.context, link.attempted, NO_SQL_ERROR);
        };

        let run = self
            .executor
            .validate_and_execute(&self.generator, &sql, question, &link.context, max_retries)
            .await;

        CopilotAnswer {
            schema_context: link.context,
            link_tiers: link.attempted,
            final_sql: run.final_sql,
            outcome: run.outcome,
            attempts: run.attempts,
        }
    }
}
