//! SQL Generator
//!
//! Question + linked schema -> one candidate SQL statement. Every failure
//! (missing input, completion error, nothing extractable) is logged and
//! reported as `None`.

pub mod extract;
pub mod prompt;
pub mod references;

pub use extract::extract_sql;
pub use prompt::{PromptBuilder, INSUFFICIENT_SCHEMA};

use crate::error::CopilotError;
use crate::llm::TextCompletion;
use crate::schema::{FewShotExample, TableContext};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SqlGenerator {
    completion: Arc<dyn TextCompletion>,
    model: String,
    prompts: PromptBuilder,
}

impl SqlGenerator {
    pub fn new(completion: Arc<dyn TextCompletion>, model: impl Into<String>, prompts: PromptBuilder) -> Self {
        Self {
            completion,
            model: model.into(),
            prompts,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    pub async fn generate_sql(
        &self,
        question: &str,
        context: &[TableContext],
        examples: &[FewShotExample],
    ) -> Option<String> {
        if question.trim().is_empty() {
            warn!("Empty question provided to SQL generator, returning no SQL");
            return None;
        }
        if context.is_empty() {
            warn!("No schema context provided to SQL generator; cannot generate SQL without table information");
            return None;
        }

        let prompt = self.prompts.build(question, context, examples);
        debug!("Generation prompt: {} chars, {} table(s)", prompt.len(), context.len());

        let response = match self.completion.complete(&self.model, &prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("{}", completion_hint(&self.model, &e));
                return None;
            }
        };

        if response.trim().is_empty() {
            warn!("Completion service returned an empty response");
            return None;
        }

        let Some(sql) = extract_sql(&response) else {
            warn!(
                "Failed to extract valid SQL from completion. Raw response: {}...",
                response.chars().take(200).collect::<String>()
            );
            return None;
        };

        self.check_references(&sql, context);
        info!("Generated SQL ({} chars)", sql.len());
        Some(sql)
    }

    fn check_references(&self, sql: &str, context: &[TableContext]) {
        let allowed = self.prompts.allowed_tables(context);
        match references::unknown_tables(sql, &allowed) {
            Ok(unknown) if !unknown.is_empty() => {
                warn!("Generated SQL references tables outside the linked schema: {:?}", unknown);
            }
            Ok(_) => {}
            Err(e) => debug!("Skipping table-reference check, SQL did not parse: {}", e),
        }
    }
}

/// Operator-facing diagnostic for a failed completion call
pub fn completion_hint(model: &str, err: &CopilotError) -> String {
    match err {
        CopilotError::CompletionUnavailable(msg) => format!(
            "Completion service is not available. Ensure Cortex is enabled for the account. Error: {}",
            msg
        ),
        CopilotError::ModelUnavailable { message, .. } => format!(
            "Model {} is not available. Check the models offered in your region. Error: {}",
            model, message
        ),
        other => format!("Error in SQL generator: {}. Returning no SQL", other),
    }
}
