use crate::error::{CopilotError, Result};
use crate::warehouse::{escape_literal, WarehouseGateway};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Free-text completion. Responses carry no format guarantees.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;
}

/// `SNOWFLAKE.CORTEX.COMPLETE` executed through the warehouse
pub struct CortexCompletion {
    gateway: Arc<dyn WarehouseGateway>,
}

impl CortexCompletion {
    pub fn new(gateway: Arc<dyn WarehouseGateway>) -> Self {
        Self { gateway }
    }

    fn classify_error(model: &str, err: CopilotError) -> CopilotError {
        let message = err.detail();
        let lower = message.to_lowercase();
        if lower.contains("cortex.complete") || lower.contains("unknown function") {
            CopilotError::CompletionUnavailable(message)
        } else if lower.contains("model") && (lower.contains("not found") || lower.contains("unavailable") || lower.contains("unknown"))
            || lower.contains(&model.to_lowercase())
        {
            CopilotError::ModelUnavailable {
                model: model.to_string(),
                message,
            }
        } else {
            CopilotError::Llm(message)
        }
    }
}

#[async_trait]
impl TextCompletion for CortexCompletion {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        let sql = format!(
            "SELECT SNOWFLAKE.CORTEX.COMPLETE('{}', '{}') AS GENERATED_SQL",
            escape_literal(model),
            escape_literal(prompt)
        );
        debug!("Cortex completion request ({} prompt chars)", prompt.len());

        let batch = self
            .gateway
            .collect(&sql, 1)
            .await
            .map_err(|e| Self::classify_error(model, e))?;

        let row = batch
            .rows
            .first()
            .ok_or_else(|| CopilotError::Llm("Cortex returned no rows".to_string()))?;
        Ok(batch
            .text(row, "GENERATED_SQL")
            .or_else(|| row.first().cloned().flatten())
            .unwrap_or_default())
    }
}

/// OpenAI-compatible chat completions client
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn call_llm(&self, model: &str, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": "You translate analytics questions into a single SQL query. Follow the formatting rules in the prompt exactly."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
            "max_tokens": 2000
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CopilotError::CompletionUnavailable(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let lower = text.to_lowercase();
            if status == reqwest::StatusCode::NOT_FOUND || lower.contains("model_not_found") {
                return Err(CopilotError::ModelUnavailable {
                    model: model.to_string(),
                    message: text,
                });
            }
            if status.is_server_error() || status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
                return Err(CopilotError::CompletionUnavailable(format!("API error ({}): {}", status, text)));
            }
            return Err(CopilotError::Llm(format!("API error ({}): {}", status, text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CopilotError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| CopilotError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl TextCompletion for LlmClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String> {
        self.call_llm(model, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cortex_error_classification() {
        let err = CortexCompletion::classify_error(
            "llama3.1-70b",
            CopilotError::Warehouse("SQL compilation error: Unknown function SNOWFLAKE.CORTEX.COMPLETE".to_string()),
        );
        assert!(matches!(err, CopilotError::CompletionUnavailable(_)));

        let err = CortexCompletion::classify_error(
            "llama3.1-70b",
            CopilotError::Warehouse("Model llama3.1-70b is not available in region".to_string()),
        );
        assert!(matches!(err, CopilotError::ModelUnavailable { .. }));

        let err = CortexCompletion::classify_error(
            "llama3.1-70b",
            CopilotError::Transport("connection reset".to_string()),
        );
        assert!(matches!(err, CopilotError::Llm(_)));
    }
}
