//! Copilot configuration loaded from the environment (and `.env`).

use crate::error::{CopilotError, Result};
use std::collections::HashMap;

pub const DEFAULT_MODEL: &str = "llama3.1-70b";
pub const DEFAULT_SEARCH_SERVICE: &str = "SCHEMA_SEARCH_SERVICE";
pub const DEFAULT_LINK_LIMIT: usize = 5;
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Which service answers completion prompts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionBackend {
    /// `SNOWFLAKE.CORTEX.COMPLETE` through the warehouse
    Cortex,
    /// OpenAI-compatible `/chat/completions`
    OpenAi { api_key: String, base_url: String },
}

#[derive(Debug, Clone)]
pub struct SnowflakeConfig {
    pub account: String,
    pub host: String,
    pub token: String,
    pub token_type: String,
    pub role: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub statement_timeout_secs: u64,
}

impl SnowflakeConfig {
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http") {
            self.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.host.trim_end_matches('/'))
        }
    }

    /// `DB.SCHEMA` prefix used to qualify raw table names
    pub fn qualifier(&self) -> String {
        format!("{}.{}", self.database, self.schema)
    }
}

#[derive(Debug, Clone)]
pub struct CopilotConfig {
    pub snowflake: SnowflakeConfig,
    pub model: String,
    pub completion: CompletionBackend,
    pub search_service: String,
    pub metadata_table: String,
    pub link_limit: usize,
    pub max_retries: i32,
}

impl CopilotConfig {
    /// Load configuration from process environment, reading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Build configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let required = [
            "SNOWFLAKE_ACCOUNT",
            "SNOWFLAKE_TOKEN",
            "SNOWFLAKE_ROLE",
            "SNOWFLAKE_WAREHOUSE",
            "SNOWFLAKE_DATABASE",
        ];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(CopilotError::Config(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let account = get("SNOWFLAKE_ACCOUNT").unwrap_or_default();
        let database = get("SNOWFLAKE_DATABASE").unwrap_or_default();
        let host = get("SNOWFLAKE_HOST")
            .unwrap_or_else(|| format!("{}.snowflakecomputing.com", account.to_lowercase()));

        let statement_timeout_secs = match get("SNOWFLAKE_STATEMENT_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                CopilotError::Config(format!(
                    "SNOWFLAKE_STATEMENT_TIMEOUT_SECS must be a positive integer, got '{}'",
                    raw
                ))
            })?,
            None => 300,
        };

        let completion = match get("COPILOT_COMPLETION_BACKEND")
            .map(|b| b.to_lowercase())
            .as_deref()
        {
            None | Some("cortex") => CompletionBackend::Cortex,
            Some("openai") => {
                let api_key = get("OPENAI_API_KEY").ok_or_else(|| {
                    CopilotError::Config(
                        "OPENAI_API_KEY is required when COPILOT_COMPLETION_BACKEND=openai"
                            .to_string(),
                    )
                })?;
                let base_url = get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
                CompletionBackend::OpenAi { api_key, base_url }
            }
            Some(other) => {
                return Err(CopilotError::Config(format!(
                    "Unknown COPILOT_COMPLETION_BACKEND '{}' (expected 'cortex' or 'openai')",
                    other
                )))
            }
        };

        let link_limit = match get("COPILOT_LINK_LIMIT") {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                CopilotError::Config(format!("COPILOT_LINK_LIMIT must be an integer, got '{}'", raw))
            })?,
            None => DEFAULT_LINK_LIMIT,
        };
        let max_retries = match get("COPILOT_MAX_RETRIES") {
            Some(raw) => raw.parse::<i32>().map_err(|_| {
                CopilotError::Config(format!("COPILOT_MAX_RETRIES must be an integer, got '{}'", raw))
            })?,
            None => DEFAULT_MAX_RETRIES,
        };

        let metadata_table = get("COPILOT_METADATA_TABLE")
            .unwrap_or_else(|| format!("{}.METADATA.TABLE_DESCRIPTIONS", database));

        Ok(Self {
            snowflake: SnowflakeConfig {
                account,
                host,
                token: get("SNOWFLAKE_TOKEN").unwrap_or_default(),
                token_type: get("SNOWFLAKE_TOKEN_TYPE")
                    .unwrap_or_else(|| "PROGRAMMATIC_ACCESS_TOKEN".to_string()),
                role: get("SNOWFLAKE_ROLE").unwrap_or_default(),
                warehouse: get("SNOWFLAKE_WAREHOUSE").unwrap_or_default(),
                database,
                schema: get("SNOWFLAKE_SCHEMA").unwrap_or_else(|| "RAW".to_string()),
                statement_timeout_secs,
            },
            model: get("COPILOT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            completion,
            search_service: get("COPILOT_SEARCH_SERVICE")
                .unwrap_or_else(|| DEFAULT_SEARCH_SERVICE.to_string()),
            metadata_table,
            link_limit,
            max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            ("SNOWFLAKE_ACCOUNT", "XY12345"),
            ("SNOWFLAKE_TOKEN", "secret"),
            ("SNOWFLAKE_ROLE", "ANALYST"),
            ("SNOWFLAKE_WAREHOUSE", "COMPUTE_WH"),
            ("SNOWFLAKE_DATABASE", "ANALYTICS_COPILOT"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults() {
        let config = CopilotConfig::from_vars(&base_vars()).unwrap();
        assert_eq!(config.snowflake.host, "xy12345.snowflakecomputing.com");
        assert_eq!(config.snowflake.schema, "RAW");
        assert_eq!(config.snowflake.qualifier(), "ANALYTICS_COPILOT.RAW");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.completion, CompletionBackend::Cortex);
        assert_eq!(config.metadata_table, "ANALYTICS_COPILOT.METADATA.TABLE_DESCRIPTIONS");
        assert_eq!(config.link_limit, 5);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_missing_variables_are_listed() {
        let mut vars = base_vars();
        vars.remove("SNOWFLAKE_TOKEN");
        vars.remove("SNOWFLAKE_ROLE");
        let err = CopilotConfig::from_vars(&vars).unwrap_err().to_string();
        assert!(err.contains("SNOWFLAKE_TOKEN"));
        assert!(err.contains("SNOWFLAKE_ROLE"));
    }

    #[test]
    fn test_openai_backend_requires_key() {
        let mut vars = base_vars();
        vars.insert("COPILOT_COMPLETION_BACKEND".to_string(), "openai".to_string());
        assert!(CopilotConfig::from_vars(&vars).is_err());

        vars.insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
        let config = CopilotConfig::from_vars(&vars).unwrap();
        assert_eq!(
            config.completion,
            CompletionBackend::OpenAi {
                api_key: "sk-test".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
            }
        );
    }
}
