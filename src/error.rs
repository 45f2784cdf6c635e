use thiserror::Error;

#[derive(Error, Debug)]
pub enum CopilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Warehouse error: {0}")]
    Warehouse(String),

    #[error("Warehouse transport error: {0}")]
    Transport(String),

    #[error("Search service not found: {0}")]
    SearchServiceNotFound(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Completion service unavailable: {0}")]
    CompletionUnavailable(String),

    #[error("Model {model} unavailable: {message}")]
    ModelUnavailable { model: String, message: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::prelude::PolarsError> for CopilotError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        CopilotError::Polars(err.to_string())
    }
}

impl CopilotError {
    /// Raw server-side message without the variant prefix, used where the
    /// message is fed back to the model or normalized for display.
    pub fn detail(&self) -> String {
        match self {
            CopilotError::Config(m)
            | CopilotError::Warehouse(m)
            | CopilotError::Transport(m)
            | CopilotError::SearchServiceNotFound(m)
            | CopilotError::Search(m)
            | CopilotError::CompletionUnavailable(m)
            | CopilotError::Llm(m)
            | CopilotError::Metadata(m)
            | CopilotError::Polars(m) => m.clone(),
            CopilotError::ModelUnavailable { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CopilotError>;
