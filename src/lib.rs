pub mod config;
pub mod error;
pub mod evaluation;
pub mod execution_loop;
pub mod generator;
pub mod llm;
pub mod metadata;
pub mod pipeline;
pub mod schema;
pub mod schema_rag;
pub mod search;
pub mod warehouse;

pub use config::CopilotConfig;
pub use error::{CopilotError, Result};
pub use execution_loop::{ExecutionLoop, ExecutionOutcome};
pub use generator::SqlGenerator;
pub use pipeline::{Copilot, CopilotAnswer};
pub use schema::{ColumnDescriptor, FewShotExample, SchemaContext, TableContext};
pub use schema_rag::SchemaLinker;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
