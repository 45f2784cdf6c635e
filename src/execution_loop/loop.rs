//! Execution Loop
//!
//! Bounded validate -> execute -> regenerate cycle.
//!
//! Validating --ok--> Executing --ok--> Succeeded
//!     |                  |
//!     +--err--+----------+--err--> Failed (retries exhausted)
//!             v
//!        Regenerating --> Validating (attempt + 1)

use crate::execution_loop::error_classifier::{normalize_error, ErrorClassifier, SqlErrorClass};
use crate::execution_loop::error_recovery::ErrorRecovery;
use crate::generator::SqlGenerator;
use crate::schema::TableContext;
use crate::warehouse::{ResultHandle, WarehouseGateway};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub const EMPTY_SQL_ERROR: &str = "Empty SQL query provided to validator. Cannot validate empty query.";

/// Terminal value of a validation run
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Success(ResultHandle),
    Failure(String),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Failure(msg) => Some(msg),
            ExecutionOutcome::Success(_) => None,
        }
    }
}

/// Where an attempt stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptStage {
    Validation,
    Execution,
}

impl fmt::Display for AttemptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStage::Validation => write!(f, "validation"),
            AttemptStage::Execution => write!(f, "execution"),
        }
    }
}

/// Immutable record of one validate/execute iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// 0-based; attempt 0 runs the caller's SQL
    pub attempt: u32,
    pub sql: String,
    pub stage: AttemptStage,
    pub error: Option<String>,
    pub error_class: Option<SqlErrorClass>,
}

impl AttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Loop-owned state, replaced (never mutated) between iterations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<String>,
    pub current_sql: String,
}

#[derive(Debug)]
enum LoopState {
    Validating,
    Executing,
    Regenerating,
    Succeeded(ResultHandle),
    Failed,
}

/// Result of `validate_and_execute`
#[derive(Debug, Clone)]
pub struct ValidationRun {
    /// SQL of the last attempt made
    pub final_sql: String,
    pub outcome: ExecutionOutcome,
    pub attempts: Vec<AttemptRecord>,
}

/// Validator/executor with bounded self-correction
pub struct ExecutionLoop {
    gateway: Arc<dyn WarehouseGateway>,
    error_classifier: ErrorClassifier,
    error_recovery: ErrorRecovery,
}

impl ExecutionLoop {
    pub fn new(gateway: Arc<dyn WarehouseGateway>) -> Self {
        Self {
            gateway,
            error_classifier: ErrorClassifier::new(),
            error_recovery: ErrorRecovery::new(),
        }
    }

    /// Validate (EXPLAIN) then run `candidate_sql`, regenerating with error
    /// feedback up to `max_retries` times. At most `max_retries + 1`
    /// iterations run; a negative budget means a single attempt.
    pub async fn validate_and_execute(
        &self,
        generator: &SqlGenerator,
        candidate_sql: &str,
        question: &str,
        context: &[TableContext],
        max_retries: i32,
    ) -> ValidationRun {
        if candidate_sql.trim().is_empty() {
            warn!("{}", EMPTY_SQL_ERROR);
            return ValidationRun {
                final_sql: candidate_sql.to_string(),
                outcome: ExecutionOutcome::Failure(EMPTY_SQL_ERROR.to_string()),
                attempts: Vec::new(),
            };
        }

        let max_retries = if max_retries < 0 {
            warn!("Invalid max_retries value {}, using 0 (no retries)", max_retries);
            0
        } else {
            max_retries as u32
        };

        info!("Validating SQL with up to {} retries", max_retries);

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut retry = RetryState {
            attempt: 0,
            last_error: None,
            current_sql: candidate_sql.to_string(),
        };
        let mut state = LoopState::Validating;

        loop {
            state = match state {
                LoopState::Validating => {
                    info!("Attempt {}/{}: validating SQL", retry.attempt + 1, max_retries + 1);
                    match self.gateway.explain(&retry.current_sql).await {
                        Ok(()) => LoopState::Executing,
                        Err(e) => {
                            let raw = e.detail();
                            let message = normalize_error(&raw);
                            warn!("Validation failed: {}", message);
                            let (next, record) = self.fail(
                                &mut retry,
                                AttemptStage::Validation,
                                &raw,
                                message.clone(),
                                message,
                                max_retries,
                            );
                            attempts.push(record);
                            next
                        }
                    }
                }
                LoopState::Executing => match self.gateway.run(&retry.current_sql).await {
                    Ok(handle) => {
                        attempts.push(AttemptRecord {
                            attempt: retry.attempt,
                            sql: retry.current_sql.clone(),
                            stage: AttemptStage::Execution,
                            error: None,
                            error_class: None,
                        });
                        LoopState::Succeeded(handle)
                    }
                    Err(e) => {
                        let raw = e.detail();
                        let message = normalize_error(&raw);
                        warn!("Execution failed despite passing validation: {}", message);
                        let (next, record) = self.fail(
                            &mut retry,
                            AttemptStage::Execution,
                            &raw,
                            message.clone(),
                            format!("Execution error: {}", message),
                            max_retries,
                        );
                        attempts.push(record);
                        next
                    }
                },
                LoopState::Regenerating => {
                    retry = self.regenerate(generator, question, context, &attempts, retry).await;
                    LoopState::Validating
                }
                LoopState::Succeeded(handle) => {
                    info!("Execution succeeded on attempt {}", retry.attempt + 1);
                    return ValidationRun {
                        final_sql: retry.current_sql,
                        outcome: ExecutionOutcome::Success(handle),
                        attempts,
                    };
                }
                LoopState::Failed => {
                    warn!("Max retries ({}) reached, returning error", max_retries);
                    let message = retry
                        .last_error
                        .unwrap_or_else(|| "Unknown error occurred during validation".to_string());
                    return ValidationRun {
                        final_sql: retry.current_sql,
                        outcome: ExecutionOutcome::Failure(message),
                        attempts,
                    };
                }
            };
        }
    }

    /// Record a failed iteration and choose between regenerating and giving up.
    /// The class comes from the full diagnostic; its first line is often only
    /// "SQL compilation error:".
    fn fail(
        &self,
        retry: &mut RetryState,
        stage: AttemptStage,
        raw_error: &str,
        feedback: String,
        last_error: String,
        max_retries: u32,
    ) -> (LoopState, AttemptRecord) {
        let record = AttemptRecord {
            attempt: retry.attempt,
            sql: retry.current_sql.clone(),
            stage,
            error_class: Some(self.error_classifier.classify(raw_error)),
            error: Some(feedback),
        };

        *retry = RetryState {
            attempt: retry.attempt,
            last_error: Some(last_error),
            current_sql: retry.current_sql.clone(),
        };

        let next = if retry.attempt < max_retries {
            LoopState::Regenerating
        } else {
            LoopState::Failed
        };
        (next, record)
    }

    /// New retry state for the next iteration. Keeps the failed SQL when
    /// regeneration produces nothing.
    async fn regenerate(
        &self,
        generator: &SqlGenerator,
        question: &str,
        context: &[TableContext],
        attempts: &[AttemptRecord],
        retry: RetryState,
    ) -> RetryState {
        let (feedback, class) = attempts
            .last()
            .map(|r| {
                (
                    r.error.clone().unwrap_or_default(),
                    r.error_class.clone().unwrap_or(SqlErrorClass::Other),
                )
            })
            .unwrap_or_else(|| (String::new(), SqlErrorClass::Other));

        info!(
            "Regenerating SQL with error feedback: {}",
            feedback.chars().take(100).collect::<String>()
        );

        let enriched = self
            .error_recovery
            .enriched_question(question, &feedback, &retry.current_sql, &class);

        let current_sql = match generator.generate_sql(&enriched, context, &[]).await {
            Some(sql) => sql,
            None => {
                warn!("SQL regeneration returned empty query, keeping previous SQL");
                retry.current_sql
            }
        };

        RetryState {
            attempt: retry.attempt + 1,
            last_error: retry.last_error,
            current_sql,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let failure = ExecutionOutcome::Failure("boom".to_string());
        assert!(!failure.is_success());
        assert_eq!(failure.error(), Some("boom"));

        let success = ExecutionOutcome::Success(ResultHandle::in_memory(Vec::new(), Vec::new()));
        assert!(success.is_success());
        assert_eq!(success.error(), None);
    }
}
