//! Golden-query evaluation
//!
//! Runs a corpus of questions through the full pipeline and reports
//! execution accuracy and latency, overall and per difficulty.

use crate::error::{CopilotError, Result};
use crate::pipeline::Copilot;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Instant;
use tracing::info;

pub const DIFFICULTIES: &[&str] = &["easy", "medium", "hard"];
const FAILED_SQL_PREVIEW: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenQuery {
    #[serde(default)]
    pub id: serde_json::Value,
    pub question: String,
    #[serde(default)]
    pub sql_query: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub tables_used: serde_json::Value,
    #[serde(default)]
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedTable {
    pub table_name: String,
    pub relevance_score: f64,
}

/// Outcome of one golden question
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub id: serde_json::Value,
    pub question: String,
    pub expected_sql: String,
    pub difficulty: String,
    pub tables_used: serde_json::Value,
    pub generated_sql: String,
    pub success: bool,
    pub latency_seconds: f64,
    pub error_message: Option<String>,
    pub schema_context: Vec<LinkedTable>,
    pub attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultyMetrics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub accuracy: f64,
    pub average_latency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedQuery {
    pub id: serde_json::Value,
    pub question: String,
    pub difficulty: String,
    pub error_message: Option<String>,
    pub generated_sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationMetrics {
    pub total_questions: usize,
    pub successful_questions: usize,
    pub failed_questions: usize,
    /// Percentage, 0-100
    pub execution_accuracy: f64,
    pub average_latency: f64,
    pub by_difficulty: BTreeMap<String, DifficultyMetrics>,
    pub failed_queries: Vec<FailedQuery>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub timestamp: String,
    pub total_questions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub metadata: ReportMetadata,
    pub metrics: EvaluationMetrics,
    pub detailed_results: Vec<EvaluationRecord>,
}

/// Load a JSON array of golden queries
pub fn load_golden_queries(path: &Path) -> Result<Vec<GoldenQuery>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CopilotError::Config(format!("Golden queries file not found at {}: {}", path.display(), e))
    })?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    if !value.is_array() {
        return Err(CopilotError::Config(format!(
            "{} must contain a JSON array",
            path.display()
        )));
    }
    Ok(serde_json::from_value(value)?)
}

/// Apply the difficulty filter, then keep the first `limit` queries
pub fn select_queries(queries: Vec<GoldenQuery>, difficulty: Option<&str>, limit: Option<usize>) -> Vec<GoldenQuery> {
    let mut selected: Vec<GoldenQuery> = match difficulty {
        Some(level) => queries.into_iter().filter(|q| q.difficulty == level).collect(),
        None => queries,
    };
    if let Some(limit) = limit {
        selected.truncate(limit);
    }
    selected
}

/// Run every query through the pipeline, sequentially
pub async fn evaluate_questions(
    copilot: &Copilot,
    queries: &[GoldenQuery],
    link_limit: usize,
    max_retries: i32,
) -> Vec<EvaluationRecord> {
    let total = queries.len();
    let mut records = Vec::with_capacity(total);

    for (i, query) in queries.iter().enumerate() {
        info!(
            "[{}/{}] Evaluating: {}",
            i + 1,
            total,
            query.question.chars().take(60).collect::<String>()
        );

        let started = Instant::now();
        let answer = copilot.answer_question(&query.question, link_limit, max_retries).await;
        let latency_seconds = started.elapsed().as_secs_f64();

        let error_message = if answer.schema_context.is_empty() {
            Some("Schema linker found no relevant tables".to_string())
        } else if answer.final_sql.is_empty() {
            Some("SQL generator returned empty query".to_string())
        } else {
            answer.outcome.error().map(str::to_string)
        };
        let success = error_message.is_none();

        if success {
            info!("  Success ({:.2}s)", latency_seconds);
        } else {
            info!("  Failed: {}", error_message.as_deref().unwrap_or_default());
        }

        records.push(EvaluationRecord {
            id: if query.id.is_null() {
                serde_json::Value::from(i + 1)
            } else {
                query.id.clone()
            },
            question: query.question.clone(),
            expected_sql: query.sql_query.clone(),
            difficulty: query.difficulty.clone(),
            tables_used: query.tables_used.clone(),
            generated_sql: answer.final_sql,
            success,
            latency_seconds,
            error_message,
            schema_context: answer
                .schema_context
                .iter()
                .map(|t| LinkedTable {
                    table_name: t.table_name.clone(),
                    relevance_score: t.relevance_score,
                })
                .collect(),
            attempts: answer.attempts.len(),
        });
    }

    records
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn mean_latency(records: &[&EvaluationRecord]) -> f64 {
    if records.is_empty() {
        0.0
    } else {
        records.iter().map(|r| r.latency_seconds).sum::<f64>() / records.len() as f64
    }
}

pub fn calculate_metrics(records: &[EvaluationRecord]) -> EvaluationMetrics {
    let all: Vec<&EvaluationRecord> = records.iter().collect();
    let total = all.len();
    let successful = all.iter().filter(|r| r.success).count();

    let mut by_difficulty = BTreeMap::new();
    for level in DIFFICULTIES {
        let subset: Vec<&EvaluationRecord> = all.iter().copied().filter(|r| r.difficulty == *level).collect();
        if subset.is_empty() {
            continue;
        }
        let ok = subset.iter().filter(|r| r.success).count();
        by_difficulty.insert(
            level.to_string(),
            DifficultyMetrics {
                total: subset.len(),
                successful: ok,
                failed: subset.len() - ok,
                accuracy: percentage(ok, subset.len()),
                average_latency: mean_latency(&subset),
            },
        );
    }

    let failed_queries = records
        .iter()
        .filter(|r| !r.success)
        .map(|r| FailedQuery {
            id: r.id.clone(),
            question: r.question.clone(),
            difficulty: r.difficulty.clone(),
            error_message: r.error_message.clone(),
            generated_sql: preview_sql(&r.generated_sql),
        })
        .collect();

    EvaluationMetrics {
        total_questions: total,
        successful_questions: successful,
        failed_questions: total - successful,
        execution_accuracy: percentage(successful, total),
        average_latency: mean_latency(&all),
        by_difficulty,
        failed_queries,
    }
}

fn preview_sql(sql: &str) -> String {
    if sql.chars().count() > FAILED_SQL_PREVIEW {
        format!("{}...", sql.chars().take(FAILED_SQL_PREVIEW).collect::<String>())
    } else {
        sql.to_string()
    }
}

pub fn build_report(metrics: EvaluationMetrics, records: Vec<EvaluationRecord>) -> EvaluationReport {
    EvaluationReport {
        metadata: ReportMetadata {
            timestamp: Utc::now().to_rfc3339(),
            total_questions: metrics.total_questions,
        },
        metrics,
        detailed_results: records,
    }
}

/// Write the report as pretty JSON, creating the parent directory
pub fn save_report(report: &EvaluationReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    info!("Report saved to: {}", path.display());
    Ok(())
}

/// Human-readable summary
pub fn format_report(metrics: &EvaluationMetrics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "OVERALL RESULTS");
    let _ = writeln!(out, "{}", "-".repeat(70));
    let _ = writeln!(out, "Total Questions:      {}", metrics.total_questions);
    let _ = writeln!(out, "Successful:           {}", metrics.successful_questions);
    let _ = writeln!(out, "Failed:               {}", metrics.failed_questions);
    let _ = writeln!(out, "Execution Accuracy:   {:.1}%", metrics.execution_accuracy);
    let _ = writeln!(out, "Average Latency:      {:.2} seconds", metrics.average_latency);
    let _ = writeln!(out);
    let _ = writeln!(out, "BREAKDOWN BY DIFFICULTY");
    let _ = writeln!(out, "{}", "-".repeat(70));
    for level in DIFFICULTIES {
        let Some(m) = metrics.by_difficulty.get(*level) else {
            continue;
        };
        let _ = writeln!(out, "\n{}:", level.to_uppercase());
        let _ = writeln!(out, "  Total:       {}", m.total);
        let _ = writeln!(out, "  Successful:  {}", m.successful);
        let _ = writeln!(out, "  Failed:      {}", m.failed);
        let _ = writeln!(out, "  Accuracy:    {:.1}%", m.accuracy);
        let _ = writeln!(out, "  Avg Latency: {:.2}s", m.average_latency);
    }
    let _ = writeln!(out);

    if metrics.failed_queries.is_empty() {
        let _ = writeln!(out, "No failed queries!");
        return out;
    }
    let _ = writeln!(out, "FAILED QUERIES");
    let _ = writeln!(out, "{}", "-".repeat(70));
    for (i, failed) in metrics.failed_queries.iter().enumerate() {
        let _ = writeln!(out, "\n{}. Question #{} ({})", i + 1, failed.id, failed.difficulty);
        let _ = writeln!(out, "   Q: {}", failed.question.chars().take(60).collect::<String>());
        if let Some(error) = &failed.error_message {
            let _ = writeln!(out, "   Error: {}", error.chars().take(100).collect::<String>());
        }
        if !failed.generated_sql.is_empty() {
            let _ = writeln!(out, "   SQL: {}", failed.generated_sql.chars().take(80).collect::<String>());
        }
    }
    out
}
