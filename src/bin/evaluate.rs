//! Evaluate the copilot against a golden-query corpus
//!
//! Run with: cargo run --bin evaluate -- --limit 10 --difficulty easy

use analytics_copilot::evaluation::{
    build_report, calculate_metrics, evaluate_questions, format_report, load_golden_queries,
    save_report, select_queries,
};
use analytics_copilot::{init_tracing, Copilot, CopilotConfig};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

#[derive(Clone, Copy, ValueEnum)]
enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Parser)]
#[command(name = "evaluate")]
#[command(about = "Measure execution accuracy and latency over golden queries")]
struct Args {
    /// Evaluate only the first N questions
    #[arg(long)]
    limit: Option<usize>,

    /// Evaluate only questions of this difficulty
    #[arg(long, value_enum)]
    difficulty: Option<Difficulty>,

    #[arg(long, default_value = "data/golden_queries.json")]
    input: PathBuf,

    #[arg(long, default_value = "data/evaluation_report.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let queries = load_golden_queries(&args.input)?;
    let queries = select_queries(queries, args.difficulty.map(|d| d.as_str()), args.limit);
    info!("Loaded {} questions to evaluate", queries.len());
    if queries.is_empty() {
        info!("No questions to evaluate");
        return Ok(());
    }

    let config = CopilotConfig::from_env()?;
    let copilot = Copilot::from_config(&config)?;

    let records = evaluate_questions(&copilot, &queries, config.link_limit, config.max_retries).await;
    let metrics = calculate_metrics(&records);
    println!("{}", format_report(&metrics));

    save_report(&build_report(metrics, records), &args.output)?;
    Ok(())
}
