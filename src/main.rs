use analytics_copilot::execution_loop::ExecutionOutcome;
use analytics_copilot::{init_tracing, Copilot, CopilotConfig, TableContext};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "copilot")]
#[command(about = "Answer analytics questions with SQL generated over the warehouse schema")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Tables to link per question (default: COPILOT_LINK_LIMIT or 5)
    #[arg(long, global = true)]
    limit: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Link, generate, validate and execute
    Ask {
        question: String,

        /// Self-correction retries (default: COPILOT_MAX_RETRIES or 3)
        #[arg(long, allow_hyphen_values = true)]
        max_retries: Option<i32>,

        /// Rows to print from the result
        #[arg(long, default_value_t = 20)]
        rows: usize,
    },
    /// Show the schema context linked for a question
    Link { question: String },
    /// Print the first candidate SQL without executing it
    Generate { question: String },
}

fn print_context(context: &[TableContext]) {
    println!("Linked tables:");
    for table in context {
        println!(
            "  {} (relevance {:.2}, {} columns)",
            table.table_name,
            table.relevance_score,
            table.columns.len()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = CopilotConfig::from_env()?;
    let limit = args.limit.unwrap_or(config.link_limit);
    let copilot = Copilot::from_config(&config)?;

    match args.command {
        Command::Ask {
            question,
            max_retries,
            rows,
        } => {
            info!("Question: {}", question);
            let answer = copilot
                .answer_question(&question, limit, max_retries.unwrap_or(config.max_retries))
                .await;

            print_context(&answer.schema_context);
            if !answer.final_sql.is_empty() {
                println!("\nSQL ({} attempt(s)):\n{}\n", answer.attempts.len(), answer.final_sql);
            }

            match answer.outcome {
                ExecutionOutcome::Success(handle) => {
                    let df = handle.to_dataframe(rows).await?;
                    println!("{}", df);
                    if let Some(total) = handle.total_rows() {
                        println!("{} row(s) total", total);
                    }
                }
                ExecutionOutcome::Failure(message) => {
                    anyhow::bail!("{}", message);
                }
            }
        }
        Command::Link { question } => {
            let context = copilot.linker().link_schema(&question, limit).await;
            print_context(&context);
            for table in &context {
                println!("\n{}", table.table_name);
                for column in &table.columns {
                    println!("  - {} ({}): {}", column.column_name, column.data_type, column.description);
                }
            }
        }
        Command::Generate { question } => {
            let context = copilot.linker().link_schema(&question, limit).await;
            match copilot
                .generator()
                .generate_sql(&question, &context, copilot.examples())
                .await
            {
                Some(sql) => println!("{}", sql),
                None => anyhow::bail!("No SQL could be generated for this question"),
            }
        }
    }

    Ok(())
}
