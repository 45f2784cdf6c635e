mod common;

use analytics_copilot::evaluation::{
    build_report, calculate_metrics, evaluate_questions, format_report, load_golden_queries, save_report,
    select_queries,
};
use analytics_copilot::execution_loop::ExecutionLoop;
use analytics_copilot::generator::INSUFFICIENT_SCHEMA;
use analytics_copilot::pipeline::{NO_SQL_ERROR, NO_TABLES_ERROR};
use analytics_copilot::schema::table_names;
use analytics_copilot::schema_rag::{LinkTier, SchemaLinker};
use analytics_copilot::{Copilot, FewShotExample};
use common::*;
use std::sync::Arc;

const QUESTION: &str = "How many orders were placed in 2017?";

fn copilot(
    search: SearchBehavior,
    metadata: InMemoryMetadata,
    completion: Arc<ScriptedCompletion>,
    gateway: Arc<ScriptedGateway>,
) -> Copilot {
    let search = Arc::new(FakeSearch::new(search, log()));
    Copilot::new(
        SchemaLinker::new(search, Arc::new(metadata)),
        generator(completion),
        ExecutionLoop::new(gateway),
    )
}

fn orders_hits() -> SearchBehavior {
    SearchBehavior::Hits(vec![
        hit("ORDERS", "ORDER_ID", 0.9),
        hit("ORDERS", "ORDER_PURCHASE_TIMESTAMP", 0.8),
    ])
}

#[tokio::test]
async fn test_no_tables_stops_before_generation() {
    let completion = Arc::new(ScriptedCompletion::new().respond("SELECT 1"));
    let gateway = Arc::new(ScriptedGateway::new());
    let mut metadata = InMemoryMetadata::new(log());
    metadata.catalog_broken = true;
    let copilot = copilot(SearchBehavior::ServiceMissing, metadata, completion.clone(), gateway.clone());

    let answer = copilot.answer_question(QUESTION, 5, 3).await;

    assert_eq!(answer.outcome.error(), Some(NO_TABLES_ERROR));
    assert!(answer.final_sql.is_empty());
    assert_eq!(answer.link_tiers, LinkTier::ORDER.to_vec());
    assert_eq!(completion.calls(), 0);
    assert_eq!(gateway.explains(), 0);
}

#[tokio::test]
async fn test_no_sql_stops_before_warehouse() {
    let completion = Arc::new(ScriptedCompletion::new().respond(INSUFFICIENT_SCHEMA));
    let gateway = Arc::new(ScriptedGateway::new());
    let copilot = copilot(orders_hits(), InMemoryMetadata::new(log()), completion.clone(), gateway.clone());

    let answer = copilot.answer_question(QUESTION, 5, 3).await;

    assert_eq!(answer.outcome.error(), Some(NO_SQL_ERROR));
    assert_eq!(table_names(&answer.schema_context), vec!["ORDERS"]);
    assert!(answer.attempts.is_empty());
    assert_eq!(gateway.explains(), 0);
}

#[tokio::test]
async fn test_answers_question_end_to_end() {
    let completion = Arc::new(ScriptedCompletion::new().respond(
        "SELECT COUNT(DISTINCT ORDER_ID) AS ORDER_COUNT FROM ANALYTICS_COPILOT.RAW.ORDERS WHERE YEAR(ORDER_PURCHASE_TIMESTAMP) = 2017",
    ));
    let gateway = Arc::new(ScriptedGateway::new().run_returns(count_result(45101)));
    let copilot = copilot(orders_hits(), InMemoryMetadata::new(log()), completion.clone(), gateway.clone())
        .with_examples(vec![FewShotExample::new(
            "How many customers are there?",
            "SELECT COUNT(*) FROM ANALYTICS_COPILOT.RAW.CUSTOMERS",
        )]);

    let answer = copilot.answer_question(QUESTION, 5, 3).await;

    assert!(answer.outcome.is_success());
    assert_eq!(answer.link_tiers, vec![LinkTier::Semantic]);
    assert!(answer.final_sql.starts_with("SELECT COUNT(DISTINCT ORDER_ID)"));
    assert_eq!(answer.attempts.len(), 1);
    assert_eq!(*gateway.executed_sql.lock().unwrap(), vec![answer.final_sql.clone()]);
    assert!(completion.prompt(0).contains("ADDITIONAL EXAMPLES:"));
}

#[tokio::test]
async fn test_evaluation_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("golden_queries.json");
    std::fs::write(
        &input,
        r#"[
            {"id": 1, "question": "How many orders were placed in 2017?", "sql_query": "SELECT 1", "difficulty": "easy", "tables_used": ["ORDERS"]},
            {"id": 2, "question": "Which state has the most customers?", "sql_query": "SELECT 2", "difficulty": "medium", "tables_used": ["CUSTOMERS"]},
            {"id": 3, "question": "Average delivery delay per seller?", "sql_query": "SELECT 3", "difficulty": "hard"}
        ]"#,
    )
    .unwrap();

    let queries = load_golden_queries(&input).unwrap();
    assert_eq!(queries.len(), 3);
    let queries = select_queries(queries, None, Some(2));

    let completion = Arc::new(
        ScriptedCompletion::new()
            .respond("SELECT COUNT(*) FROM ANALYTICS_COPILOT.RAW.ORDERS")
            .respond(INSUFFICIENT_SCHEMA),
    );
    let gateway = Arc::new(ScriptedGateway::new().run_returns(count_result(45101)));
    let copilot = copilot(orders_hits(), InMemoryMetadata::new(log()), completion, gateway);

    let records = evaluate_questions(&copilot, &queries, 5, 1).await;
    assert_eq!(records.len(), 2);
    assert!(records[0].success);
    assert_eq!(records[0].attempts, 1);
    assert!(!records[1].success);
    assert_eq!(records[1].error_message.as_deref(), Some("SQL generator returned empty query"));

    let metrics = calculate_metrics(&records);
    assert_eq!(metrics.total_questions, 2);
    assert_eq!(metrics.successful_questions, 1);
    assert_eq!(metrics.execution_accuracy, 50.0);
    assert_eq!(metrics.by_difficulty["easy"].successful, 1);
    assert_eq!(metrics.by_difficulty["medium"].failed, 1);
    assert!(!metrics.by_difficulty.contains_key("hard"));
    assert_eq!(metrics.failed_queries.len(), 1);
    assert!(format_report(&metrics).contains("Execution Accuracy:   50.0%"));

    let output = dir.path().join("reports").join("evaluation_report.json");
    save_report(&build_report(metrics, records), &output).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(saved["metadata"]["total_questions"], 2);
    assert_eq!(saved["detailed_results"][1]["success"], false);
}
