//! End-to-end pipeline tests over the real in-memory services.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vesta::services::{
    ExecutionService, SchemasService, ToolDataService, ToolService, ZoneService,
};
use vesta::{PipelineConfig, TurnPipeline};
use vesta_core::{
    CommandStatus, Coordinator, ExecutableCommand, HistoryStore, MemoryHistoryStore, Params,
    ResourceService, ServiceCoordinator, SqliteHistoryStore, SystemMessageType,
};

async fn build_coordinator() -> Arc<ServiceCoordinator> {
    let coordinator = Arc::new(ServiceCoordinator::new());
    let tools = Arc::new(ToolService::new());
    coordinator.register(Arc::new(ZoneService::new())).await;
    coordinator
        .register(Arc::clone(&tools) as Arc<dyn ResourceService>)
        .await;
    coordinator
        .register(Arc::new(ToolDataService::new(Arc::clone(&tools), 5)))
        .await;
    coordinator
        .register(Arc::new(ExecutionService::new(tools)))
        .await;
    coordinator
        .register(Arc::new(SchemasService::with_defaults()))
        .await;
    coordinator
}

async fn seed(coordinator: &ServiceCoordinator) {
    let cancel = CancellationToken::new();

    let mut tool = Params::new();
    tool.insert("id".into(), json!("sleep"));
    tool.insert("name".into(), json!("Sleep Tracker"));
    tool.insert("tool_type".into(), json!("tracker"));
    let created = coordinator
        .process_command("tools.create", &tool, &cancel)
        .await;
    assert!(created.success);

    for (value, ts) in [(7.5, 1_000i64), (6.0, 2_000), (8.2, 3_000)] {
        let mut entry = Params::new();
        entry.insert("id".into(), json!("sleep"));
        entry.insert("data".into(), json!({"value": value, "timestamp": ts}));
        let result = coordinator
            .process_command("tool_data.create", &entry, &cancel)
            .await;
        assert!(result.success);
    }
}

async fn build_pipeline(config: PipelineConfig) -> (TurnPipeline, Arc<MemoryHistoryStore>) {
    let coordinator = build_coordinator().await;
    seed(&coordinator).await;
    let history = Arc::new(MemoryHistoryStore::new());
    let pipeline = TurnPipeline::new(
        coordinator as Arc<dyn Coordinator>,
        Arc::clone(&history) as Arc<dyn HistoryStore>,
        config,
    );
    (pipeline, history)
}

fn use_enrichment() -> serde_json::Value {
    json!({"type": "use", "toolInstanceId": "sleep"})
}

fn data_pointer() -> serde_json::Value {
    json!({
        "type": "pointer",
        "selectedPath": "tools.sleep",
        "selectionLevel": "INSTANCE",
        "selectedContext": "DATA",
        "selectedResources": ["schema", "data"],
        "importance": "essential"
    })
}

#[tokio::test]
async fn test_turn_fetches_data_and_assembles_prompt() {
    let (pipeline, _) = build_pipeline(PipelineConfig::default()).await;
    let session = Uuid::new_v4();
    let cancel = CancellationToken::new();

    let outcome = pipeline
        .run_turn(
            &[use_enrichment(), data_pointer()],
            Some(session),
            false,
            &cancel,
        )
        .await
        .unwrap();

    // Use (5 commands) runs before the pointer (3 commands); the pointer's
    // two schema fetches are served from the batch cache.
    assert_eq!(outcome.messages.len(), 1);
    let message = &outcome.messages[0];
    assert_eq!(message.message_type, SystemMessageType::DataAdded);
    assert_eq!(message.command_results.len(), 8);
    assert_eq!(message.summary, "All 8 commands succeeded");

    let cached = message
        .command_results
        .iter()
        .filter(|r| r.status == CommandStatus::Cached)
        .count();
    assert_eq!(cached, 2);

    assert!(outcome.prompt_block.contains("## "));
    assert!(outcome.prompt_block.contains("Sleep Tracker"));
    assert_eq!(
        outcome.enrichment_summaries,
        vec![
            "Preparing to use tool sleep".to_string(),
            "Shared recorded data of tools.sleep".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_schema_fetches_cached_across_turns() {
    let (pipeline, _) = build_pipeline(PipelineConfig::default()).await;
    let session = Uuid::new_v4();
    let cancel = CancellationToken::new();

    pipeline
        .run_turn(&[use_enrichment()], Some(session), false, &cancel)
        .await
        .unwrap();

    let second = pipeline
        .run_turn(&[use_enrichment()], Some(session), false, &cancel)
        .await
        .unwrap();

    let statuses: Vec<CommandStatus> = second.messages[0]
        .command_results
        .iter()
        .map(|r| r.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            CommandStatus::Success,
            CommandStatus::Cached,
            CommandStatus::Cached,
            CommandStatus::Success,
            CommandStatus::Success,
        ]
    );
    // Cached fetches contribute nothing to the prompt.
    assert_eq!(second.prompt_block.matches("## ").count(), 3);
}

#[tokio::test]
async fn test_command_cap_reports_overflow() {
    let config = PipelineConfig {
        max_commands_per_turn: 3,
        ..PipelineConfig::default()
    };
    let (pipeline, _) = build_pipeline(config).await;
    let cancel = CancellationToken::new();

    let outcome = pipeline
        .run_turn(&[use_enrichment()], None, false, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome.messages.len(), 2);
    let limit = &outcome.messages[0];
    assert_eq!(limit.message_type, SystemMessageType::LimitReached);
    assert_eq!(limit.command_results.len(), 2);
    assert!(limit
        .command_results
        .iter()
        .all(|r| r.status == CommandStatus::Failed));

    let executed = &outcome.messages[1];
    assert_eq!(executed.message_type, SystemMessageType::DataAdded);
    assert_eq!(executed.command_results.len(), 3);
}

#[tokio::test]
async fn test_unparseable_enrichment_reported_not_fatal() {
    let (pipeline, history) = build_pipeline(PipelineConfig::default()).await;
    let session = Uuid::new_v4();
    let cancel = CancellationToken::new();

    let outcome = pipeline
        .run_turn(
            &[json!({"type": "pointer"}), json!({"type": "document"})],
            Some(session),
            false,
            &cancel,
        )
        .await
        .unwrap();

    let format_error = &outcome.messages[0];
    assert_eq!(format_error.message_type, SystemMessageType::FormatError);
    assert_eq!(format_error.summary, "Could not parse 1 enrichment(s)");

    // The document enrichment still produced its summary; nothing executed.
    assert_eq!(outcome.enrichment_summaries, vec!["Added a note".to_string()]);
    let executed = outcome.messages.last().unwrap();
    assert_eq!(executed.summary, "No commands executed");

    let persisted = history.load_session(session).await.unwrap();
    assert_eq!(persisted.len(), 2);
}

#[tokio::test]
async fn test_schema_resolution_failure_isolated_per_enrichment() {
    let (pipeline, _) = build_pipeline(PipelineConfig::default()).await;
    let cancel = CancellationToken::new();

    // One enrichment targets a tool instance that does not exist.
    let missing = json!({"type": "use", "toolInstanceId": "ghost"});
    let outcome = pipeline
        .run_turn(&[missing, use_enrichment()], None, false, &cancel)
        .await
        .unwrap();

    let format_error = &outcome.messages[0];
    assert_eq!(format_error.message_type, SystemMessageType::FormatError);
    assert!(format_error.command_results[0]
        .details
        .as_ref()
        .unwrap()
        .contains("Use"));

    // The healthy enrichment still ran in full.
    let executed = outcome.messages.last().unwrap();
    assert_eq!(executed.summary, "All 5 commands succeeded");
}

#[tokio::test]
async fn test_action_batch_isolates_failures() {
    let (pipeline, history) = build_pipeline(PipelineConfig::default()).await;
    let session = Uuid::new_v4();
    let cancel = CancellationToken::new();

    let commands = vec![
        ExecutableCommand::action("tool_data", "create")
            .with_param("id", "sleep")
            .with_param("data", json!({"value": 9.0})),
        ExecutableCommand::action("tool_data", "delete")
            .with_param("id", "sleep")
            .with_param("entry_id", "no-such-entry"),
    ];

    let outcome = pipeline
        .execute_actions(&commands, Some(session), &cancel)
        .await
        .unwrap();

    let message = &outcome.messages[0];
    assert_eq!(message.message_type, SystemMessageType::ActionsExecuted);
    assert_eq!(message.summary, "1 of 2 commands succeeded, 1 failed");
    assert!(message.command_results.iter().all(|r| r.is_action_command));
    assert!(outcome.prompt_block.contains("Created data entry"));

    let persisted = history.load_session(session).await.unwrap();
    assert_eq!(persisted.len(), 1);
}

#[tokio::test]
async fn test_cancelled_turn_marks_commands_without_dispatch() {
    let (pipeline, _) = build_pipeline(PipelineConfig::default()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let commands = vec![ExecutableCommand::query("tool_data", "get").with_param("id", "sleep")];
    let outcome = pipeline.execute_actions(&commands, None, &cancel).await.unwrap();
    assert_eq!(
        outcome.messages[0].command_results[0].status,
        CommandStatus::Cancelled
    );
    assert!(outcome.prompt_block.is_empty());
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("history.db");
    let session = Uuid::new_v4();

    {
        let coordinator = build_coordinator().await;
        seed(&coordinator).await;
        let history = Arc::new(SqliteHistoryStore::from_path(&db_path).await.unwrap());
        let pipeline = TurnPipeline::new(
            coordinator as Arc<dyn Coordinator>,
            history as Arc<dyn HistoryStore>,
            PipelineConfig::default(),
        );
        pipeline
            .run_turn(
                &[use_enrichment()],
                Some(session),
                false,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    let reopened = SqliteHistoryStore::from_path(&db_path).await.unwrap();
    let messages = reopened.load_session(session).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, SystemMessageType::DataAdded);
    let schema_ids: Vec<&str> = messages[0].successful_schema_ids().collect();
    assert_eq!(schema_ids, vec!["tracker_config", "tracker_data"]);
}
