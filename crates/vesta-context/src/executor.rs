//! Command executor - runs a batch through the coordinator
//!
//! Commands execute strictly sequentially so that the intra-batch
//! deduplication set needs no synchronization. Each command is isolated:
//! validation failures, service rejections and cancellations produce a
//! result for that command and the loop moves on. The batch always yields
//! exactly one result per command plus one system message.
//!
//! Schema fetches are deduplicated against two caches: the ids fetched
//! earlier in the same batch, and the ids fetched on previous turns of the
//! session (rebuilt by scanning persisted DATA_ADDED messages).

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use vesta_core::{
    CommandResult, Coordinator, ExecutableCommand, HistoryStore, Params, PromptCommandResult,
    Result, SystemMessage, SystemMessageType,
};

use crate::format;

/// Result of executing one batch.
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Prompt fragments for successful queries and actions, in order
    pub prompt_results: Vec<PromptCommandResult>,
    /// The audit record appended to session history
    pub system_message: SystemMessage,
}

/// Executes command batches with failure isolation and schema deduplication.
pub struct CommandExecutor {
    coordinator: Arc<dyn Coordinator>,
    history: Arc<dyn HistoryStore>,
}

impl CommandExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(coordinator: Arc<dyn Coordinator>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            coordinator,
            history,
        }
    }

    /// Execute a batch and aggregate it into one system message.
    ///
    /// When `session_id` is given the resulting message is appended to that
    /// session, and the session's earlier messages seed the cross-turn
    /// schema cache.
    #[instrument(skip_all, fields(commands = commands.len(), message_type = %message_type))]
    pub async fn execute_commands(
        &self,
        commands: &[ExecutableCommand],
        message_type: SystemMessageType,
        session_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let session_schemas = match session_id {
            Some(sid) => self.load_session_schema_ids(sid).await,
            None => HashSet::new(),
        };
        let mut batch_schemas: HashSet<String> = HashSet::new();

        let mut results = Vec::with_capacity(commands.len());
        let mut prompt_results = Vec::new();
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut cancelled = 0usize;

        for command in commands {
            let command_id = command.command_id();

            if cancel.is_cancelled() {
                cancelled += 1;
                results.push(
                    CommandResult::cancelled(&command_id).as_action(command.is_action_command),
                );
                continue;
            }

            // Schema fetches already satisfied by history or by an earlier
            // command in this batch are skipped without dispatching.
            if let Some(schema_id) = command.schema_id() {
                if session_schemas.contains(schema_id) || batch_schemas.contains(schema_id) {
                    debug!(schema_id = %schema_id, "schema fetch served from cache");
                    succeeded += 1;
                    let mut data = Params::new();
                    data.insert("schema_id".into(), schema_id.into());
                    results.push(
                        CommandResult::cached(&command_id)
                            .with_data(data)
                            .with_details("Schema already available in conversation context"),
                    );
                    continue;
                }
            }

            if let Err(description) = validate_parameters(command) {
                failed += 1;
                results.push(
                    CommandResult::failed(&command_id, &description)
                        .with_details(format!("Could not execute {command_id}: {description}"))
                        .as_action(command.is_action_command),
                );
                continue;
            }

            let operation = self
                .coordinator
                .process_command(&command_id, &command.params, cancel)
                .await;

            if operation.cancelled {
                cancelled += 1;
                results.push(
                    CommandResult::cancelled(&command_id).as_action(command.is_action_command),
                );
                continue;
            }

            if !operation.success {
                let error = operation
                    .error
                    .unwrap_or_else(|| "unknown error".to_string());
                warn!(command = %command_id, error = %error, "command failed");
                failed += 1;
                results.push(
                    CommandResult::failed(&command_id, &error)
                        .with_details(format!("Could not execute {command_id}: {error}"))
                        .as_action(command.is_action_command),
                );
                continue;
            }

            succeeded += 1;
            let data = operation.data.unwrap_or_default();
            if let Some(schema_id) = command.schema_id() {
                batch_schemas.insert(schema_id.to_string());
            }

            let projected = format::project_data(command, &data);
            let details = if command.is_action_command {
                let verbalized = format::verbalize_action(command, Some(&data));
                prompt_results.push(PromptCommandResult {
                    data_title: verbalized.clone(),
                    formatted_data: projected
                        .as_ref()
                        .map(format::format_prompt_body)
                        .unwrap_or_default(),
                });
                verbalized
            } else {
                let title = format::data_title(command, &data);
                prompt_results.push(PromptCommandResult {
                    data_title: title.clone(),
                    formatted_data: format::format_prompt_body(&data),
                });
                title
            };

            let mut result = CommandResult::success(&command_id)
                .with_details(details)
                .as_action(command.is_action_command);
            if let Some(projected) = projected {
                result = result.with_data(projected);
            }
            results.push(result);
        }

        let summary = summarize(commands.len(), succeeded, failed, cancelled);
        let system_message = SystemMessage::new(message_type, results, summary);

        if let Some(sid) = session_id {
            self.history.append(sid, &system_message).await?;
        }

        Ok(ExecutionOutcome {
            prompt_results,
            system_message,
        })
    }

    /// Schema ids fetched successfully on earlier turns of the session.
    async fn load_session_schema_ids(&self, session_id: Uuid) -> HashSet<String> {
        match self.history.load_session(session_id).await {
            Ok(messages) => messages
                .iter()
                .filter(|m| m.message_type == SystemMessageType::DataAdded)
                .flat_map(SystemMessage::successful_schema_ids)
                .map(str::to_string)
                .collect(),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "failed to load session history");
                HashSet::new()
            }
        }
    }
}

/// Required parameters per command; unknown commands pass and are left to
/// their service to reject.
fn required_parameters(command_id: &str) -> &'static [&'static str] {
    match command_id {
        "zones.get" | "zones.update" | "zones.delete" => &["id"],
        "tools.get" | "tools.update" | "tools.delete" => &["id"],
        "schemas.get" => &["schema_id"],
        "tool_data.get" | "tool_data.sample" | "tool_data.stats" => &["id"],
        "tool_data.create" => &["id", "data"],
        "tool_data.update" | "tool_data.delete" => &["id", "entry_id"],
        "tool_data.batch_create" => &["id", "entries"],
        "tool_data.batch_delete" => &["id", "entry_ids"],
        "executions.list" => &["id"],
        "zones.create" | "tools.create" => &["name"],
        _ => &[],
    }
}

fn validate_parameters(command: &ExecutableCommand) -> std::result::Result<(), String> {
    let command_id = command.command_id();
    for required in required_parameters(&command_id) {
        match command.params.get(*required) {
            Some(value) if !value.is_null() => {}
            _ => return Err(format!("missing required parameter '{required}'")),
        }
    }
    Ok(())
}

fn summarize(total: usize, succeeded: usize, failed: usize, cancelled: usize) -> String {
    if total == 0 {
        return "No commands executed".to_string();
    }
    if failed == total {
        return format!("All {total} commands failed");
    }
    if succeeded == total {
        return format!("All {total} commands succeeded");
    }
    let mut summary = format!("{succeeded} of {total} commands succeeded, {failed} failed");
    if cancelled > 0 {
        summary.push_str(&format!(", {cancelled} cancelled"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    use vesta_core::{CommandStatus, MemoryHistoryStore, OperationResult};

    /// Coordinator fake that records every dispatched command id and serves
    /// canned results per command.
    struct RecordingCoordinator {
        calls: Mutex<Vec<String>>,
        failures: Vec<&'static str>,
    }

    impl RecordingCoordinator {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures: Vec::new(),
            }
        }

        fn failing_on(commands: Vec<&'static str>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures: commands,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn dispatch_count_for(&self, command_id: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.as_str() == command_id)
                .count()
        }
    }

    #[async_trait]
    impl Coordinator for RecordingCoordinator {
        async fn process_command(
            &self,
            command_id: &str,
            params: &Params,
            _cancel: &CancellationToken,
        ) -> OperationResult {
            self.calls.lock().unwrap().push(command_id.to_string());
            if self.failures.contains(&command_id) {
                return OperationResult::fail("service rejected the operation");
            }
            let mut data = Params::new();
            match command_id {
                "schemas.get" => {
                    data.insert("schema_id".into(), params["schema_id"].clone());
                    data.insert("content".into(), json!({"type": "object"}));
                }
                "tools.get" => {
                    data.insert("id".into(), params["id"].clone());
                    data.insert("name".into(), json!("Sleep Tracker"));
                    data.insert("tool_type".into(), json!("tracker"));
                }
                "tool_data.get" => {
                    data.insert("id".into(), params["id"].clone());
                    data.insert("name".into(), json!("Sleep Tracker"));
                    data.insert("entries".into(), json!([{"value": 7.5}]));
                }
                "tool_data.create" => {
                    data.insert("id".into(), json!("E1"));
                    data.insert("name".into(), json!("entry"));
                    data.insert("created_at".into(), json!(1700000000000i64));
                }
                _ => {}
            }
            OperationResult::ok(data)
        }
    }

    fn executor(
        coordinator: Arc<RecordingCoordinator>,
        history: Arc<MemoryHistoryStore>,
    ) -> CommandExecutor {
        CommandExecutor::new(coordinator, history)
    }

    fn schema_fetch(schema_id: &str) -> ExecutableCommand {
        ExecutableCommand::query("schemas", "get").with_param("schema_id", schema_id)
    }

    #[tokio::test]
    async fn test_single_failure_never_aborts_the_batch() {
        let coordinator = Arc::new(RecordingCoordinator::failing_on(vec!["tool_data.get"]));
        let history = Arc::new(MemoryHistoryStore::new());
        let executor = executor(Arc::clone(&coordinator), history);

        let commands = vec![
            ExecutableCommand::query("tools", "get").with_param("id", "T1"),
            ExecutableCommand::query("tool_data", "get").with_param("id", "T1"),
            schema_fetch("tracker_data"),
        ];

        let outcome = executor
            .execute_commands(
                &commands,
                SystemMessageType::DataAdded,
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let results = &outcome.system_message.command_results;
        assert_eq!(results.len(), 3);
        let failed: Vec<_> = results
            .iter()
            .filter(|r| r.status == CommandStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].command, "tool_data.get");
        assert_eq!(
            outcome.system_message.summary,
            "2 of 3 commands succeeded, 1 failed"
        );
    }

    #[tokio::test]
    async fn test_intra_batch_schema_dedup() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let executor = executor(Arc::clone(&coordinator), history);

        let commands = vec![schema_fetch("tracker_data"), schema_fetch("tracker_data")];
        let outcome = executor
            .execute_commands(
                &commands,
                SystemMessageType::DataAdded,
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let results = &outcome.system_message.command_results;
        assert_eq!(results[0].status, CommandStatus::Success);
        assert_eq!(results[1].status, CommandStatus::Cached);
        assert_eq!(coordinator.dispatch_count_for("schemas.get"), 1);
        // Cached fetches produce no prompt fragment.
        assert_eq!(outcome.prompt_results.len(), 1);
        assert_eq!(outcome.system_message.summary, "All 2 commands succeeded");
    }

    #[tokio::test]
    async fn test_cross_turn_schema_dedup() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let executor = executor(Arc::clone(&coordinator), Arc::clone(&history));
        let session = Uuid::new_v4();
        let cancel = CancellationToken::new();

        executor
            .execute_commands(
                &[schema_fetch("tracker_data")],
                SystemMessageType::DataAdded,
                Some(session),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(coordinator.dispatch_count_for("schemas.get"), 1);

        let second = executor
            .execute_commands(
                &[schema_fetch("tracker_data")],
                SystemMessageType::DataAdded,
                Some(session),
                &cancel,
            )
            .await
            .unwrap();

        let results = &second.system_message.command_results;
        assert_eq!(results[0].status, CommandStatus::Cached);
        // The dispatcher observed no second call for the cached id.
        assert_eq!(coordinator.dispatch_count_for("schemas.get"), 1);
    }

    #[tokio::test]
    async fn test_cross_turn_cache_ignores_other_sessions() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let executor = executor(Arc::clone(&coordinator), Arc::clone(&history));
        let cancel = CancellationToken::new();

        executor
            .execute_commands(
                &[schema_fetch("tracker_data")],
                SystemMessageType::DataAdded,
                Some(Uuid::new_v4()),
                &cancel,
            )
            .await
            .unwrap();

        let other = executor
            .execute_commands(
                &[schema_fetch("tracker_data")],
                SystemMessageType::DataAdded,
                Some(Uuid::new_v4()),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(
            other.system_message.command_results[0].status,
            CommandStatus::Success
        );
        assert_eq!(coordinator.dispatch_count_for("schemas.get"), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_does_not_dispatch() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let executor = executor(Arc::clone(&coordinator), history);

        let commands = vec![ExecutableCommand::query("tool_data", "get")];
        let outcome = executor
            .execute_commands(
                &commands,
                SystemMessageType::DataAdded,
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let result = &outcome.system_message.command_results[0];
        assert_eq!(result.status, CommandStatus::Failed);
        assert!(result.error.as_ref().unwrap().contains("'id'"));
        assert!(result
            .details
            .as_ref()
            .unwrap()
            .starts_with("Could not execute tool_data.get"));
        assert!(coordinator.calls().is_empty());
        assert_eq!(outcome.system_message.summary, "All 1 commands failed");
    }

    #[tokio::test]
    async fn test_cancelled_token_marks_every_command() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let executor = executor(Arc::clone(&coordinator), history);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let commands = vec![
            ExecutableCommand::query("tools", "get").with_param("id", "T1"),
            schema_fetch("tracker_data"),
        ];
        let outcome = executor
            .execute_commands(&commands, SystemMessageType::DataAdded, None, &cancel)
            .await
            .unwrap();

        assert!(outcome
            .system_message
            .command_results
            .iter()
            .all(|r| r.status == CommandStatus::Cancelled));
        assert!(coordinator.calls().is_empty());
        assert!(outcome.prompt_results.is_empty());
    }

    #[tokio::test]
    async fn test_action_results_are_projected_and_verbalized() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let executor = executor(Arc::clone(&coordinator), history);

        let commands = vec![ExecutableCommand::action("tool_data", "create")
            .with_param("id", "T1")
            .with_param("data", json!({"value": 7.5}))];
        let outcome = executor
            .execute_commands(
                &commands,
                SystemMessageType::ActionsExecuted,
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let result = &outcome.system_message.command_results[0];
        assert!(result.is_action_command);
        assert_eq!(result.details.as_deref(), Some("Created data entry 'entry'"));
        let data = result.data.as_ref().unwrap();
        assert!(data.contains_key("id"));
        assert!(!data.contains_key("created_at"));
    }

    #[tokio::test]
    async fn test_query_prompt_fragment_carries_title_and_body() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let executor = executor(Arc::clone(&coordinator), history);

        let commands = vec![ExecutableCommand::query("tool_data", "get")
            .with_param("id", "T1")
            .with_param("start_time", 1000)
            .with_param("end_time", 2000)];
        let outcome = executor
            .execute_commands(
                &commands,
                SystemMessageType::DataAdded,
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.prompt_results.len(), 1);
        let fragment = &outcome.prompt_results[0];
        assert!(fragment.data_title.contains("'Sleep Tracker'"));
        assert!(fragment.formatted_data.contains("entries"));
        // The persisted record keeps the projection, not the bulk payload.
        let persisted = outcome.system_message.command_results[0]
            .data
            .as_ref()
            .unwrap();
        assert!(!persisted.contains_key("entries"));
        assert_eq!(persisted["count"], json!(1));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let coordinator = Arc::new(RecordingCoordinator::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let executor = executor(Arc::clone(&coordinator), history);

        let outcome = executor
            .execute_commands(
                &[],
                SystemMessageType::DataAdded,
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(outcome.system_message.command_results.is_empty());
        assert_eq!(outcome.system_message.summary, "No commands executed");
    }
}
