//! Turn pipeline - glue from enrichments to prompt block and history
//!
//! One turn: parse the wire-format enrichments, resolve them into commands
//! in priority order, cap the batch, execute it, and assemble the prompt
//! text block from the resulting fragments. Every outcome (including parse
//! and resolution failures) lands in session history as a system message.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use vesta_context::{CalendarPeriodMath, CommandExecutor, Enrichment, ResolutionEngine};
use vesta_core::{
    CommandResult, Coordinator, ExecutableCommand, HistoryStore, Result, SystemMessage,
    SystemMessageType,
};

use crate::config::PipelineConfig;

/// Everything one turn produced.
#[derive(Debug)]
pub struct TurnOutcome {
    /// Prompt-ready text block assembled from all fetched data
    pub prompt_block: String,
    /// One-line summaries of what each enrichment contributed
    pub enrichment_summaries: Vec<String>,
    /// System messages appended to history this turn, in order
    pub messages: Vec<SystemMessage>,
}

/// Per-turn orchestration over the resolution engine and the executor.
pub struct TurnPipeline {
    resolver: ResolutionEngine,
    executor: CommandExecutor,
    history: Arc<dyn HistoryStore>,
    config: PipelineConfig,
}

impl TurnPipeline {
    /// Wire a pipeline over the given coordinator and history store.
    #[must_use]
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        history: Arc<dyn HistoryStore>,
        config: PipelineConfig,
    ) -> Self {
        let resolver =
            ResolutionEngine::new(Arc::clone(&coordinator), Arc::new(CalendarPeriodMath));
        let executor = CommandExecutor::new(coordinator, Arc::clone(&history));
        Self {
            resolver,
            executor,
            history,
            config,
        }
    }

    /// Run one turn over wire-format enrichments.
    #[instrument(skip_all, fields(enrichments = raw_enrichments.len()))]
    pub async fn run_turn(
        &self,
        raw_enrichments: &[Value],
        session_id: Option<Uuid>,
        is_relative: bool,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let mut messages = Vec::new();

        // Parse; malformed enrichments fail the turn's formatting, not the turn.
        let mut enrichments: Vec<Enrichment> = Vec::new();
        let mut parse_failures: Vec<CommandResult> = Vec::new();
        for raw in raw_enrichments {
            match serde_json::from_value::<Enrichment>(raw.clone()) {
                Ok(enrichment) => enrichments.push(enrichment),
                Err(e) => {
                    warn!(error = %e, "enrichment failed to parse");
                    parse_failures.push(
                        CommandResult::failed("enrichments.parse", e.to_string())
                            .with_details(format!("Could not read enrichment: {e}")),
                    );
                }
            }
        }
        enrichments.sort_by_key(Enrichment::priority);

        if !parse_failures.is_empty() {
            let summary = format!("Could not parse {} enrichment(s)", parse_failures.len());
            let message = SystemMessage::new(SystemMessageType::FormatError, parse_failures, summary);
            self.persist(session_id, &message).await?;
            messages.push(message);
        }

        // Resolve; a schema-resolution failure stops that enrichment only.
        let mut commands: Vec<ExecutableCommand> = Vec::new();
        let mut resolution_failures: Vec<CommandResult> = Vec::new();
        let mut enrichment_summaries = Vec::new();
        for enrichment in &enrichments {
            enrichment_summaries.push(self.resolver.generate_summary(enrichment));
            match self
                .resolver
                .generate_commands(enrichment, is_relative, cancel)
                .await
            {
                Ok(generated) => commands.extend(generated),
                Err(e) => {
                    warn!(label = enrichment.label(), error = %e, "enrichment failed to resolve");
                    resolution_failures.push(
                        CommandResult::failed("enrichments.resolve", e.to_string()).with_details(
                            format!("Could not resolve '{}': {e}", enrichment.label()),
                        ),
                    );
                }
            }
        }

        if !resolution_failures.is_empty() {
            let summary = format!(
                "Could not resolve {} enrichment(s)",
                resolution_failures.len()
            );
            let message =
                SystemMessage::new(SystemMessageType::FormatError, resolution_failures, summary);
            self.persist(session_id, &message).await?;
            messages.push(message);
        }

        // Cap the batch; overflow is reported, never silently dropped.
        if commands.len() > self.config.max_commands_per_turn {
            let overflow = commands.split_off(self.config.max_commands_per_turn);
            let results: Vec<CommandResult> = overflow
                .iter()
                .map(|c| {
                    CommandResult::failed(c.command_id(), "per-turn command limit reached")
                        .as_action(c.is_action_command)
                })
                .collect();
            let summary = format!(
                "Command limit of {} reached; {} command(s) dropped",
                self.config.max_commands_per_turn,
                results.len()
            );
            let message = SystemMessage::new(SystemMessageType::LimitReached, results, summary);
            self.persist(session_id, &message).await?;
            messages.push(message);
        }

        debug!(commands = commands.len(), "executing turn batch");
        let outcome = self
            .executor
            .execute_commands(&commands, SystemMessageType::DataAdded, session_id, cancel)
            .await?;

        let prompt_block = outcome
            .prompt_results
            .iter()
            .map(|fragment| format!("## {}\n{}", fragment.data_title, fragment.formatted_data))
            .collect::<Vec<_>>()
            .join("\n\n");
        messages.push(outcome.system_message);

        Ok(TurnOutcome {
            prompt_block,
            enrichment_summaries,
            messages,
        })
    }

    /// Execute model-issued action commands.
    pub async fn execute_actions(
        &self,
        commands: &[ExecutableCommand],
        session_id: Option<Uuid>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let outcome = self
            .executor
            .execute_commands(
                commands,
                SystemMessageType::ActionsExecuted,
                session_id,
                cancel,
            )
            .await?;
        let prompt_block = outcome
            .prompt_results
            .iter()
            .map(|fragment| fragment.data_title.clone())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(TurnOutcome {
            prompt_block,
            enrichment_summaries: Vec::new(),
            messages: vec![outcome.system_message],
        })
    }

    async fn persist(&self, session_id: Option<Uuid>, message: &SystemMessage) -> Result<()> {
        if let Some(sid) = session_id {
            self.history.append(sid, message).await?;
        }
        Ok(())
    }
}
