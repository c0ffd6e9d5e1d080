//! Statistics refresh - a three-phase service over tool data
//!
//! Recomputing a tool's statistics reads every entry, which is too heavy
//! for the interactive path. The work is split per the phase convention:
//! phase 1 snapshots the entries, phase 2 aggregates them, phase 3 persists
//! the result, notifies observers and releases the transient state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vesta_core::{Coordinator, OperationResult, Params, ResourceService};

use crate::phased::{operation_id_from_params, phase_from_params};
use crate::store::TransientStore;

/// Notification emitted when a tool's statistics were refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsEvent {
    /// Tool instance whose statistics changed
    pub tool_id: String,
    /// Number of aggregated entries
    pub count: u64,
}

/// Three-phase statistics refresh for one tool instance.
///
/// Operation: `tool_stats.refresh` with `id` (tool instance) and
/// `operation_id` (scheduler-supplied continuation key).
pub struct StatsRefreshService {
    coordinator: Arc<dyn Coordinator>,
    store: Arc<TransientStore>,
    events: broadcast::Sender<StatsEvent>,
}

impl StatsRefreshService {
    /// Create the service.
    #[must_use]
    pub fn new(coordinator: Arc<dyn Coordinator>, store: Arc<TransientStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            coordinator,
            store,
            events,
        }
    }

    /// Subscribe to refresh notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatsEvent> {
        self.events.subscribe()
    }

    async fn phase_one(
        &self,
        operation_id: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let Some(tool_id) = params.get("id").and_then(Value::as_str) else {
            return OperationResult::fail("missing required parameter 'id'");
        };

        let mut fetch = Params::new();
        fetch.insert("id".into(), json!(tool_id));
        let result = self
            .coordinator
            .process_command("tool_data.get", &fetch, cancel)
            .await;
        if !result.success {
            return OperationResult::fail(format!(
                "could not read tool data: {}",
                result.error.unwrap_or_else(|| "unknown error".to_string())
            ));
        }

        let entries = result
            .data
            .and_then(|mut d| d.remove("entries"))
            .unwrap_or_else(|| json!([]));
        let state = json!({"tool_id": tool_id, "entries": entries});
        if let Err(e) = self.store.put(operation_id, state).await {
            return OperationResult::fail(e.to_string());
        }

        debug!(operation_id = %operation_id, tool_id = %tool_id, "stats refresh staged");
        let mut data = Params::new();
        data.insert("operation_id".into(), json!(operation_id));
        OperationResult::background(data)
    }

    async fn phase_two(&self, operation_id: &str) -> OperationResult {
        let Some(mut state) = self.store.get(operation_id).await else {
            return OperationResult::fail(format!(
                "no transient state for operation '{operation_id}'"
            ));
        };

        let values: Vec<f64> = state["entries"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.get("value").and_then(Value::as_f64))
                    .collect()
            })
            .unwrap_or_default();

        let count = values.len() as u64;
        let stats = if values.is_empty() {
            json!({"count": 0})
        } else {
            let sum: f64 = values.iter().sum();
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            json!({
                "count": count,
                "min": min,
                "max": max,
                "mean": sum / count as f64,
            })
        };

        state["stats"] = stats;
        if let Err(e) = self.store.put(operation_id, state).await {
            return OperationResult::fail(e.to_string());
        }

        let mut data = Params::new();
        data.insert("operation_id".into(), json!(operation_id));
        OperationResult::continuation(data)
    }

    async fn phase_three(&self, operation_id: &str, cancel: &CancellationToken) -> OperationResult {
        let Some(state) = self.store.take(operation_id).await else {
            return OperationResult::fail(format!(
                "no transient state for operation '{operation_id}'"
            ));
        };

        let tool_id = state["tool_id"].as_str().unwrap_or_default().to_string();
        let stats = state["stats"].clone();
        let count = stats.get("count").and_then(Value::as_u64).unwrap_or(0);

        let mut update = Params::new();
        update.insert("id".into(), json!(tool_id));
        update.insert("stats".into(), stats.clone());
        let persisted = self
            .coordinator
            .process_command("tools.update", &update, cancel)
            .await;
        if !persisted.success {
            warn!(tool_id = %tool_id, "statistics could not be persisted");
        }

        let _ = self.events.send(StatsEvent {
            tool_id: tool_id.clone(),
            count,
        });
        info!(tool_id = %tool_id, count, "statistics refreshed");

        let mut data = Params::new();
        data.insert("id".into(), json!(tool_id));
        data.insert("stats".into(), stats);
        OperationResult::ok(data)
    }
}

#[async_trait]
impl ResourceService for StatsRefreshService {
    fn resource(&self) -> &str {
        "tool_stats"
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> OperationResult {
        if operation != "refresh" {
            return OperationResult::fail(format!("unknown operation '{operation}'"));
        }
        let Some(operation_id) = operation_id_from_params(params) else {
            return OperationResult::fail("missing required parameter 'operation_id'");
        };

        // Phase boundary: cancellation releases the transient state so no
        // orphaned entry survives the operation.
        if cancel.is_cancelled() {
            self.store.remove(operation_id).await;
            return OperationResult::cancel();
        }

        match phase_from_params(params) {
            1 => self.phase_one(operation_id, params, cancel).await,
            2 => self.phase_two(operation_id).await,
            3 => self.phase_three(operation_id, cancel).await,
            other => OperationResult::fail(format!("unknown phase {other}")),
        }
    }
}
