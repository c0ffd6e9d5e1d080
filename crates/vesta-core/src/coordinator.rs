//! Coordinator - routes `resource.operation` commands to entity services
//!
//! The coordinator is the single seam between the context-assembly pipeline
//! and the services that own the data. Services are black boxes exposing one
//! uniform `execute` entry point; the coordinator looks the owning service up
//! by resource name and forwards the call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command::Params;
use crate::result::OperationResult;

/// Dispatch seam used by the resolution engine and the command executor.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Route a `resource.operation` command to its owning service.
    async fn process_command(
        &self,
        command_id: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> OperationResult;
}

/// One entity service owning a single resource.
#[async_trait]
pub trait ResourceService: Send + Sync {
    /// Resource name this service owns (e.g. `tool_data`).
    fn resource(&self) -> &str;

    /// Execute one operation against the resource.
    async fn execute(
        &self,
        operation: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> OperationResult;
}

/// In-process coordinator keyed by resource name.
#[derive(Default)]
pub struct ServiceCoordinator {
    services: RwLock<HashMap<String, Arc<dyn ResourceService>>>,
}

impl ServiceCoordinator {
    /// Create an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any previous owner of the resource.
    pub async fn register(&self, service: Arc<dyn ResourceService>) {
        let resource = service.resource().to_string();
        debug!(resource = %resource, "registering service");
        self.services.write().await.insert(resource, service);
    }

    /// Names of all registered resources.
    pub async fn resources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Coordinator for ServiceCoordinator {
    async fn process_command(
        &self,
        command_id: &str,
        params: &Params,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let Some((resource, operation)) = command_id.split_once('.') else {
            return OperationResult::fail(format!(
                "invalid command identifier '{command_id}': expected resource.operation"
            ));
        };

        let service = self.services.read().await.get(resource).cloned();
        let Some(service) = service else {
            return OperationResult::fail(format!("no service registered for '{resource}'"));
        };

        debug!(command = %command_id, "dispatching command");
        service.execute(operation, params, cancel).await
    }
}
