//! Schemas - namespaced schema ids and the provider resolution chain
//!
//! Schema ids follow the `<domain>_<kind>` convention (`zone_config`,
//! `tracker_data`, `timer_execution`). Resolution tries the fixed system
//! providers in registration order first, then falls back to a per-tool-type
//! discovery provider.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Kind suffix of a schema id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    /// Configuration shape of an entity
    Config,
    /// Shape of the entries an entity records
    Data,
    /// Shape of an entity's execution records
    Execution,
}

impl SchemaKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Data => "data",
            Self::Execution => "execution",
        }
    }

    /// Build the namespaced id for a domain (`tracker` -> `tracker_data`).
    #[must_use]
    pub fn id_for(&self, domain: &str) -> String {
        format!("{}_{}", domain, self.as_str())
    }
}

/// A resolved schema definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Namespaced schema id
    pub id: String,
    /// Human-readable schema name
    pub name: String,
    /// JSON schema content
    pub content: Value,
}

/// Source of schema definitions.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Whether this provider can serve the given id.
    fn provides(&self, schema_id: &str) -> bool;

    /// Fetch the schema definition.
    async fn get(&self, schema_id: &str) -> Option<Schema>;
}

/// Ordered provider chain: system providers first, discovery fallback last.
#[derive(Default)]
pub struct SchemaRegistry {
    system: Vec<Arc<dyn SchemaProvider>>,
    discovery: Option<Arc<dyn SchemaProvider>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fixed system provider.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn SchemaProvider>) -> Self {
        self.system.push(provider);
        self
    }

    /// Set the per-tool-type discovery fallback.
    #[must_use]
    pub fn with_discovery(mut self, provider: Arc<dyn SchemaProvider>) -> Self {
        self.discovery = Some(provider);
        self
    }

    /// Resolve a schema id through the chain.
    pub async fn resolve(&self, schema_id: &str) -> Option<Schema> {
        for provider in &self.system {
            if provider.provides(schema_id) {
                if let Some(schema) = provider.get(schema_id).await {
                    return Some(schema);
                }
            }
        }
        if let Some(discovery) = &self.discovery {
            debug!(schema_id = %schema_id, "falling back to discovery provider");
            return discovery.get(schema_id).await;
        }
        None
    }
}
