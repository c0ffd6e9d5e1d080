//! Commands - the unit of work routed through the coordinator
//!
//! A command addresses one operation on one resource (`"tool_data.get"`)
//! with a flat parameter map. Commands carry a deterministic fingerprint
//! so that redundant fetches can be recognized within a batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat parameter map attached to a command or returned by a service.
pub type Params = serde_json::Map<String, Value>;

/// Operations that mutate state; everything else is a query.
const ACTION_OPERATIONS: &[&str] = &[
    "create",
    "update",
    "delete",
    "batch_create",
    "batch_update",
    "batch_delete",
];

/// Returns true when the operation mutates state.
#[must_use]
pub fn is_action_operation(operation: &str) -> bool {
    ACTION_OPERATIONS.contains(&operation)
}

/// One executable unit of work addressed as `resource.operation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableCommand {
    /// Resource the command targets (e.g. `tools`, `tool_data`, `schemas`)
    pub resource: String,
    /// Operation on the resource (e.g. `get`, `create`, `batch_delete`)
    pub operation: String,
    /// Flat parameter map
    #[serde(default)]
    pub params: Params,
    /// True for mutating operations; governs formatting and verbalization
    pub is_action_command: bool,
}

impl ExecutableCommand {
    /// Create a command, inferring the action flag from the operation name.
    #[must_use]
    pub fn new(resource: impl Into<String>, operation: impl Into<String>) -> Self {
        let operation = operation.into();
        let is_action_command = is_action_operation(&operation);
        Self {
            resource: resource.into(),
            operation,
            params: Params::new(),
            is_action_command,
        }
    }

    /// Create a read-only command.
    #[must_use]
    pub fn query(resource: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            is_action_command: false,
            ..Self::new(resource, operation)
        }
    }

    /// Create a mutating command.
    #[must_use]
    pub fn action(resource: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            is_action_command: true,
            ..Self::new(resource, operation)
        }
    }

    /// Attach a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The `resource.operation` identifier used for dispatch.
    #[must_use]
    pub fn command_id(&self) -> String {
        format!("{}.{}", self.resource, self.operation)
    }

    /// Deterministic fingerprint: the command id plus every parameter as
    /// `key_value`, sorted by key. Equal fingerprints mean equal work.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut pairs: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}_{}", k, s),
                other => format!("{}_{}", k, other),
            })
            .collect();
        pairs.sort();
        if pairs.is_empty() {
            self.command_id()
        } else {
            format!("{}:{}", self.command_id(), pairs.join(","))
        }
    }

    /// Fetch a string parameter.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Fetch an integer parameter.
    #[must_use]
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(Value::as_i64)
    }

    /// True when this command fetches a schema definition.
    #[must_use]
    pub fn is_schema_fetch(&self) -> bool {
        self.resource == "schemas" && self.operation == "get"
    }

    /// The schema id targeted by a schema fetch, if any.
    #[must_use]
    pub fn schema_id(&self) -> Option<&str> {
        if self.is_schema_fetch() {
            self.param_str("schema_id")
        } else {
            None
        }
    }
}
