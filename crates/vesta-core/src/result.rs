//! Results - per-command outcomes and the uniform service return value

use serde::{Deserialize, Serialize};

use crate::command::Params;

/// Outcome status of a single executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    /// Command dispatched and completed successfully
    Success,
    /// Command failed validation or was rejected by its service
    Failed,
    /// Schema fetch skipped because the schema was already in context
    Cached,
    /// Command skipped because the batch was cancelled
    Cancelled,
}

impl CommandStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Cached => "CACHED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Cached results count as successful: the data is already in context.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Cached)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Durable record of one command's execution, kept inside a
/// [`SystemMessage`](crate::message::SystemMessage).
///
/// Successful `schemas.get` results must retain `schema_id` in `data` even
/// after projection: that id is the only field read back on later turns to
/// rebuild the deduplication cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// The `resource.operation` identifier that was executed
    pub command: String,
    /// Outcome status
    pub status: CommandStatus,
    /// Human-readable verbalization of what happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Projected result data (bulk content stripped before persistence)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Params>,
    /// Error description when the command failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the command was a mutating action
    pub is_action_command: bool,
}

impl CommandResult {
    /// Successful execution.
    #[must_use]
    pub fn success(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: CommandStatus::Success,
            details: None,
            data: None,
            error: None,
            is_action_command: false,
        }
    }

    /// Failed execution.
    #[must_use]
    pub fn failed(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: CommandStatus::Failed,
            details: None,
            data: None,
            error: Some(error.into()),
            is_action_command: false,
        }
    }

    /// Schema fetch skipped by deduplication.
    #[must_use]
    pub fn cached(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: CommandStatus::Cached,
            details: None,
            data: None,
            error: None,
            is_action_command: false,
        }
    }

    /// Command skipped because the batch was cancelled.
    #[must_use]
    pub fn cancelled(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: CommandStatus::Cancelled,
            details: None,
            data: None,
            error: None,
            is_action_command: false,
        }
    }

    /// Attach projected data.
    #[must_use]
    pub fn with_data(mut self, data: Params) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a verbalization.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Mark the result as belonging to a mutating action.
    #[must_use]
    pub fn as_action(mut self, is_action: bool) -> Self {
        self.is_action_command = is_action;
        self
    }

    /// The `schema_id` retained by a successful schema fetch, if any.
    #[must_use]
    pub fn schema_id(&self) -> Option<&str> {
        if self.command != "schemas.get" || self.status != CommandStatus::Success {
            return None;
        }
        self.data
            .as_ref()
            .and_then(|d| d.get("schema_id"))
            .and_then(serde_json::Value::as_str)
    }
}

/// Prompt fragment built from one command result.
///
/// Ephemeral: assembled per turn for the model prompt and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptCommandResult {
    /// One-line title framing the data below
    pub data_title: String,
    /// Prompt-ready rendering of the full result data
    pub formatted_data: String,
}

/// Uniform return value of every entity service operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation succeeded
    pub success: bool,
    /// Result data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Params>,
    /// Error description on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The operation was cancelled before completion
    #[serde(default)]
    pub cancelled: bool,
    /// The next phase is heavy and should run off the interactive path
    #[serde(default)]
    pub requires_background: bool,
    /// One more cheap phase is needed to finish
    #[serde(default)]
    pub requires_continuation: bool,
}

impl OperationResult {
    /// Success with data.
    #[must_use]
    pub fn ok(data: Params) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    /// Success without data.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// Failure with an error description.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Cancelled before completion.
    #[must_use]
    pub fn cancel() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    /// Phase finished; the next phase is heavy and must be rescheduled.
    #[must_use]
    pub fn background(data: Params) -> Self {
        Self {
            success: true,
            data: Some(data),
            requires_background: true,
            ..Self::default()
        }
    }

    /// Phase finished; one more cheap phase remains.
    #[must_use]
    pub fn continuation(data: Params) -> Self {
        Self {
            success: true,
            data: Some(data),
            requires_continuation: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_success_classes() {
        assert!(CommandStatus::Success.is_success());
        assert!(CommandStatus::Cached.is_success());
        assert!(!CommandStatus::Failed.is_success());
        assert!(!CommandStatus::Cancelled.is_success());
    }

    #[test]
    fn test_status_wire_format() {
        let s = serde_json::to_string(&CommandStatus::Cached).unwrap();
        assert_eq!(s, "\"CACHED\"");
    }

    #[test]
    fn test_schema_id_only_on_successful_schema_fetch() {
        let mut data = Params::new();
        data.insert("schema_id".into(), json!("tracker_data"));

        let hit = CommandResult::success("schemas.get").with_data(data.clone());
        assert_eq!(hit.schema_id(), Some("tracker_data"));

        let failed = CommandResult::failed("schemas.get", "boom");
        assert_eq!(failed.schema_id(), None);

        let other = CommandResult::success("tools.get").with_data(data);
        assert_eq!(other.schema_id(), None);
    }

    #[test]
    fn test_operation_result_builders() {
        assert!(OperationResult::ok_empty().success);
        assert!(OperationResult::cancel().cancelled);
        assert!(OperationResult::background(Params::new()).requires_background);
        assert!(OperationResult::continuation(Params::new()).requires_continuation);
        let failed = OperationResult::fail("nope");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("nope"));
    }
}
