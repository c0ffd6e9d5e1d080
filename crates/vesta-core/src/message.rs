//! System messages - the durable audit record of one command batch
//!
//! A system message is appended to session history once per batch and never
//! mutated. Later turns scan the session's messages to rebuild the schema
//! deduplication cache, so the schema ids inside successful `schemas.get`
//! results are load-bearing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::result::CommandResult;

/// Classification of a persisted system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemMessageType {
    /// Supporting data was fetched for the model
    DataAdded,
    /// Mutating actions were executed on behalf of the model
    ActionsExecuted,
    /// The per-turn command cap was exceeded; overflow commands were dropped
    LimitReached,
    /// An enrichment or action could not be parsed or resolved
    FormatError,
}

impl SystemMessageType {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataAdded => "DATA_ADDED",
            Self::ActionsExecuted => "ACTIONS_EXECUTED",
            Self::LimitReached => "LIMIT_REACHED",
            Self::FormatError => "FORMAT_ERROR",
        }
    }
}

impl std::fmt::Display for SystemMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SystemMessageType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DATA_ADDED" => Ok(Self::DataAdded),
            "ACTIONS_EXECUTED" => Ok(Self::ActionsExecuted),
            "LIMIT_REACHED" => Ok(Self::LimitReached),
            "FORMAT_ERROR" => Ok(Self::FormatError),
            other => Err(format!("unknown system message type: {other}")),
        }
    }
}

/// Durable record of one executed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMessage {
    /// Unique message id
    pub id: Uuid,
    /// Message classification
    pub message_type: SystemMessageType,
    /// One result per command, in execution order
    pub command_results: Vec<CommandResult>,
    /// Aggregated outcome summary
    pub summary: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl SystemMessage {
    /// Create a new system message.
    #[must_use]
    pub fn new(
        message_type: SystemMessageType,
        command_results: Vec<CommandResult>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type,
            command_results,
            summary: summary.into(),
            created_at: Utc::now(),
        }
    }

    /// Schema ids fetched successfully in this message.
    ///
    /// Only `DATA_ADDED` messages feed the cross-turn cache; other message
    /// types never carry schema fetches.
    pub fn successful_schema_ids(&self) -> impl Iterator<Item = &str> {
        self.command_results
            .iter()
            .filter_map(CommandResult::schema_id)
    }
}
