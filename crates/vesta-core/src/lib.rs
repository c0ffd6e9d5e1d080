//! Vesta Core - shared pipeline types
//!
//! This crate provides the types shared across the Vesta context-assembly
//! pipeline, including:
//! - Commands: the `resource.operation` unit of work routed to entity services
//! - Results: per-command outcomes, service operation results, prompt fragments
//! - Messages: the durable per-session audit record of one command batch
//! - Coordinator: the dispatch seam between the pipeline and entity services
//! - History: persistence of system messages (in-memory and SQLite)
//! - Schemas: namespaced schema id conventions and the provider chain

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod message;
pub mod result;
pub mod schema;

pub use command::{ExecutableCommand, Params};
pub use coordinator::{Coordinator, ResourceService, ServiceCoordinator};
pub use error::{Error, Result};
pub use history::{HistoryStore, MemoryHistoryStore, SqliteHistoryStore};
pub use message::{SystemMessage, SystemMessageType};
pub use result::{CommandResult, CommandStatus, OperationResult, PromptCommandResult};
pub use schema::{Schema, SchemaKind, SchemaProvider, SchemaRegistry};
