//! Vesta Context - the context-assembly pipeline
//!
//! Translates enrichments (structured user/AI intents attached to a
//! conversation turn) into concrete fetch commands, executes them through
//! the coordinator with per-command failure isolation and schema-fetch
//! deduplication, and reshapes the raw results into:
//! - prompt fragments for the model, and
//! - a durable system message appended to session history.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod enrichment;
pub mod executor;
pub mod format;
pub mod resolver;
pub mod temporal;

pub use enrichment::{
    CreateEnrichment, DocumentEnrichment, Enrichment, Importance, ModifyConfigEnrichment,
    OrganizeEnrichment, PointerEnrichment, ResourceContext, SelectionLevel, UseEnrichment,
};
pub use executor::{CommandExecutor, ExecutionOutcome};
pub use resolver::ResolutionEngine;
pub use temporal::{
    CalendarPeriodMath, PeriodMath, PeriodRef, PeriodUnit, RelativeMarker, TemporalError,
    TemporalMode, TimeBound, TimeWindow, TimestampSelection,
};
