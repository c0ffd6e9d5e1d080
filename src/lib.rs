//! Vesta - context assembly for a personal assistant
//!
//! The conversational model reads and mutates structured user data (zones,
//! tool instances, time-series entries) through a uniform command
//! interface. This crate wires the pipeline together:
//! - Services: in-memory entity services behind the coordinator
//! - Pipeline: per-turn resolution, capping, execution and prompt assembly
//! - Config: tunable pipeline limits

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod pipeline;
pub mod services;

pub use config::PipelineConfig;
pub use pipeline::{TurnOutcome, TurnPipeline};
pub use services::{
    ExecutionService, SchemasService, SystemSchemaProvider, ToolDataService, ToolService,
    ToolTypeDiscoveryProvider, ZoneService,
};
