//! Vesta Tasks - multi-phase cooperative execution
//!
//! Services whose operations cannot finish within one synchronous call
//! split the work into phases selected by `params.phase` (default 1):
//! - Phase 1: cheap setup/read; stores intermediate state under an
//!   externally supplied `operation_id` and returns `requires_background`.
//! - Phase 2: the heavy portion; reads its state back and returns
//!   `requires_continuation`.
//! - Phase 3: finalization - persist, notify, delete the transient state.
//!
//! The caller (an external scheduler) re-invokes phase N+1; a service never
//! self-schedules. The cancellation token is checked at every phase
//! boundary, and cancellation always releases the transient state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod phased;
pub mod stats;
pub mod store;

pub use phased::{operation_id_from_params, phase_from_params};
pub use stats::{StatsEvent, StatsRefreshService};
pub use store::{StoreError, TransientStore};
