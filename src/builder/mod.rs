//! Transaction build pipeline
//!
//! The supercomponent composing coin selection, priority fee
//! computation, and assembly into one orchestrated flow:
//!
//! - [`selection`] — chooses which spendable outputs fund a request
//! - [`fee`] — prices the spend from selection shape and telemetry
//! - [`assemble`] — the external construction primitive's boundary
//! - [`orchestrator`] — drives the flow and the fallback state machine
//! - [`errors`] — the taxonomy surfaced to callers

pub mod assemble;
pub mod errors;
pub mod fee;
pub mod orchestrator;
pub mod selection;

pub use assemble::{TransactionAssembler, WireAssembler};
pub use errors::BuildError;
pub use orchestrator::{BuildOrchestrator, BuildRequest, BuildResult, PolicyTrace};
pub use selection::{SelectionMode, SelectionPlan, Selector};
