//! Benchmark orchestration.
//!
//! Drives the patient agent and the character backend through the
//! conversation-and-scoring control loop, and accounts token usage across
//! every model call.

pub mod orchestrator;
pub mod usage;

pub use orchestrator::{BenchmarkSettings, Orchestrator, PatientOutcome};
pub use usage::UsageLedger;
