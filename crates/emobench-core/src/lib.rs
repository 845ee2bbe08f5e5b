//! Core domain model for the emobench harness.
//!
//! This crate defines the disorder taxonomy, the scoring instruments, the
//! conversation and session-record types, the backend seams (completion,
//! character, usage accounting), and the shared error type. It carries no
//! I/O of its own; concrete clients and storage live in the interaction and
//! infrastructure crates.

pub mod backend;
pub mod chat;
pub mod disorder;
pub mod error;
pub mod instrument;
pub mod record;
pub mod retry;

pub use backend::{
    CharacterBackend, CharacterSession, CompletionBackend, NullUsageObserver, UsageObserver,
};
pub use chat::{ChatTurn, Role};
pub use disorder::Disorder;
pub use error::{EmobenchError, Result};
pub use instrument::{
    CategorizedBank, Instrument, ItemBank, ScaleItem, SubScores, SymptomCategory, TestResult,
};
pub use record::SessionRecord;
pub use retry::retry_transient;
