//! Configuration loading and on-disk persistence for emobench.
//!
//! Input configuration (disorder schemas, character registry, patient
//! records, seed transcripts) is read-only and must exist up front; output
//! directories are created on demand by the record store.

pub mod config_service;
pub mod record_store;
pub mod settings;

pub use config_service::{CharacterEntry, CognitiveModel, ConfigService, PatientRecord, SeedTopics};
pub use record_store::SessionRecordStore;
pub use settings::{CharacterBackendSettings, CompletionSettings, Settings};
