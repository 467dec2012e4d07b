//! Translation orchestration.
//!
//! - [`context`] - registry and config threaded through one translation
//! - [`orchestrator`] - the detect → parse → validate → serialize state machine
//! - [`batch`] - concurrent translation of many documents

pub mod batch;
pub mod context;
pub mod orchestrator;

pub use batch::{translate_batch, worst_exit_code, BatchItem, BatchOptions, BatchOutcome};
pub use context::{lock, RegistryHandle, TranslationContext};
pub use orchestrator::{Stage, TranslationFailure, TranslationResult, Translator};
