//! # Ecotools - building-energy model translation engine
//!
//! Translates building-energy-model documents between the CIBD22X (nested)
//! and CIBD22 (flat) XML dialects and the canonical EMJSON v6 document,
//! keeping object ids stable across runs and reporting every data-quality
//! issue as a structured diagnostic.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Document   │────▶│  Detector   │────▶│   Adapter   │────▶│  Validator  │────▶│   Adapter   │
//! │ (XML/JSON)  │     │(fingerprint)│     │   (parse)   │     │ (src model) │     │ (serialize) │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘     └──────┬──────┘
//!                                                │ IdRegistry + units                    │ re-parse
//!                                                ▼                                       ▼
//!                                         CanonicalModel                          Validator (target)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ecotools::{Dialect, EngineConfig, Translator};
//! use std::sync::Arc;
//!
//! let translator = Translator::new(Arc::new(EngineConfig::default()))?;
//! let mut ctx = translator.context();
//! let result = translator.translate_file("house.xml", Some(Dialect::EmJson), &mut ctx)?;
//! println!("{}", result.output.unwrap_or_default());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Engine settings and environment overrides
//! - [`models`] - Canonical model and diagnostics
//! - [`units`] - IP/SI conversion and unit heuristics
//! - [`registry`] - Reproducible id generation
//! - [`parser`] - Byte decoding and document loading
//! - [`detect`] - Format detection
//! - [`formats`] - Dialect adapters
//! - [`enrich`] - Post-parse enrichment
//! - [`validation`] - Model and schema validation
//! - [`translate`] - Orchestration and batch translation
//! - [`logging`] - Subscriber setup for the binary

// Core modules
pub mod config;
pub mod error;
pub mod models;
pub mod units;

// Identity
pub mod registry;

// Reading
pub mod detect;
pub mod parser;

// Dialects
pub mod formats;

// Model passes
pub mod enrich;
pub mod validation;

// Orchestration
pub mod translate;

// Binary support
pub mod logging;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, ConfigResult, DocumentError, DocumentResult, RegistryError, RegistryResult,
    TranslateError, TranslateResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Adjacency, BuildingType, CanonicalModel, Diagnostic, DiagnosticLevel, EntityKind, Opening,
    OpeningType, Surface, SurfaceType, Zone, ZoneGroup,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::EngineConfig;

// =============================================================================
// Re-exports - Units
// =============================================================================

pub use units::{ft_to_m, gal_to_l, to_si, u_to_si, Quantity, UnitPolicy, UnitSystem};

// =============================================================================
// Re-exports - Registry
// =============================================================================

pub use registry::{slugify, IdRegistry, RegistryExport, ReverseEntry};

// =============================================================================
// Re-exports - Detection
// =============================================================================

pub use detect::{DetectedBuildingType, Detector, DetectorConfig, FormatInfo};

// =============================================================================
// Re-exports - Formats
// =============================================================================

pub use formats::{
    adapter_for, AdapterRegistry, Dialect, DialectConfig, EmJsonAdapter, FormatAdapter, Parsed,
    Serialized, XmlAdapter,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    is_valid, is_valid_emjson_document, validate, validate_emjson_document, validate_model,
    ValidationReport, Validator,
};

// =============================================================================
// Re-exports - Translation
// =============================================================================

pub use translate::{
    translate_batch, BatchItem, BatchOptions, BatchOutcome, Stage, TranslationContext,
    TranslationFailure, TranslationResult, Translator,
};
