//! Error types for the translation engine.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DocumentError`] - unreadable or malformed source documents
//! - [`RegistryError`] - id registry persistence errors
//! - [`ConfigError`] - engine and dialect configuration errors
//! - [`TranslateError`] - top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! A failed validation is not an error: it is a
//! [`ValidationReport`](crate::validation::ValidationReport) with
//! `is_valid == false`.

use thiserror::Error;

use crate::formats::Dialect;

// =============================================================================
// Document Errors
// =============================================================================

/// Errors raised before any canonical model exists.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Input is neither well-formed XML nor JSON.
    #[error("Unreadable document: {0}")]
    Unreadable(String),

    /// Markup parsed but does not fit the dialect it was handed to.
    #[error("Malformed {format} document: {message}")]
    Malformed { format: String, message: String },

    /// Failed to read file.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

impl DocumentError {
    pub fn malformed(format: impl ToString, message: impl Into<String>) -> Self {
        Self::Malformed {
            format: format.to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the id registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// IO error.
    #[error("Registry IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Registry JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Export is internally inconsistent.
    #[error("Invalid registry export: {0}")]
    InvalidExport(String),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors loading engine or dialect configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error.
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value could not be interpreted.
    #[error("Invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },
}

// =============================================================================
// Translation Errors (top-level)
// =============================================================================

/// Top-level translation errors.
///
/// This is the error carried by
/// [`TranslationFailure`](crate::translate::TranslationFailure).
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Unreadable or malformed document.
    #[error("{0}")]
    Document(#[from] DocumentError),

    /// Detector confidence below threshold.
    #[error("Unknown format (best guess {best_guess}, confidence {confidence:.2} < {threshold:.2})")]
    UnknownFormat {
        best_guess: Dialect,
        confidence: f64,
        threshold: f64,
    },

    /// No adapter registered for the requested dialect.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Serializer could not produce output.
    #[error("Serialization failed: {0}")]
    Serialize(String),

    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A batch worker stopped before producing a result.
    #[error("Translation task failed: {0}")]
    Task(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for document loading and parsing.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for translation operations.
pub type TranslateResult<T> = Result<T, TranslateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // DocumentError -> TranslateError
        let doc_err = DocumentError::Unreadable("empty input".into());
        let err: TranslateError = doc_err.into();
        assert!(err.to_string().contains("empty input"));

        // RegistryError -> TranslateError
        let reg_err = RegistryError::InvalidExport("id Z-1 has no reverse entry".into());
        let err: TranslateError = reg_err.into();
        assert!(err.to_string().contains("Z-1"));
    }

    #[test]
    fn test_malformed_format() {
        let err = DocumentError::malformed(Dialect::EmJson, "root must be an object");
        let msg = err.to_string();
        assert!(msg.contains("EMJSON"));
        assert!(msg.contains("root must be an object"));
    }

    #[test]
    fn test_unknown_format_message() {
        let err = TranslateError::UnknownFormat {
            best_guess: Dialect::Cibd22x,
            confidence: 0.1,
            threshold: 0.25,
        };
        let msg = err.to_string();
        assert!(msg.contains("CIBD22X"));
        assert!(msg.contains("0.10"));
    }
}
