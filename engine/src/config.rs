//! Engine configuration.
//!
//! Defaults are code-defined; a JSON file and `ECOTOOLS_*` environment
//! variables (optionally from a `.env` file) override them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};
use crate::formats::Dialect;
use crate::units::{UnitPolicy, UnitSystem, DEFAULT_PERCENT_THRESHOLD, DEFAULT_U_THRESHOLD};

fn default_min_confidence() -> f64 {
    0.25
}

fn default_u_threshold() -> f64 {
    DEFAULT_U_THRESHOLD
}

fn default_percent_threshold() -> f64 {
    DEFAULT_PERCENT_THRESHOLD
}

fn default_current_version() -> String {
    "2022".to_string()
}

fn default_fallback_dialect() -> Dialect {
    Dialect::Cibd22x
}

fn default_roundtrip_check() -> bool {
    true
}

/// Settings shared by every stage of a translation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Detector confidence below which a document is `UnknownFormat`.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Unitless U-factors at or below this are taken as SI already.
    #[serde(default = "default_u_threshold")]
    pub u_factor_si_threshold: f64,

    /// Unitless fractions above this are taken as percentages.
    #[serde(default = "default_percent_threshold")]
    pub fraction_percent_threshold: f64,

    /// Version reported when no ruleset names a year.
    #[serde(default = "default_current_version")]
    pub current_version: String,

    /// Dialect chosen when detector scores tie.
    #[serde(default = "default_fallback_dialect")]
    pub fallback_dialect: Dialect,

    /// Re-parse serialized output to check round-trip counts.
    #[serde(default = "default_roundtrip_check")]
    pub roundtrip_check: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            u_factor_si_threshold: default_u_threshold(),
            fraction_percent_threshold: default_percent_threshold(),
            current_version: default_current_version(),
            fallback_dialect: default_fallback_dialect(),
            roundtrip_check: default_roundtrip_check(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the environment, reading `.env` when present.
    pub fn from_env() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// JSON file; absent fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ECOTOOLS_MIN_CONFIDENCE") {
            self.min_confidence = parse_value("ECOTOOLS_MIN_CONFIDENCE", &v)?;
        }
        if let Some(v) = lookup("ECOTOOLS_U_THRESHOLD") {
            self.u_factor_si_threshold = parse_value("ECOTOOLS_U_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ECOTOOLS_PERCENT_THRESHOLD") {
            self.fraction_percent_threshold = parse_value("ECOTOOLS_PERCENT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("ECOTOOLS_CURRENT_VERSION") {
            self.current_version = v.trim().to_string();
        }
        if let Some(v) = lookup("ECOTOOLS_FALLBACK_DIALECT") {
            self.fallback_dialect = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "ECOTOOLS_FALLBACK_DIALECT".into(),
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("ECOTOOLS_ROUNDTRIP_CHECK") {
            self.roundtrip_check = parse_bool("ECOTOOLS_ROUNDTRIP_CHECK", &v)?;
        }
        self.check()
    }

    fn check(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::InvalidValue {
                key: "min_confidence".into(),
                value: self.min_confidence.to_string(),
            });
        }
        if self.u_factor_si_threshold <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "u_factor_si_threshold".into(),
                value: self.u_factor_si_threshold.to_string(),
            });
        }
        if self.fraction_percent_threshold <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "fraction_percent_threshold".into(),
                value: self.fraction_percent_threshold.to_string(),
            });
        }
        Ok(())
    }

    /// Unit policy for a dialect writing `default_system` when unitless.
    pub fn unit_policy(&self, default_system: UnitSystem) -> UnitPolicy {
        UnitPolicy {
            u_factor_si_threshold: self.u_factor_si_threshold,
            fraction_percent_threshold: self.fraction_percent_threshold,
            default_system,
        }
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_bool(key: &str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}
