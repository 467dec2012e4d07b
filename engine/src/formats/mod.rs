//! Dialects and the adapter contract.
//!
//! Every dialect is read into a [`CanonicalModel`] and written back out by a
//! [`FormatAdapter`]. The XML dialects share one table-driven adapter
//! ([`xml::XmlAdapter`]); the canonical JSON document has its own
//! ([`emjson::EmJsonAdapter`]).

pub mod dialect;
pub mod emjson;
pub mod extract;
pub mod xml;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::enrich::HeatPumpRecord;
use crate::error::{DocumentError, DocumentResult, TranslateError, TranslateResult};
use crate::models::{CanonicalModel, Diagnostic, EntityKind};
use crate::parser::{load_document, SourceDocument};
use crate::translate::TranslationContext;

pub use dialect::{Alias, DialectConfig, EntitySpec, FieldSpec, Layout, TagRule};
pub use emjson::EmJsonAdapter;
pub use xml::XmlAdapter;

/// A document format the engine can read and write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dialect {
    #[serde(rename = "CIBD22X")]
    Cibd22x,
    #[serde(rename = "CIBD22")]
    Cibd22,
    #[serde(rename = "EMJSON")]
    EmJson,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Self::Cibd22x, Self::Cibd22, Self::EmJson];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cibd22x => "CIBD22X",
            Self::Cibd22 => "CIBD22",
            Self::EmJson => "EMJSON",
        }
    }

    pub fn is_xml(&self) -> bool {
        !matches!(self, Self::EmJson)
    }

    /// Conventional file extension for output.
    pub fn extension(&self) -> &'static str {
        if self.is_xml() {
            "xml"
        } else {
            "json"
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CIBD22X" => Ok(Self::Cibd22x),
            "CIBD22" => Ok(Self::Cibd22),
            "EMJSON" | "JSON" => Ok(Self::EmJson),
            _ => Err(TranslateError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Output of a parse: the fresh model, what was noticed while building it,
/// and sub-objects left for the enrichment pass.
#[derive(Debug, Default)]
pub struct Parsed {
    pub model: CanonicalModel,
    pub diagnostics: Vec<Diagnostic>,
    pub heat_pumps: Vec<HeatPumpRecord>,
}

/// A serialized document plus diagnostics about what could not be written.
#[derive(Debug, Clone)]
pub struct Serialized {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Converts one dialect to and from the canonical model.
pub trait FormatAdapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Build a model from an already loaded document.
    ///
    /// Fails only when the document is not of this adapter's kind at all;
    /// missing or odd data becomes diagnostics.
    fn parse_source(
        &self,
        document: &SourceDocument<'_>,
        ctx: &mut TranslationContext,
    ) -> DocumentResult<Parsed>;

    /// Load and parse text. Markup that is not well-formed is `Malformed`
    /// for this dialect; blank input stays `Unreadable`.
    fn parse(&self, text: &str, ctx: &mut TranslationContext) -> DocumentResult<Parsed> {
        let document = load_document(text).map_err(|e| match e {
            DocumentError::Unreadable(message) if !text.trim().is_empty() => {
                DocumentError::malformed(self.dialect(), message)
            }
            other => other,
        })?;
        self.parse_source(&document, ctx)
    }

    fn serialize(
        &self,
        model: &CanonicalModel,
        ctx: &mut TranslationContext,
    ) -> TranslateResult<Serialized>;
}

/// Adapters by dialect.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Dialect, Arc<dyn FormatAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry; every lookup fails with `UnsupportedFormat`.
    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with the built-in adapters for every dialect.
    pub fn builtin() -> TranslateResult<Self> {
        let mut registry = Self::empty();
        registry.register(Arc::new(XmlAdapter::builtin(Dialect::Cibd22x)?));
        registry.register(Arc::new(XmlAdapter::builtin(Dialect::Cibd22)?));
        registry.register(Arc::new(EmJsonAdapter::new()));
        Ok(registry)
    }

    /// Add or replace the adapter for its dialect.
    pub fn register(&mut self, adapter: Arc<dyn FormatAdapter>) {
        self.adapters.insert(adapter.dialect(), adapter);
    }

    pub fn get(&self, dialect: Dialect) -> TranslateResult<Arc<dyn FormatAdapter>> {
        self.adapters
            .get(&dialect)
            .cloned()
            .ok_or_else(|| TranslateError::UnsupportedFormat(dialect.to_string()))
    }

    pub fn dialects(&self) -> Vec<Dialect> {
        let mut dialects: Vec<Dialect> = self.adapters.keys().copied().collect();
        dialects.sort();
        dialects
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("dialects", &self.dialects())
            .finish()
    }
}

/// Built-in adapter for a dialect.
pub fn adapter_for(dialect: Dialect) -> TranslateResult<Arc<dyn FormatAdapter>> {
    AdapterRegistry::builtin()?.get(dialect)
}

/// `I-MAP-<KIND>` count diagnostics, one per kind present in the model.
pub(crate) fn map_diagnostics(model: &CanonicalModel) -> Vec<Diagnostic> {
    let counts = [
        (EntityKind::Zone, model.zones.len()),
        (EntityKind::ZoneGroup, model.zone_groups.len()),
        (EntityKind::Surface, model.surfaces.len()),
        (EntityKind::Opening, model.openings.len()),
        (EntityKind::WindowType, model.window_types.len()),
        (EntityKind::Construction, model.constructions.len()),
        (EntityKind::Material, model.materials.len()),
        (EntityKind::DuType, model.du_types.len()),
        (EntityKind::PvArray, model.pv_arrays.len()),
        (EntityKind::Hvac, model.hvac_systems.len()),
        (EntityKind::Dhw, model.dhw_systems.len()),
        (EntityKind::IaqFan, model.iaq_fans.len()),
    ];

    counts
        .into_iter()
        .filter(|(kind, n)| *n > 0 || *kind == EntityKind::Zone)
        .map(|(kind, n)| {
            Diagnostic::info(
                format!("I-MAP-{}", kind.code()),
                format!("{} parsed", kind.count_label(n)),
            )
            .with_context("count", n)
        })
        .collect()
}
