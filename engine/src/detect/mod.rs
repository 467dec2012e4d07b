//! Format detection by weighted structural fingerprints.
//!
//! Each [`Fingerprint`] belongs to one dialect and adds its weight to that
//! dialect's score when it matches. The highest score wins; ties go to the
//! configured fallback dialect. Confidence is the share of the winner's
//! fingerprints that matched.

use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::EngineConfig;
use crate::error::DocumentResult;
use crate::formats::emjson::SCHEMA_VERSION;
use crate::formats::{Dialect, DialectConfig};
use crate::parser::{self, SourceDocument};

/// Year patterns tried in order against the ruleset name.
static YEAR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"202\d", r"201[6-9]"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// What a fingerprint looks for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FingerprintRule {
    /// Document root has this local name.
    RootTag { tag: String },
    /// At least `min_count` elements with this local name.
    Element { tag: String, min_count: usize },
    /// At least `min_count` elements carrying this attribute.
    Attribute { name: String, min_count: usize },
    /// Top-level JSON key present.
    JsonKey { key: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fingerprint {
    pub dialect: Dialect,
    pub rule: FingerprintRule,
    pub weight: u32,
}

impl Fingerprint {
    fn new(dialect: Dialect, rule: FingerprintRule, weight: u32) -> Self {
        Self { dialect, rule, weight }
    }

    fn root(dialect: Dialect, tag: &str, weight: u32) -> Self {
        Self::new(dialect, FingerprintRule::RootTag { tag: tag.into() }, weight)
    }

    fn element(dialect: Dialect, tag: &str, min_count: usize, weight: u32) -> Self {
        Self::new(
            dialect,
            FingerprintRule::Element {
                tag: tag.into(),
                min_count,
            },
            weight,
        )
    }

    fn attribute(dialect: Dialect, name: &str, min_count: usize, weight: u32) -> Self {
        Self::new(
            dialect,
            FingerprintRule::Attribute {
                name: name.into(),
                min_count,
            },
            weight,
        )
    }

    fn json_key(key: &str, weight: u32) -> Self {
        Self::new(Dialect::EmJson, FingerprintRule::JsonKey { key: key.into() }, weight)
    }

    fn matches(&self, document: &SourceDocument<'_>) -> bool {
        match (&self.rule, document) {
            (FingerprintRule::RootTag { tag }, SourceDocument::Xml(doc)) => {
                parser::local_name(doc.root_element()) == tag.as_str()
            }
            (FingerprintRule::Element { tag, min_count }, SourceDocument::Xml(doc)) => {
                parser::count_elements(doc, tag) >= *min_count
            }
            (FingerprintRule::Attribute { name, min_count }, SourceDocument::Xml(doc)) => {
                let carrying = doc
                    .descendants()
                    .filter(|n| n.is_element() && parser::attribute(*n, name).is_some())
                    .count();
                carrying >= *min_count
            }
            (FingerprintRule::JsonKey { key }, SourceDocument::Json(value)) => value.get(key).is_some(),
            _ => false,
        }
    }
}

/// Fingerprint set used by the detector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectorConfig {
    pub fingerprints: Vec<Fingerprint>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        use Dialect::{Cibd22, Cibd22x};
        Self {
            fingerprints: vec![
                Fingerprint::root(Cibd22x, "SDDXML", 10),
                Fingerprint::element(Cibd22x, "Proj", 1, 5),
                Fingerprint::element(Cibd22x, "Name", 1, 3),
                Fingerprint::element(Cibd22x, "ConsAssmRef", 1, 5),
                Fingerprint::element(Cibd22x, "WinTypeRef", 1, 5),
                Fingerprint::element(Cibd22x, "MatRef", 1, 5),
                Fingerprint::element(Cibd22x, "DwellUnitTypeRef", 1, 5),
                Fingerprint::element(Cibd22x, "Area", 10, 3),
                Fingerprint::root(Cibd22, "Project", 10),
                Fingerprint::attribute(Cibd22, "name", 1, 3),
                Fingerprint::attribute(Cibd22, "name", 5, 2),
                Fingerprint::element(Cibd22, "CartesianPt", 1, 10),
                Fingerprint::element(Cibd22, "ZoneIdRef", 1, 5),
                Fingerprint::element(Cibd22, "SurfaceIdRef", 1, 5),
                Fingerprint::json_key("schema_version", 10),
                Fingerprint::json_key("geometry", 5),
                Fingerprint::json_key("catalogs", 3),
                Fingerprint::json_key("project", 2),
            ],
        }
    }
}

/// Building classification of a whole document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectedBuildingType {
    Residential,
    NonResidential,
    Mixed,
    #[default]
    Unknown,
}

impl DetectedBuildingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Residential => "residential",
            Self::NonResidential => "non_residential",
            Self::Mixed => "mixed",
            Self::Unknown => "unknown",
        }
    }

    /// Classify from ruleset-name keywords.
    pub fn from_ruleset(ruleset: &str) -> Option<Self> {
        let lower = ruleset.to_lowercase();
        if ["nonresidential", "nonres", "commercial"].iter().any(|k| lower.contains(k)) {
            Some(Self::NonResidential)
        } else if ["multifamily", "residential", "res"].iter().any(|k| lower.contains(k)) {
            Some(Self::Residential)
        } else {
            None
        }
    }

    fn from_presence(residential: bool, non_residential: bool) -> Self {
        match (residential, non_residential) {
            (true, true) => Self::Mixed,
            (true, false) => Self::Residential,
            (false, true) => Self::NonResidential,
            (false, false) => Self::Unknown,
        }
    }
}

impl fmt::Display for DetectedBuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detection result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatInfo {
    pub format: Dialect,
    pub version: String,
    pub building_type: DetectedBuildingType,
    pub ruleset: Option<String>,
    /// Matched over checked fingerprints of the winning dialect, in [0, 1].
    pub confidence: f64,
    /// Weighted score per dialect.
    pub scores: BTreeMap<String, u32>,
}

/// Weighted-scoring format detector.
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectorConfig,
    fallback: Dialect,
    current_version: String,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(DetectorConfig::default(), &EngineConfig::default())
    }
}

impl Detector {
    pub fn new(config: DetectorConfig, engine: &EngineConfig) -> Self {
        Self {
            config,
            fallback: engine.fallback_dialect,
            current_version: engine.current_version.clone(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Decode and load raw bytes, then detect.
    ///
    /// Fails with `Unreadable` when the input is neither XML nor JSON.
    pub fn detect_bytes(&self, bytes: &[u8]) -> DocumentResult<FormatInfo> {
        let decoded = parser::decode_bytes(bytes)?;
        self.detect_text(&decoded.text)
    }

    pub fn detect_text(&self, text: &str) -> DocumentResult<FormatInfo> {
        let document = parser::load_document(text)?;
        Ok(self.detect(&document))
    }

    /// Detect an already loaded document.
    pub fn detect(&self, document: &SourceDocument<'_>) -> FormatInfo {
        let mut scores: BTreeMap<Dialect, u32> = Dialect::ALL.iter().map(|d| (*d, 0)).collect();
        let mut checked: BTreeMap<Dialect, usize> = BTreeMap::new();
        let mut matched: BTreeMap<Dialect, usize> = BTreeMap::new();

        for fingerprint in &self.config.fingerprints {
            *checked.entry(fingerprint.dialect).or_default() += 1;
            if fingerprint.matches(document) {
                *scores.entry(fingerprint.dialect).or_default() += fingerprint.weight;
                *matched.entry(fingerprint.dialect).or_default() += 1;
            }
        }

        let format = self.winner(&scores);
        let total = checked.get(&format).copied().unwrap_or(0);
        let confidence = if total == 0 {
            0.0
        } else {
            matched.get(&format).copied().unwrap_or(0) as f64 / total as f64
        };

        let (ruleset, version, building_type) = match document {
            SourceDocument::Xml(doc) => {
                let ruleset = xml_ruleset(doc);
                let version = self.version_of(ruleset.as_deref());
                let building_type = ruleset
                    .as_deref()
                    .and_then(DetectedBuildingType::from_ruleset)
                    .unwrap_or_else(|| xml_zone_presence(doc, format));
                (ruleset, version, building_type)
            }
            SourceDocument::Json(value) => {
                let ruleset = value
                    .pointer("/project/model_info/ruleset")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let version = value
                    .get("schema_version")
                    .and_then(Value::as_str)
                    .unwrap_or(SCHEMA_VERSION)
                    .to_string();
                let building_type = ruleset
                    .as_deref()
                    .and_then(DetectedBuildingType::from_ruleset)
                    .unwrap_or_else(|| json_zone_presence(value));
                (ruleset, version, building_type)
            }
        };

        FormatInfo {
            format,
            version,
            building_type,
            ruleset,
            confidence,
            scores: scores.into_iter().map(|(d, s)| (d.to_string(), s)).collect(),
        }
    }

    /// Highest score; ties prefer the fallback, then dialect order.
    fn winner(&self, scores: &BTreeMap<Dialect, u32>) -> Dialect {
        let best = scores.values().copied().max().unwrap_or(0);
        let leaders: Vec<Dialect> = scores
            .iter()
            .filter(|(_, s)| **s == best)
            .map(|(d, _)| *d)
            .collect();
        if leaders.len() == 1 {
            leaders[0]
        } else if leaders.contains(&self.fallback) || best == 0 {
            self.fallback
        } else {
            leaders.first().copied().unwrap_or(self.fallback)
        }
    }

    /// First year pattern found in the ruleset, else the current version.
    pub fn version_of(&self, ruleset: Option<&str>) -> String {
        ruleset
            .and_then(|r| YEAR_PATTERNS.iter().find_map(|re| re.find(r)))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| self.current_version.clone())
    }
}

/// Ruleset name from `RulesetFilename`, else any element named like a ruleset.
fn xml_ruleset(doc: &Document<'_>) -> Option<String> {
    let value_of = |node: roxmltree::Node<'_, '_>| {
        parser::attribute(node, "file")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| parser::text(node))
            .map(str::to_string)
    };

    let elements = || doc.descendants().filter(|n| n.is_element());
    elements()
        .filter(|n| parser::local_name(*n) == "RulesetFilename")
        .find_map(value_of)
        .or_else(|| {
            elements()
                .filter(|n| parser::local_name(*n).to_lowercase().contains("ruleset"))
                .find_map(value_of)
        })
}

fn xml_zone_presence(doc: &Document<'_>, format: Dialect) -> DetectedBuildingType {
    let Ok(cfg) = DialectConfig::builtin(format) else {
        return DetectedBuildingType::Unknown;
    };
    let present = |building_type: &str| {
        cfg.zone_tags_of(building_type)
            .iter()
            .any(|tag| parser::count_elements(doc, tag) > 0)
    };
    DetectedBuildingType::from_presence(present("residential"), present("non_residential"))
}

fn json_zone_presence(value: &Value) -> DetectedBuildingType {
    let zones = value
        .pointer("/geometry/zones")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let present = |building_type: &str| {
        zones
            .iter()
            .any(|z| z.get("building_type").and_then(Value::as_str) == Some(building_type))
    };
    DetectedBuildingType::from_presence(present("residential"), present("non_residential"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentError;

    const NESTED: &str = r#"<SDDXML>
      <Proj>
        <Name>House</Name>
        <RulesetFilename file="CA Res 2019.bin"/>
        <Bldg><ResZn><Name>Living</Name><Area>100</Area></ResZn></Bldg>
      </Proj>
    </SDDXML>"#;

    const FLAT: &str = r#"<Project name="Office">
      <Building name="B">
        <NonResidentialZone id="z1" name="Open Office"/>
        <ExteriorWall name="W"><ZoneIdRef>z1</ZoneIdRef></ExteriorWall>
      </Building>
    </Project>"#;

    #[test]
    fn test_detects_nested_dialect() {
        let info = Detector::default().detect_text(NESTED).unwrap();
        assert_eq!(info.format, Dialect::Cibd22x);
        assert_eq!(info.version, "2019");
        assert_eq!(info.ruleset.as_deref(), Some("CA Res 2019.bin"));
        assert_eq!(info.building_type, DetectedBuildingType::Residential);
        // root, Proj, Name out of eight
        assert!((info.confidence - 3.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_detects_flat_dialect() {
        let info = Detector::default().detect_text(FLAT).unwrap();
        assert_eq!(info.format, Dialect::Cibd22);
        assert_eq!(info.version, "2022");
        assert_eq!(info.building_type, DetectedBuildingType::NonResidential);
        // root, name attribute, ZoneIdRef out of six
        assert!((info.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_detects_emjson() {
        let info = Detector::default()
            .detect_text(r#"{"schema_version": "6.1", "geometry": {"zones": [{"id": "Z-1", "building_type": "residential"}]}}"#)
            .unwrap();
        assert_eq!(info.format, Dialect::EmJson);
        assert_eq!(info.version, "6.1");
        assert_eq!(info.building_type, DetectedBuildingType::Residential);
        assert!((info.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_tie_goes_to_fallback() {
        let info = Detector::default().detect_text("<Unknown/>").unwrap();
        assert_eq!(info.format, Dialect::Cibd22x);
        assert_eq!(info.confidence, 0.0);
    }

    #[test]
    fn test_unreadable_input() {
        let err = Detector::default().detect_bytes(b"not a document").unwrap_err();
        assert!(matches!(err, DocumentError::Unreadable(_)));
        let err = Detector::default().detect_bytes(b"   ").unwrap_err();
        assert!(matches!(err, DocumentError::Unreadable(_)));
    }

    #[test]
    fn test_ruleset_keywords() {
        use DetectedBuildingType::*;
        assert_eq!(DetectedBuildingType::from_ruleset("CA Nonresidential 2022"), Some(NonResidential));
        assert_eq!(DetectedBuildingType::from_ruleset("Commercial"), Some(NonResidential));
        assert_eq!(DetectedBuildingType::from_ruleset("Multifamily 2022"), Some(Residential));
        assert_eq!(DetectedBuildingType::from_ruleset("T24N"), None);
    }

    #[test]
    fn test_version_patterns() {
        let detector = Detector::default();
        assert_eq!(detector.version_of(Some("CA Res 2025.bin")), "2025");
        assert_eq!(detector.version_of(Some("T24 2016")), "2016");
        assert_eq!(detector.version_of(Some("T24 2013")), "2022");
        assert_eq!(detector.version_of(None), "2022");
    }

    #[test]
    fn test_mixed_zone_presence() {
        let text = r#"<SDDXML><Proj><Bldg><ResZn/><ComZn/></Bldg></Proj></SDDXML>"#;
        let info = Detector::default().detect_text(text).unwrap();
        assert_eq!(info.building_type, DetectedBuildingType::Mixed);
    }

    #[test]
    fn test_fingerprints_roundtrip_through_json() {
        let config = DetectorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"root_tag\""));
        let back: DetectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
