//! Translation state machine.
//!
//! ```text
//! Detecting → Parsing → Validating(source) → Serializing → Validating(target) → Done
//!     └──────────┴──────────────┴───────────────┴─────────────────┴──→ Failed
//! ```
//!
//! Diagnostics accumulate across every stage in order. A failure carries
//! everything collected up to the failing stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::context::TranslationContext;
use crate::config::EngineConfig;
use crate::detect::{Detector, DetectorConfig, FormatInfo};
use crate::enrich;
use crate::error::{TranslateError, TranslateResult};
use crate::formats::{AdapterRegistry, Dialect, FormatAdapter};
use crate::models::{CanonicalModel, Diagnostic};
use crate::parser;
use crate::validation::{ValidationReport, Validator};

/// Orchestrator states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Detecting,
    Parsing,
    ValidatingSource,
    Serializing,
    ValidatingTarget,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Detecting => "detecting",
            Self::Parsing => "parsing",
            Self::ValidatingSource => "validating(source)",
            Self::Serializing => "serializing",
            Self::ValidatingTarget => "validating(target)",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// A completed translation.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationResult {
    pub run_id: Uuid,
    pub source_format: FormatInfo,
    pub target_format: Option<Dialect>,
    pub stages: Vec<Stage>,
    pub diagnostics: Vec<Diagnostic>,
    pub source_validation: ValidationReport,
    pub target_validation: ValidationReport,
    /// Serialized document, when a target was requested.
    pub output: Option<String>,
    pub model: CanonicalModel,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TranslationResult {
    /// 0 when the target validates, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.target_validation.is_valid {
            0
        } else {
            1
        }
    }
}

/// A translation that stopped at `Failed`.
#[derive(Debug, Error)]
#[error("translation failed while {stage}: {error}")]
pub struct TranslationFailure {
    pub error: TranslateError,
    /// Stage that failed.
    pub stage: Stage,
    pub stages: Vec<Stage>,
    pub source_format: Option<FormatInfo>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TranslationFailure {
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Stage and diagnostic bookkeeping for one run.
#[derive(Default)]
struct Run {
    stages: Vec<Stage>,
    diagnostics: Vec<Diagnostic>,
    source_format: Option<FormatInfo>,
}

impl Run {
    fn enter(&mut self, stage: Stage) {
        debug!(%stage, "entering stage");
        self.stages.push(stage);
    }

    fn fail(mut self, error: impl Into<TranslateError>) -> TranslationFailure {
        let error = error.into();
        let stage = self.stages.last().copied().unwrap_or(Stage::Detecting);
        warn!(%stage, %error, "translation failed");
        self.stages.push(Stage::Failed);
        TranslationFailure {
            error,
            stage,
            stages: self.stages,
            source_format: self.source_format,
            diagnostics: self.diagnostics,
        }
    }
}

/// Detect → parse → validate → serialize → validate.
#[derive(Debug, Clone)]
pub struct Translator {
    adapters: AdapterRegistry,
    detector: Detector,
    validator: Validator,
    config: Arc<EngineConfig>,
}

impl Translator {
    /// Translator over the built-in adapters and fingerprints.
    pub fn new(config: Arc<EngineConfig>) -> TranslateResult<Self> {
        let detector = Detector::new(DetectorConfig::default(), &config);
        Ok(Self::with_parts(AdapterRegistry::builtin()?, detector, config))
    }

    pub fn with_parts(adapters: AdapterRegistry, detector: Detector, config: Arc<EngineConfig>) -> Self {
        Self {
            adapters,
            detector,
            validator: Validator::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_arc(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.config)
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Context with a private registry and this translator's config.
    pub fn context(&self) -> TranslationContext {
        TranslationContext::new(Arc::clone(&self.config))
    }

    pub fn translate_file(
        &self,
        path: impl AsRef<Path>,
        target: Option<Dialect>,
        ctx: &mut TranslationContext,
    ) -> Result<TranslationResult, TranslationFailure> {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(bytes) => self.translate(&bytes, target, ctx),
            Err(e) => {
                let mut run = Run::default();
                run.enter(Stage::Detecting);
                Err(run.fail(crate::error::DocumentError::Io(e)))
            }
        }
    }

    /// Translate raw input bytes, optionally into `target`.
    ///
    /// With no target the run stops after source validation and the target
    /// validation mirrors it.
    pub fn translate(
        &self,
        input: &[u8],
        target: Option<Dialect>,
        ctx: &mut TranslationContext,
    ) -> Result<TranslationResult, TranslationFailure> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut run = Run::default();

        run.enter(Stage::Detecting);
        let decoded = match parser::decode_bytes(input) {
            Ok(decoded) => decoded,
            Err(e) => return Err(run.fail(e)),
        };
        let document = match parser::load_document(&decoded.text) {
            Ok(document) => document,
            Err(e) => return Err(run.fail(e)),
        };
        let detected = self.detector.detect(&document);
        info!(
            %run_id,
            format = %detected.format,
            version = %detected.version,
            confidence = detected.confidence,
            encoding = %decoded.encoding,
            "format detected"
        );
        run.diagnostics.push(
            Diagnostic::info(
                "I-DETECT-FORMAT",
                format!(
                    "detected {} {} ({}, confidence {:.2})",
                    detected.format, detected.version, detected.building_type, detected.confidence
                ),
            )
            .with_context("format", detected.format.as_str())
            .with_context("version", detected.version.as_str())
            .with_context("confidence", detected.confidence)
            .with_context("encoding", decoded.encoding.as_str()),
        );
        run.source_format = Some(detected.clone());

        if detected.confidence < self.config.min_confidence {
            return Err(run.fail(TranslateError::UnknownFormat {
                best_guess: detected.format,
                confidence: detected.confidence,
                threshold: self.config.min_confidence,
            }));
        }
        let source = match self.adapters.get(detected.format) {
            Ok(adapter) => adapter,
            Err(e) => return Err(run.fail(e)),
        };

        run.enter(Stage::Parsing);
        let parsed = match source.parse_source(&document, ctx) {
            Ok(parsed) => parsed,
            Err(e) => return Err(run.fail(e)),
        };
        run.diagnostics.extend(parsed.diagnostics);
        let mut model = parsed.model;
        run.diagnostics.extend(enrich::run(&mut model, parsed.heat_pumps));

        let model_info = &mut model.project.model_info;
        model_info.source_version.get_or_insert_with(|| detected.version.clone());
        model_info
            .building_type
            .get_or_insert_with(|| detected.building_type.as_str().to_string());
        debug!(counts = ?model.counts(), "model built");

        run.enter(Stage::ValidatingSource);
        let source_validation = self.validator.validate(&model);
        info!(
            valid = source_validation.is_valid,
            errors = source_validation.error_count(),
            warnings = source_validation.warning_count(),
            "source validated"
        );
        run.diagnostics.extend(source_validation.diagnostics());

        let (output, target_validation) = match target {
            None => {
                model.diagnostics = run.diagnostics.clone();
                (None, source_validation.clone())
            }
            Some(target) => {
                run.enter(Stage::Serializing);
                let adapter = match self.adapters.get(target) {
                    Ok(adapter) => adapter,
                    Err(e) => return Err(run.fail(e)),
                };
                model.diagnostics = run.diagnostics.clone();
                let serialized = match adapter.serialize(&model, ctx) {
                    Ok(serialized) => serialized,
                    Err(e) => return Err(run.fail(e)),
                };
                run.diagnostics.extend(serialized.diagnostics);
                info!(target = %target, bytes = serialized.text.len(), "output serialized");

                run.enter(Stage::ValidatingTarget);
                let target_validation = if self.config.roundtrip_check {
                    self.roundtrip(adapter.as_ref(), &serialized.text, &model, ctx, &mut run.diagnostics)
                } else {
                    source_validation.clone()
                };
                (Some(serialized.text), target_validation)
            }
        };

        run.enter(Stage::Done);
        let finished_at = Utc::now();
        info!(
            %run_id,
            valid = target_validation.is_valid,
            diagnostics = run.diagnostics.len(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "translation done"
        );

        Ok(TranslationResult {
            run_id,
            source_format: detected,
            target_format: target,
            stages: run.stages,
            diagnostics: run.diagnostics,
            source_validation,
            target_validation,
            output,
            model,
            started_at,
            finished_at,
        })
    }

    /// Re-read the output with a fresh registry, compare counts, validate.
    fn roundtrip(
        &self,
        adapter: &dyn FormatAdapter,
        text: &str,
        source: &CanonicalModel,
        ctx: &TranslationContext,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> ValidationReport {
        let mut fresh = ctx.fresh();
        let parsed = match adapter.parse(text, &mut fresh) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "serialized output could not be re-read");
                let error = Diagnostic::error(
                    "E-RT-PARSE",
                    format!("serialized {} output could not be re-read: {}", adapter.dialect(), e),
                );
                diagnostics.push(error.clone());
                return ValidationReport::from_diagnostics(vec![error]);
            }
        };
        let mut back = parsed.model;
        enrich::run(&mut back, parsed.heat_pumps);

        let back_counts = back.counts();
        for (bucket, expected) in source.counts() {
            let actual = back_counts.get(&bucket).copied().unwrap_or(0);
            if actual != expected {
                diagnostics.push(
                    Diagnostic::warning(
                        "W-RT-COUNT",
                        format!("{}: {} in source, {} after round trip", bucket, expected, actual),
                    )
                    .with_context("bucket", bucket.as_str())
                    .with_context("source", expected)
                    .with_context("target", actual),
                );
            }
        }

        let report = self.validator.validate(&back);
        diagnostics.extend(report.diagnostics());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentError;
    use crate::models::SurfaceType;

    const HOUSE: &str = r#"<SDDXML>
      <Proj>
        <Name>Scenario</Name>
        <ZipCode>93721</ZipCode>
        <Bldg>
          <ResZn>
            <Name>Living</Name>
            <FloorArea>1000</FloorArea>
            <ResExtWall>
              <Name>North</Name>
              <Area>100</Area>
            </ResExtWall>
          </ResZn>
        </Bldg>
      </Proj>
    </SDDXML>"#;

    const DANGLING: &str = r#"<Project name="P">
      <Building name="B">
        <ResidentialZone id="z1" name="Kitchen"><FloorArea>150</FloorArea></ResidentialZone>
        <ExteriorWall id="w1" name="East"><ZoneIdRef>z1</ZoneIdRef><Area>80</Area></ExteriorWall>
        <Door name="Back"><SurfaceIdRef>East</SurfaceIdRef><Area>20</Area></Door>
        <Roof name="Top"><ZoneIdRef>Ghost</ZoneIdRef><Area>150</Area></Roof>
      </Building>
    </Project>"#;

    fn translator() -> Translator {
        Translator::new(Arc::new(EngineConfig::default())).unwrap()
    }

    #[test]
    fn test_residential_scenario() {
        let translator = translator();
        let mut ctx = translator.context();
        let result = translator
            .translate(HOUSE.as_bytes(), Some(Dialect::EmJson), &mut ctx)
            .unwrap();

        assert_eq!(result.source_format.format, Dialect::Cibd22x);
        assert_eq!(
            result.stages,
            vec![
                Stage::Detecting,
                Stage::Parsing,
                Stage::ValidatingSource,
                Stage::Serializing,
                Stage::ValidatingTarget,
                Stage::Done
            ]
        );
        assert!((result.model.zones[0].floor_area_m2.unwrap() - 92.903).abs() < 1e-3);
        let wall = result.model.surfaces_of(SurfaceType::Wall).next().unwrap();
        assert!((wall.area_m2.unwrap() - 9.2903).abs() < 1e-4);

        assert!(result.source_validation.is_valid);
        assert!(result.source_validation.errors.is_empty());
        let parsed: Vec<&Diagnostic> = result
            .diagnostics
            .iter()
            .filter(|d| d.code == "I-MAP-ZONES")
            .collect();
        assert_eq!(parsed[0].message, "1 zone parsed");
        assert!(result.diagnostics.iter().all(|d| d.code != "W-RT-COUNT"));

        assert!(result.output.as_deref().unwrap().contains("\"schema_version\": \"6.0\""));
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.model.project.model_info.source_version.as_deref(), Some("2022"));
    }

    #[test]
    fn test_without_target_mirrors_source_validation() {
        let translator = translator();
        let mut ctx = translator.context();
        let result = translator.translate(HOUSE.as_bytes(), None, &mut ctx).unwrap();
        assert_eq!(
            result.stages,
            vec![Stage::Detecting, Stage::Parsing, Stage::ValidatingSource, Stage::Done]
        );
        assert!(result.output.is_none());
        assert_eq!(result.target_validation, result.source_validation);
    }

    #[test]
    fn test_dangling_reference_exits_one() {
        let translator = translator();
        let mut ctx = translator.context();
        let result = translator
            .translate(DANGLING.as_bytes(), Some(Dialect::Cibd22), &mut ctx)
            .unwrap();
        assert_eq!(result.source_format.format, Dialect::Cibd22);
        assert!(!result.source_validation.is_valid);
        assert!(result
            .source_validation
            .errors
            .iter()
            .any(|d| d.code == "E-SURF-BADZONE"));
        assert!(result.diagnostics.iter().any(|d| d.code == "W-REF-UNRESOLVED"));
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn test_low_confidence_is_unknown_format() {
        let translator = translator();
        let mut ctx = translator.context();
        let failure = translator
            .translate(b"<Unknown/>", Some(Dialect::EmJson), &mut ctx)
            .unwrap_err();
        assert!(matches!(failure.error, TranslateError::UnknownFormat { .. }));
        assert_eq!(failure.stage, Stage::Detecting);
        assert_eq!(failure.stages, vec![Stage::Detecting, Stage::Failed]);
        assert_eq!(failure.exit_code(), 2);
        assert!(failure.diagnostics.iter().any(|d| d.code == "I-DETECT-FORMAT"));
    }

    #[test]
    fn test_unreadable_input_fails_detecting() {
        let translator = translator();
        let mut ctx = translator.context();
        let failure = translator.translate(b"", None, &mut ctx).unwrap_err();
        assert!(matches!(
            failure.error,
            TranslateError::Document(DocumentError::Unreadable(_))
        ));
        assert!(failure.source_format.is_none());
    }

    #[test]
    fn test_malformed_document_keeps_diagnostics() {
        let config = Arc::new(EngineConfig {
            min_confidence: 0.0,
            ..EngineConfig::default()
        });
        let translator = Translator::new(config).unwrap();
        let mut ctx = translator.context();
        let failure = translator.translate(b"[1, 2]", None, &mut ctx).unwrap_err();
        assert_eq!(failure.stage, Stage::Parsing);
        assert!(matches!(
            failure.error,
            TranslateError::Document(DocumentError::Malformed { .. })
        ));
        assert!(!failure.diagnostics.is_empty());
    }

    #[test]
    fn test_ids_stable_across_runs() {
        let translator = translator();
        let mut first = translator.context();
        let a = translator.translate(HOUSE.as_bytes(), None, &mut first).unwrap();
        let mut second = translator.context();
        let b = translator.translate(HOUSE.as_bytes(), None, &mut second).unwrap();
        assert_eq!(a.model.ids(), b.model.ids());
        assert_ne!(a.run_id, b.run_id);
    }

    #[test]
    fn test_emjson_roundtrip_keeps_counts() {
        let translator = translator();
        let mut ctx = translator.context();
        let json = translator
            .translate(HOUSE.as_bytes(), Some(Dialect::EmJson), &mut ctx)
            .unwrap()
            .output
            .unwrap();

        let mut ctx = translator.context();
        let back = translator
            .translate(json.as_bytes(), Some(Dialect::Cibd22x), &mut ctx)
            .unwrap();
        assert_eq!(back.source_format.format, Dialect::EmJson);
        assert!(back.diagnostics.iter().all(|d| d.code != "W-RT-COUNT"));
        assert_eq!(back.exit_code(), 0);
    }

    #[test]
    fn test_same_names_in_two_zones_get_distinct_ids() {
        let text = r#"<SDDXML><Proj><Name>P</Name><ZipCode>94105</ZipCode><Bldg>
            <ResZn><Name>A</Name><FloorArea>300</FloorArea>
              <ResExtWall><Name>Wall</Name><Area>10</Area></ResExtWall>
              <ResExtWall><Name>Wall</Name><Area>20</Area></ResExtWall>
            </ResZn>
            <ResZn><Name>B</Name><FloorArea>300</FloorArea>
              <ResExtWall><Name>Wall</Name><Area>30</Area></ResExtWall>
              <ResExtWall><Name>Wall</Name><Area>40</Area></ResExtWall>
            </ResZn>
        </Bldg></Proj></SDDXML>"#;
        let translator = translator();
        let mut ctx = translator.context();
        let result = translator
            .translate(text.as_bytes(), Some(Dialect::EmJson), &mut ctx)
            .unwrap();

        let ids: std::collections::HashSet<&str> =
            result.model.surfaces.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 4);
        assert!(result.source_validation.errors.iter().all(|d| d.code != "E-ID-DUPLICATE"));
        assert!(result.diagnostics.iter().all(|d| d.code != "W-RT-COUNT"));
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn test_conflicting_emjson_id_is_reported() {
        let mut registry = crate::registry::IdRegistry::new();
        assert!(registry.claim("Z-custom", "Living", "", "CIBD22X"));
        let text = serde_json::json!({
            "schema_version": "6.0",
            "geometry": { "zones": [{ "id": "Z-custom", "name": "Kitchen" }] },
            "id_registry": serde_json::to_value(registry.export()).unwrap(),
        })
        .to_string();

        let translator = translator();
        let mut ctx = translator.context();
        let result = translator.translate(text.as_bytes(), None, &mut ctx).unwrap();
        assert_eq!(result.source_format.format, Dialect::EmJson);
        assert_eq!(result.model.zones[0].id, "Z-custom");
        assert!(result.diagnostics.iter().any(|d| d.code == "W-ID-CONFLICT"));
    }
}
