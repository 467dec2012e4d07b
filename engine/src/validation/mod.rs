//! Model validation and canonical-document schema checks.
//!
//! [`Validator`] runs structural, referential and range checks over a
//! [`CanonicalModel`]. It has no side effects, so calling it twice on the
//! same model yields the same report.
//!
//! # Codes
//!
//! | Level   | Code                 | Condition                                    |
//! |---------|----------------------|----------------------------------------------|
//! | error   | `E-ID-DUPLICATE`     | the same id on two entities                  |
//! | error   | `E-SURF-BADZONE`     | surface zone does not resolve                |
//! | error   | `E-ZONE-BADSURF`     | zone lists a surface that does not exist     |
//! | error   | `E-OPEN-BADPARENT`   | opening parent surface does not resolve      |
//! | error   | `E-*-BAD*`           | any other dangling reference                 |
//! | error   | `E-AREA-NONPOSITIVE` | area ≤ 0                                     |
//! | error   | `E-ZONE-MULT`        | zone multiplier < 1                          |
//! | warning | `W-MODEL-NOZONES`    | no zones                                     |
//! | warning | `W-SURF-TILT`        | tilt outside [0, 180]                        |
//! | warning | `W-SURF-AZIMUTH`     | azimuth outside [0, 360)                     |
//! | warning | `W-FEN-RANGE`        | SHGC or VT outside [0, 1]                    |
//! | info    | `I-VAL-*`            | counts of zones, surfaces, openings checked  |
//!
//! The canonical JSON document additionally has a JSON Schema (Draft 7),
//! embedded from `schemas/emjson-v6.schema.json`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::models::{CanonicalModel, Diagnostic, DiagnosticLevel, EntityKind};

static EMJSON_SCHEMA: Lazy<Result<Value, String>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/emjson-v6.schema.json")).map_err(|e| e.to_string())
});

static EMJSON_VALIDATOR: Lazy<Result<jsonschema::Validator, String>> = Lazy::new(|| {
    let schema = EMJSON_SCHEMA.as_ref().map_err(Clone::clone)?;
    jsonschema::draft7::new(schema).map_err(|e| format!("invalid schema: {}", e))
});

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` when valid
/// * `Err(Vec<String>)` with every violation otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Just true/false.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// The embedded canonical document schema.
pub fn emjson_schema() -> Result<&'static Value, String> {
    EMJSON_SCHEMA.as_ref().map_err(Clone::clone)
}

/// Validate a canonical JSON document against the embedded schema.
pub fn validate_emjson_document(data: &Value) -> Result<(), Vec<String>> {
    let validator = EMJSON_VALIDATOR.as_ref().map_err(|e| vec![e.clone()])?;
    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn is_valid_emjson_document(data: &Value) -> bool {
    validate_emjson_document(data).is_ok()
}

// =============================================================================
// Model validation
// =============================================================================

/// Outcome of validating one model. `is_valid` is exactly `errors.is_empty()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub info: Vec<Diagnostic>,
}

impl ValidationReport {
    /// Sort diagnostics into levels.
    pub fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        let mut report = Self::default();
        for d in diagnostics {
            match d.level {
                DiagnosticLevel::Error => report.errors.push(d),
                DiagnosticLevel::Warning => report.warnings.push(d),
                DiagnosticLevel::Info => report.info.push(d),
            }
        }
        report.is_valid = report.errors.is_empty();
        report
    }

    /// Errors, then warnings, then info.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.errors
            .iter()
            .chain(&self.warnings)
            .chain(&self.info)
            .cloned()
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

/// Referential, structural and range checks over a canonical model.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

/// Ids per kind, for reference checks.
struct Ids<'m> {
    by_kind: BTreeMap<EntityKind, HashSet<&'m str>>,
}

impl<'m> Ids<'m> {
    fn new(model: &'m CanonicalModel) -> Self {
        let mut by_kind: BTreeMap<EntityKind, HashSet<&'m str>> = BTreeMap::new();
        for (kind, id) in model.ids() {
            by_kind.entry(kind).or_default().insert(id);
        }
        Self { by_kind }
    }

    fn has(&self, kind: EntityKind, id: &str) -> bool {
        self.by_kind.get(&kind).is_some_and(|ids| ids.contains(id))
    }
}

impl Validator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, model: &CanonicalModel) -> ValidationReport {
        let ids = Ids::new(model);
        let mut out = Vec::new();

        check_duplicates(model, &mut out);
        check_zones(model, &ids, &mut out);
        check_surfaces(model, &ids, &mut out);
        check_openings(model, &ids, &mut out);
        check_catalogs(model, &ids, &mut out);
        check_systems(model, &ids, &mut out);

        if model.zones.is_empty() {
            out.push(Diagnostic::warning("W-MODEL-NOZONES", "model has no zones"));
        }

        for (code, kind, n) in [
            ("I-VAL-ZONES", EntityKind::Zone, model.zones.len()),
            ("I-VAL-SURFACES", EntityKind::Surface, model.surfaces.len()),
            ("I-VAL-OPENINGS", EntityKind::Opening, model.openings.len()),
        ] {
            out.push(
                Diagnostic::info(code, format!("{} validated", kind.count_label(n)))
                    .with_context("count", n),
            );
        }

        ValidationReport::from_diagnostics(out)
    }
}

/// Validate with the default validator.
pub fn validate_model(model: &CanonicalModel) -> ValidationReport {
    Validator::new().validate(model)
}

fn dangling(code: &str, owner_kind: EntityKind, owner: &str, target_kind: EntityKind, target: &str) -> Diagnostic {
    Diagnostic::error(
        code,
        format!(
            "{} '{}' references missing {} '{}'",
            owner_kind.label(),
            owner,
            target_kind.label(),
            target
        ),
    )
    .with_context("id", owner)
    .with_context("reference", target)
}

fn nonpositive_area(kind: EntityKind, id: &str, area: Option<f64>, out: &mut Vec<Diagnostic>) {
    if let Some(area) = area.filter(|a| *a <= 0.0) {
        out.push(
            Diagnostic::error(
                "E-AREA-NONPOSITIVE",
                format!("{} '{}' has non-positive area {}", kind.label(), id, area),
            )
            .with_context("id", id)
            .with_context("area", area),
        );
    }
}

fn orientation(kind: EntityKind, id: &str, tilt: Option<f64>, azimuth: Option<f64>, out: &mut Vec<Diagnostic>) {
    if let Some(tilt) = tilt.filter(|t| !(0.0..=180.0).contains(t)) {
        out.push(
            Diagnostic::warning(
                "W-SURF-TILT",
                format!("{} '{}' tilt {} is outside [0, 180]", kind.label(), id, tilt),
            )
            .with_context("id", id)
            .with_context("tilt", tilt),
        );
    }
    if let Some(azimuth) = azimuth.filter(|a| !(0.0..360.0).contains(a)) {
        out.push(
            Diagnostic::warning(
                "W-SURF-AZIMUTH",
                format!("{} '{}' azimuth {} is outside [0, 360)", kind.label(), id, azimuth),
            )
            .with_context("id", id)
            .with_context("azimuth", azimuth),
        );
    }
}

fn fenestration(kind: EntityKind, id: &str, shgc: Option<f64>, vt: Option<f64>, out: &mut Vec<Diagnostic>) {
    for (field, value) in [("shgc", shgc), ("vt", vt)] {
        if let Some(value) = value.filter(|v| !(0.0..=1.0).contains(v)) {
            out.push(
                Diagnostic::warning(
                    "W-FEN-RANGE",
                    format!("{} '{}' {} {} is outside [0, 1]", kind.label(), id, field, value),
                )
                .with_context("id", id)
                .with_context("field", field)
                .with_context("value", value),
            );
        }
    }
}

fn check_duplicates(model: &CanonicalModel, out: &mut Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for (kind, id) in model.ids() {
        if !seen.insert(id) && reported.insert(id) {
            out.push(
                Diagnostic::error("E-ID-DUPLICATE", format!("id '{}' is used more than once", id))
                    .with_context("id", id)
                    .with_context("kind", kind.label()),
            );
        }
    }
}

fn check_zones(model: &CanonicalModel, ids: &Ids<'_>, out: &mut Vec<Diagnostic>) {
    for zone in &model.zones {
        if zone.multiplier < 1 {
            out.push(
                Diagnostic::error(
                    "E-ZONE-MULT",
                    format!("zone '{}' multiplier {} is below 1", zone.id, zone.multiplier),
                )
                .with_context("id", zone.id.as_str())
                .with_context("multiplier", zone.multiplier),
            );
        }
        nonpositive_area(EntityKind::Zone, &zone.id, zone.floor_area_m2, out);

        for surface in zone.surface_ids.iter().filter(|s| !ids.has(EntityKind::Surface, s)) {
            out.push(dangling("E-ZONE-BADSURF", EntityKind::Zone, &zone.id, EntityKind::Surface, surface));
        }
        if let Some(du) = zone.du_type_ref.as_deref().filter(|d| !ids.has(EntityKind::DuType, d)) {
            out.push(dangling("E-ZONE-BADDU", EntityKind::Zone, &zone.id, EntityKind::DuType, du));
        }
    }

    for group in &model.zone_groups {
        for zone in group.zone_refs.iter().filter(|z| !ids.has(EntityKind::Zone, z)) {
            out.push(dangling("E-ZGRP-BADZONE", EntityKind::ZoneGroup, &group.id, EntityKind::Zone, zone));
        }
    }
}

fn check_surfaces(model: &CanonicalModel, ids: &Ids<'_>, out: &mut Vec<Diagnostic>) {
    let kind = EntityKind::Surface;
    for surface in &model.surfaces {
        if !ids.has(EntityKind::Zone, &surface.zone_id) {
            out.push(dangling("E-SURF-BADZONE", kind, &surface.id, EntityKind::Zone, &surface.zone_id));
        }
        if let Some(cons) = surface
            .construction_ref
            .as_deref()
            .filter(|c| !ids.has(EntityKind::Construction, c))
        {
            out.push(dangling("E-SURF-BADCONS", kind, &surface.id, EntityKind::Construction, cons));
        }
        if let Some(zone) = surface.adjacency.zone_id().filter(|z| !ids.has(EntityKind::Zone, z)) {
            out.push(dangling("E-SURF-BADADJ", kind, &surface.id, EntityKind::Zone, zone));
        }
        nonpositive_area(kind, &surface.id, surface.area_m2, out);
        orientation(kind, &surface.id, surface.tilt_deg, surface.azimuth_deg, out);
    }
}

fn check_openings(model: &CanonicalModel, ids: &Ids<'_>, out: &mut Vec<Diagnostic>) {
    let kind = EntityKind::Opening;
    for opening in &model.openings {
        if !ids.has(EntityKind::Surface, &opening.parent_surface_id) {
            out.push(dangling(
                "E-OPEN-BADPARENT",
                kind,
                &opening.id,
                EntityKind::Surface,
                &opening.parent_surface_id,
            ));
        }
        if let Some(wt) = opening
            .window_type_ref
            .as_deref()
            .filter(|w| !ids.has(EntityKind::WindowType, w))
        {
            out.push(dangling("E-OPEN-BADTYPE", kind, &opening.id, EntityKind::WindowType, wt));
        }
        nonpositive_area(kind, &opening.id, opening.area_m2, out);
        fenestration(kind, &opening.id, opening.shgc, opening.vt, out);
    }
}

fn check_catalogs(model: &CanonicalModel, ids: &Ids<'_>, out: &mut Vec<Diagnostic>) {
    for wt in &model.window_types {
        fenestration(EntityKind::WindowType, &wt.id, wt.shgc, wt.vt, out);
    }
    for cons in &model.constructions {
        for mat in cons.material_refs.iter().filter(|m| !ids.has(EntityKind::Material, m)) {
            out.push(dangling("E-CONS-BADMAT", EntityKind::Construction, &cons.id, EntityKind::Material, mat));
        }
    }
    for du in &model.du_types {
        nonpositive_area(EntityKind::DuType, &du.id, du.floor_area_m2, out);
    }
    for pv in &model.pv_arrays {
        orientation(EntityKind::PvArray, &pv.id, pv.tilt_deg, pv.azimuth_deg, out);
    }
}

fn check_systems(model: &CanonicalModel, ids: &Ids<'_>, out: &mut Vec<Diagnostic>) {
    let served = model
        .hvac_systems
        .iter()
        .map(|s| (EntityKind::Hvac, s.id.as_str(), &s.zone_refs))
        .chain(model.dhw_systems.iter().map(|s| (EntityKind::Dhw, s.id.as_str(), &s.zone_refs)))
        .chain(model.iaq_fans.iter().map(|s| (EntityKind::IaqFan, s.id.as_str(), &s.zone_refs)));
    for (kind, id, zones) in served {
        for zone in zones.iter().filter(|z| !ids.has(EntityKind::Zone, z)) {
            out.push(dangling("E-SYS-BADZONE", kind, id, EntityKind::Zone, zone));
        }
    }

    for dhw in &model.dhw_systems {
        let ambient = dhw
            .hpwh
            .as_ref()
            .and_then(|hp| hp.ambient_zone_ref.as_deref())
            .filter(|z| !ids.has(EntityKind::Zone, z));
        if let Some(zone) = ambient {
            out.push(dangling("E-HPWH-BADZONE", EntityKind::Dhw, &dhw.id, EntityKind::Zone, zone));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Adjacency, Opening, OpeningType, Surface, SurfaceType, Zone};
    use serde_json::json;

    fn house() -> CanonicalModel {
        let mut model = CanonicalModel::new();
        let mut zone = Zone::new("Z-1", "Living");
        zone.floor_area_m2 = Some(92.903);
        zone.surface_ids.push("S-1".into());
        model.zones.push(zone);
        let mut wall = Surface::new("S-1", "Z-1", SurfaceType::Wall);
        wall.area_m2 = Some(9.2903);
        wall.tilt_deg = Some(90.0);
        wall.azimuth_deg = Some(180.0);
        model.surfaces.push(wall);
        model
    }

    fn codes(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn test_clean_model_is_valid() {
        let report = validate_model(&house());
        assert!(report.is_valid);
        assert!(report.warnings.is_empty());
        assert_eq!(codes(&report.info), vec!["I-VAL-ZONES", "I-VAL-SURFACES", "I-VAL-OPENINGS"]);
        assert_eq!(report.info[0].message, "1 zone validated");
    }

    #[test]
    fn test_bad_parent_is_single_error() {
        let mut model = house();
        model.openings.push(Opening::new("O-1", "S-missing", OpeningType::Window));
        let report = validate_model(&model);
        assert!(!report.is_valid);
        assert_eq!(codes(&report.errors), vec!["E-OPEN-BADPARENT"]);
    }

    #[test]
    fn test_dangling_references() {
        let mut model = house();
        model.surfaces[0].construction_ref = Some("CONS-x".into());
        model.surfaces[0].adjacency = Adjacency::Zone("Z-x".into());
        model.zones[0].du_type_ref = Some("DU-x".into());
        model.zones[0].surface_ids.push("S-x".into());
        let mut roof = Surface::new("S-2", "Z-x", SurfaceType::Roof);
        roof.area_m2 = Some(10.0);
        model.surfaces.push(roof);

        let report = validate_model(&model);
        let errors = codes(&report.errors);
        for code in ["E-SURF-BADCONS", "E-SURF-BADADJ", "E-ZONE-BADDU", "E-ZONE-BADSURF", "E-SURF-BADZONE"] {
            assert!(errors.contains(&code), "missing {}", code);
        }
    }

    #[test]
    fn test_ranges() {
        let mut model = house();
        model.zones[0].multiplier = 0;
        model.surfaces[0].area_m2 = Some(0.0);
        model.surfaces[0].tilt_deg = Some(190.0);
        model.surfaces[0].azimuth_deg = Some(360.0);
        let mut window = Opening::new("O-1", "S-1", OpeningType::Window);
        window.shgc = Some(1.2);
        model.openings.push(window);

        let report = validate_model(&model);
        assert_eq!(codes(&report.errors), vec!["E-ZONE-MULT", "E-AREA-NONPOSITIVE"]);
        assert_eq!(codes(&report.warnings), vec!["W-SURF-TILT", "W-SURF-AZIMUTH", "W-FEN-RANGE"]);
    }

    #[test]
    fn test_duplicates_and_empty_model() {
        let mut model = house();
        model.zones.push(Zone::new("Z-1", "Copy"));
        let report = validate_model(&model);
        assert_eq!(codes(&report.errors), vec!["E-ID-DUPLICATE"]);

        let report = validate_model(&CanonicalModel::new());
        assert!(report.is_valid);
        assert_eq!(codes(&report.warnings), vec!["W-MODEL-NOZONES"]);
    }

    #[test]
    fn test_validation_is_idempotent() {
        let mut model = house();
        model.openings.push(Opening::new("O-1", "S-missing", OpeningType::Door));
        let validator = Validator::new();
        assert_eq!(validator.validate(&model), validator.validate(&model));
    }

    #[test]
    fn test_generic_schema_validation() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        });
        assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
        assert!(validate(&schema, &json!({ "age": 42 })).is_err());
        assert!(!is_valid(&schema, &json!({ "name": 1 })));
    }

    #[test]
    fn test_emjson_schema() {
        assert!(emjson_schema().is_ok());
        let doc = json!({
            "schema_version": "6.0",
            "geometry": {
                "zones": [{ "id": "Z-1" }],
                "surfaces": { "walls": [{ "id": "S-1", "zone_id": "Z-1" }] }
            }
        });
        assert!(is_valid_emjson_document(&doc));

        let bad = json!({ "geometry": { "surfaces": { "walls": [{ "id": "S-1" }] } } });
        let errors = validate_emjson_document(&bad).unwrap_err();
        assert!(errors.len() >= 2);
    }
}
