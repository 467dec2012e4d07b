//! Canonical JSON document, schema v6.
//!
//! Layout:
//!
//! ```text
//! {
//!   "schema_version": "6.0",
//!   "project":  { name, model_info, location },
//!   "geometry": { zone_groups[], zones[], surfaces{walls,roofs,floors}, openings{windows,doors,skylights} },
//!   "catalogs": { window_types[], construction_types[], materials[], du_types[] },
//!   "systems":  { hvac[], dhw[], pv[], iaq_fans[] },
//!   "diagnostics": [],
//!   "id_registry": { forward_map, reverse_map }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::{map_diagnostics, Dialect, FormatAdapter, Parsed, Serialized};
use crate::error::{DocumentError, DocumentResult, TranslateError, TranslateResult};
use crate::models::{
    CanonicalModel, Diagnostic, EntityKind, Opening, OpeningType, Project, Surface, SurfaceType,
};
use crate::parser::SourceDocument;
use crate::registry::RegistryExport;
use crate::translate::TranslationContext;
use crate::validation::validate_emjson_document;

pub const SCHEMA_VERSION: &str = "6.0";

const FORMAT: &str = "EMJSON";

/// Reads and writes the canonical JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmJsonAdapter;

impl EmJsonAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl FormatAdapter for EmJsonAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::EmJson
    }

    fn parse_source(
        &self,
        document: &SourceDocument<'_>,
        ctx: &mut TranslationContext,
    ) -> DocumentResult<Parsed> {
        let root = match document {
            SourceDocument::Json(value) => value,
            SourceDocument::Xml(_) => {
                return Err(DocumentError::malformed(
                    Dialect::EmJson,
                    "expected a JSON document, found XML",
                ))
            }
        };
        let object = root.as_object().ok_or_else(|| {
            DocumentError::malformed(Dialect::EmJson, "top-level value must be an object")
        })?;

        let mut reader = Reader {
            ctx,
            diagnostics: Vec::new(),
        };
        Ok(reader.read(root, object))
    }

    fn serialize(
        &self,
        model: &CanonicalModel,
        ctx: &mut TranslationContext,
    ) -> TranslateResult<Serialized> {
        let mut surfaces = Map::new();
        for t in SurfaceType::ALL {
            let bucket: Vec<_> = model.surfaces_of(t).collect();
            surfaces.insert(t.bucket().to_string(), to_value(&bucket)?);
        }
        let mut openings = Map::new();
        for t in OpeningType::ALL {
            let bucket: Vec<_> = model.openings_of(t).collect();
            openings.insert(t.bucket().to_string(), to_value(&bucket)?);
        }

        let document = json!({
            "schema_version": SCHEMA_VERSION,
            "project": to_value(&model.project)?,
            "geometry": {
                "zone_groups": to_value(&model.zone_groups)?,
                "zones": to_value(&model.zones)?,
                "surfaces": surfaces,
                "openings": openings,
            },
            "catalogs": {
                "window_types": to_value(&model.window_types)?,
                "construction_types": to_value(&model.constructions)?,
                "materials": to_value(&model.materials)?,
                "du_types": to_value(&model.du_types)?,
            },
            "systems": {
                "hvac": to_value(&model.hvac_systems)?,
                "dhw": to_value(&model.dhw_systems)?,
                "pv": to_value(&model.pv_arrays)?,
                "iaq_fans": to_value(&model.iaq_fans)?,
            },
            "diagnostics": to_value(&model.diagnostics)?,
            "id_registry": to_value(&ctx.export_registry())?,
        });

        let text = serde_json::to_string_pretty(&document)
            .map_err(|e| TranslateError::Serialize(e.to_string()))?;
        Ok(Serialized {
            text,
            diagnostics: Vec::new(),
        })
    }
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> TranslateResult<Value> {
    serde_json::to_value(value).map_err(|e| TranslateError::Serialize(e.to_string()))
}

struct Reader<'c> {
    ctx: &'c mut TranslationContext,
    diagnostics: Vec<Diagnostic>,
}

impl Reader<'_> {
    fn read(&mut self, root: &Value, object: &Map<String, Value>) -> Parsed {
        if let Err(errors) = validate_emjson_document(root) {
            for error in errors {
                self.diagnostics.push(
                    Diagnostic::warning("W-SCHEMA", format!("schema violation: {}", error))
                        .with_context("error", error),
                );
            }
        }

        self.import_registry(object.get("id_registry"));

        let mut model = CanonicalModel::new();
        model.project = self.project(object.get("project"));

        let geometry = object.get("geometry");
        let catalogs = object.get("catalogs");
        let systems = object.get("systems");

        model.materials = self.entities(catalogs, "catalogs.materials", EntityKind::Material);
        model.constructions = self.entities(catalogs, "catalogs.construction_types", EntityKind::Construction);
        model.window_types = self.entities(catalogs, "catalogs.window_types", EntityKind::WindowType);
        model.du_types = self.entities(catalogs, "catalogs.du_types", EntityKind::DuType);

        model.zone_groups = self.entities(geometry, "geometry.zone_groups", EntityKind::ZoneGroup);
        model.zones = self.entities(geometry, "geometry.zones", EntityKind::Zone);

        let surfaces = geometry.and_then(|g| g.get("surfaces"));
        for t in SurfaceType::ALL {
            let path = format!("geometry.surfaces.{}", t.bucket());
            let mut bucket: Vec<Surface> = self.entities(surfaces, &path, EntityKind::Surface);
            for surface in &mut bucket {
                surface.surface_type = t;
            }
            model.surfaces.extend(bucket);
        }

        let openings = geometry.and_then(|g| g.get("openings"));
        for t in OpeningType::ALL {
            let path = format!("geometry.openings.{}", t.bucket());
            let mut bucket: Vec<Opening> = self.entities(openings, &path, EntityKind::Opening);
            for opening in &mut bucket {
                opening.opening_type = t;
            }
            model.openings.extend(bucket);
        }

        model.hvac_systems = self.entities(systems, "systems.hvac", EntityKind::Hvac);
        model.dhw_systems = self.entities(systems, "systems.dhw", EntityKind::Dhw);
        model.iaq_fans = self.entities(systems, "systems.iaq_fans", EntityKind::IaqFan);
        model.pv_arrays = self.entities(systems, "systems.pv", EntityKind::PvArray);

        model.link_zone_surfaces();

        let mut diagnostics = map_diagnostics(&model);
        diagnostics.append(&mut self.diagnostics);
        Parsed {
            model,
            diagnostics,
            heat_pumps: Vec::new(),
        }
    }

    fn import_registry(&mut self, value: Option<&Value>) {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return;
        };
        let imported = serde_json::from_value::<RegistryExport>(value.clone())
            .map_err(|e| e.to_string())
            .and_then(|export| self.ctx.import_registry(export).map_err(|e| e.to_string()));
        if let Err(error) = imported {
            self.diagnostics.push(
                Diagnostic::warning(
                    "W-EMJSON-REGISTRY",
                    format!("embedded id registry ignored: {}", error),
                )
                .with_context("error", error),
            );
        }
    }

    fn project(&mut self, value: Option<&Value>) -> Project {
        let mut project = match value {
            Some(value) => serde_json::from_value::<Project>(value.clone()).unwrap_or_else(|e| {
                self.diagnostics.push(
                    Diagnostic::warning("W-EMJSON-ENTITY", format!("project ignored: {}", e))
                        .with_context("path", "project"),
                );
                Project::default()
            }),
            None => Project::default(),
        };
        if project.model_info.source_format.is_none() {
            project.model_info.source_format = Some(FORMAT.to_string());
        }
        project
    }

    /// Deserialize each entity of `section[last path segment]` on its own.
    fn entities<T: DeserializeOwned>(&mut self, section: Option<&Value>, path: &str, kind: EntityKind) -> Vec<T> {
        let key = path.rsplit('.').next().unwrap_or(path);
        let Some(items) = section.and_then(|s| s.get(key)).and_then(Value::as_array) else {
            return Vec::new();
        };

        let mut entities = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let position = format!("{}#{}", path, index);
            let Some(object) = item.as_object() else {
                self.skip(kind, &position, "not an object".to_string());
                continue;
            };

            let mut object = object.clone();
            let name = object
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match object.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) {
                Some(id) => {
                    let id = id.to_string();
                    self.claim(kind, &id, &name, &position);
                }
                None => {
                    let id = self.ctx.generate_id(kind.prefix(), &name, &position, FORMAT);
                    object.insert("id".to_string(), Value::String(id));
                }
            }

            match serde_json::from_value::<T>(Value::Object(object)) {
                Ok(entity) => entities.push(entity),
                Err(e) => self.skip(kind, &position, e.to_string()),
            }
        }
        entities
    }

    /// Register a document id. An id already recorded for a differently
    /// named object is kept and reported.
    fn claim(&mut self, kind: EntityKind, id: &str, name: &str, position: &str) {
        if self.ctx.claim(id, name, position, FORMAT) {
            return;
        }
        let Some(origin) = self.ctx.origin(id) else {
            return;
        };
        // Same object seen under another context, e.g. an XML source.
        if origin.source_id.is_empty() || name.is_empty() || origin.source_id == name {
            return;
        }
        self.diagnostics.push(
            Diagnostic::warning(
                "W-ID-CONFLICT",
                format!(
                    "{} id '{}' on '{}' is registered to '{}' from {}",
                    kind.label(),
                    id,
                    name,
                    origin.source_id,
                    origin.source_format
                ),
            )
            .with_context("id", id)
            .with_context("path", position)
            .with_context("name", name)
            .with_context("registered_source_id", origin.source_id.as_str())
            .with_context("registered_context", origin.context.as_str())
            .with_context("registered_format", origin.source_format.as_str()),
        );
    }

    fn skip(&mut self, kind: EntityKind, position: &str, reason: String) {
        self.diagnostics.push(
            Diagnostic::warning(
                "W-EMJSON-ENTITY",
                format!("{} at {} skipped: {}", kind.label(), position, reason),
            )
            .with_context("path", position)
            .with_context("error", reason),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Adjacency, Zone};
    use crate::registry::IdRegistry;

    fn sample() -> CanonicalModel {
        let mut model = CanonicalModel::new();
        model.project.name = Some("Sample".into());
        let mut zone = Zone::new("Z-1", "Living");
        zone.floor_area_m2 = Some(92.903);
        model.zones.push(zone);
        let mut wall = Surface::new("S-1", "Z-1", SurfaceType::Wall);
        wall.area_m2 = Some(9.2903);
        model.surfaces.push(wall);
        let mut floor = Surface::new("S-2", "Z-1", SurfaceType::Floor);
        floor.adjacency = Adjacency::Ground;
        model.surfaces.push(floor);
        let mut skylight = Opening::new("O-1", "S-1", OpeningType::Skylight);
        skylight.shgc = Some(0.4);
        model.openings.push(skylight);
        model.link_zone_surfaces();
        model
    }

    fn parse(text: &str) -> Parsed {
        let mut ctx = TranslationContext::default();
        EmJsonAdapter::new().parse(text, &mut ctx).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_buckets() {
        let model = sample();
        let mut ctx = TranslationContext::default();
        let out = EmJsonAdapter::new().serialize(&model, &mut ctx).unwrap();

        let doc: Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(doc["schema_version"], "6.0");
        assert_eq!(doc["geometry"]["surfaces"]["floors"][0]["adjacency"], "ground");
        assert!(doc["id_registry"]["forward_map"].is_object());

        let back = parse(&out.text);
        assert_eq!(back.model.counts(), model.counts());
        assert_eq!(back.model.surfaces[1].surface_type, SurfaceType::Floor);
        assert_eq!(back.model.openings[0].opening_type, OpeningType::Skylight);
        assert_eq!(back.model.zones[0].surface_ids, vec!["S-1", "S-2"]);
        assert!(back.diagnostics.iter().all(|d| d.code != "W-SCHEMA"));
    }

    #[test]
    fn test_missing_ids_are_generated() {
        let text = r#"{
            "schema_version": "6.0",
            "geometry": {
                "zones": [{ "name": "Den" }],
                "surfaces": { "walls": [{ "id": "S-1", "zone_id": "Z-1" }] }
            }
        }"#;
        let a = parse(text);
        let b = parse(text);
        let id = &a.model.zones[0].id;
        assert!(id.starts_with("Z-"));
        assert!(id.ends_with("-den"));
        assert_eq!(id, &b.model.zones[0].id);
        assert!(a.diagnostics.iter().any(|d| d.code == "W-SCHEMA"));
    }

    #[test]
    fn test_malformed_entity_is_skipped() {
        let text = r#"{
            "schema_version": "6.0",
            "geometry": {
                "zones": [{ "id": "Z-1", "multiplier": "two" }, { "id": "Z-2" }]
            }
        }"#;
        let parsed = parse(text);
        assert_eq!(parsed.model.zones.len(), 1);
        assert_eq!(parsed.model.zones[0].id, "Z-2");
        let skipped: Vec<&Diagnostic> = parsed
            .diagnostics
            .iter()
            .filter(|d| d.code == "W-EMJSON-ENTITY")
            .collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].context["path"], "geometry.zones#0");
    }

    #[test]
    fn test_non_object_root_is_malformed() {
        let mut ctx = TranslationContext::default();
        let err = EmJsonAdapter::new().parse("[1, 2]", &mut ctx).unwrap_err();
        assert!(matches!(err, DocumentError::Malformed { .. }));
    }

    #[test]
    fn test_embedded_registry_is_imported() {
        let mut registry = IdRegistry::new();
        let id = registry.generate_id("Z", "Living", "", "CIBD22X");
        let export = serde_json::to_value(registry.export()).unwrap();
        let text = json!({
            "schema_version": "6.0",
            "geometry": { "zones": [{ "id": id, "name": "Living" }] },
            "id_registry": export,
        })
        .to_string();

        let mut ctx = TranslationContext::default();
        EmJsonAdapter::new().parse(&text, &mut ctx).unwrap();
        assert_eq!(ctx.generate_id("Z", "Living", "", "CIBD22X"), id);
    }

    #[test]
    fn test_id_owned_by_another_object_is_reported() {
        let mut registry = IdRegistry::new();
        assert!(registry.claim("Z-custom", "Living", "", "CIBD22X"));
        let text = json!({
            "schema_version": "6.0",
            "geometry": { "zones": [{ "id": "Z-custom", "name": "Kitchen" }] },
            "id_registry": serde_json::to_value(registry.export()).unwrap(),
        })
        .to_string();

        let parsed = parse(&text);
        assert_eq!(parsed.model.zones[0].id, "Z-custom");
        let conflicts: Vec<&Diagnostic> = parsed
            .diagnostics
            .iter()
            .filter(|d| d.code == "W-ID-CONFLICT")
            .collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].context["id"], "Z-custom");
        assert_eq!(conflicts[0].context["registered_source_id"], "Living");
        assert_eq!(conflicts[0].context["name"], "Kitchen");
    }

    #[test]
    fn test_reread_of_own_output_has_no_conflicts() {
        let mut registry = IdRegistry::new();
        let id = registry.generate_id("Z", "Living", "", "CIBD22X");
        let mut model = CanonicalModel::new();
        model.zones.push(Zone::new(id.as_str(), "Living"));

        let mut ctx = TranslationContext::with_registry(registry, Default::default());
        let out = EmJsonAdapter::new().serialize(&model, &mut ctx).unwrap();
        let back = parse(&out.text);
        assert_eq!(back.model.zones[0].id, id);
        assert!(back.diagnostics.iter().all(|d| d.code != "W-ID-CONFLICT"));
    }

    #[test]
    fn test_source_format_defaults_to_emjson() {
        let parsed = parse(r#"{ "schema_version": "6.0", "geometry": {} }"#);
        assert_eq!(parsed.model.project.model_info.source_format.as_deref(), Some("EMJSON"));
        assert_eq!(parsed.diagnostics[0].code, "I-MAP-ZONES");
    }
}
