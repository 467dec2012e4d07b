//! XML document -> canonical model.
//!
//! Entities are discovered by tag anywhere under the root, so the same code
//! reads nested and flat layouts: a parent is the nearest enclosing entity
//! element of the right kind, or else the entity named by a reference field.

use roxmltree::{Document, Node, NodeId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::enrich::HeatPumpRecord;
use crate::formats::dialect::{DialectConfig, TagRule};
use crate::formats::extract::{read_alias, FieldReader};
use crate::formats::{map_diagnostics, Parsed};
use crate::models::{
    Adjacency, Annotation, BuildingType, CanonicalModel, Construction, Diagnostic, DhwSystem,
    DuType, EntityKind, HeatPumpDetails, HvacSystem, IaqFan, Material, ModelInfo, Opening,
    OpeningType, PvArray, Surface, SurfaceType, WindowType, Zone, ZoneGroup,
};
use crate::parser::{attribute, element_children, is_leaf, local_name, text};
use crate::translate::TranslationContext;

/// Attribute holding a source-local identifier, indexed for references.
const SOURCE_ID_ATTR: &str = "id";

/// `PREFIX-<8 hex>` optionally followed by `-slug`, as written by this engine.
pub(super) fn is_canonical_id(prefix: &str, id: &str) -> bool {
    let Some(rest) = id.strip_prefix(prefix).and_then(|r| r.strip_prefix('-')) else {
        return false;
    };
    match (rest.get(..8), rest.get(8..)) {
        (Some(hash), Some(tail)) => {
            hash.chars().all(|c| c.is_ascii_hexdigit()) && (tail.is_empty() || tail.starts_with('-'))
        }
        _ => false,
    }
}

/// Entity elements of one kind in document order, with their tag rule.
///
/// A leaf element carrying only text is a reference or a value, never an
/// entity, even when its tag is also an entity tag.
fn elements<'a, 'input, 'c>(
    cfg: &'c DialectConfig,
    doc: &'a Document<'input>,
    kind: EntityKind,
) -> Vec<(Node<'a, 'input>, &'c TagRule)> {
    doc.descendants()
        .filter(|n| n.is_element())
        .filter(|n| !(is_leaf(*n) && text(*n).is_some() && n.attributes().next().is_none()))
        .filter_map(|n| cfg.rule_for_tag(kind, local_name(n)).map(|rule| (n, rule)))
        .collect()
}

#[derive(Debug, Default)]
struct Index {
    by_name: HashMap<String, String>,
    by_source_id: HashMap<String, String>,
    ids: HashSet<String>,
}

struct Reader<'c, 'x> {
    cfg: &'c DialectConfig,
    ctx: &'x mut TranslationContext,
    fields: FieldReader<'c>,
    format: &'static str,
    model: CanonicalModel,
    diagnostics: Vec<Diagnostic>,
    heat_pumps: Vec<HeatPumpRecord>,
    indexes: HashMap<EntityKind, Index>,
    nodes: HashMap<NodeId, (EntityKind, String)>,
    /// Canonical id -> source name, for the contexts of child entities.
    source_names: HashMap<String, String>,
    seen_names: HashMap<(EntityKind, String, String), usize>,
    positions: HashMap<String, usize>,
}

/// Read a whole document.
pub(crate) fn read(cfg: &DialectConfig, doc: &Document<'_>, ctx: &mut TranslationContext) -> Parsed {
    let policy = ctx.unit_policy(cfg.default_units);
    let mut reader = Reader {
        cfg,
        ctx,
        fields: FieldReader::new(cfg, policy),
        format: cfg.dialect.as_str(),
        model: CanonicalModel::new(),
        diagnostics: Vec::new(),
        heat_pumps: Vec::new(),
        indexes: HashMap::new(),
        nodes: HashMap::new(),
        source_names: HashMap::new(),
        seen_names: HashMap::new(),
        positions: HashMap::new(),
    };

    let root = doc.root_element();
    let root_tag = local_name(root);
    if root_tag != cfg.root_tag && !cfg.project_tags.iter().any(|t| t == root_tag) {
        reader.diagnostics.push(
            Diagnostic::warning(
                "W-ROOT-TAG",
                format!("root element <{}> is not <{}>; reading anyway", root_tag, cfg.root_tag),
            )
            .with_context("root", root_tag),
        );
    }

    reader.read_project(root);
    reader.read_materials(doc);
    reader.read_constructions(doc);
    reader.read_window_types(doc);
    reader.read_du_types(doc);
    reader.read_zone_groups(doc);
    reader.read_zones(doc);
    reader.read_surfaces(doc);
    reader.read_openings(doc);
    reader.read_hvac(doc);
    reader.read_dhw(doc);
    reader.read_iaq_fans(doc);
    reader.read_pv(doc);
    reader.read_heat_pumps(doc);
    reader.finish()
}

impl<'c, 'x> Reader<'c, 'x> {
    fn finish(self) -> Parsed {
        let Reader {
            mut model,
            diagnostics,
            fields,
            heat_pumps,
            ..
        } = self;
        model.link_zone_surfaces();

        let mut all = map_diagnostics(&model);
        all.extend(diagnostics);
        all.extend(fields.finish());
        Parsed {
            model,
            diagnostics: all,
            heat_pumps,
        }
    }

    // -------------------------------------------------------------------------
    // Identity and references
    // -------------------------------------------------------------------------

    fn name_of(&self, node: Node<'_, '_>) -> Option<String> {
        self.cfg
            .name
            .iter()
            .find_map(|alias| read_alias(node, alias, self.cfg).into_iter().next())
            .map(|v| v.text)
    }

    /// Canonical id and source name for an entity element.
    fn identify(&mut self, kind: EntityKind, node: Node<'_, '_>, base_context: &str) -> (String, String) {
        let tag = local_name(node);
        let name = self.name_of(node).unwrap_or_default();

        let (source_id, context) = if name.is_empty() {
            let position = self.positions.entry(tag.to_string()).or_insert(0);
            let context = format!("{}#{}", tag, position);
            *position += 1;
            (String::new(), context)
        } else {
            let seen = self
                .seen_names
                .entry((kind, base_context.to_string(), name.clone()))
                .or_insert(0);
            *seen += 1;
            if *seen > 1 {
                let n = *seen;
                self.diagnostics.push(
                    Diagnostic::warning(
                        "W-NAME-DUPLICATE",
                        format!("{} name '{}' is used more than once", kind.label(), name),
                    )
                    .with_context("kind", kind.label())
                    .with_context("name", name.as_str())
                    .with_context("occurrence", n),
                );
                (name.clone(), format!("{}/dup#{}", base_context, n))
            } else {
                (name.clone(), base_context.to_string())
            }
        };

        let carried = attribute(node, SOURCE_ID_ATTR)
            .map(str::trim)
            .filter(|id| is_canonical_id(kind.prefix(), id))
            .map(str::to_string);
        let id = match carried {
            Some(id) if self.ctx.claim(&id, &source_id, &context, self.format) => id,
            _ => self
                .ctx
                .generate_id(kind.prefix(), &source_id, &context, self.format),
        };

        let index = self.indexes.entry(kind).or_default();
        if !name.is_empty() {
            index.by_name.entry(name.clone()).or_insert_with(|| id.clone());
        }
        if let Some(source) = attribute(node, SOURCE_ID_ATTR).map(str::trim).filter(|s| !s.is_empty()) {
            index.by_source_id.entry(source.to_string()).or_insert_with(|| id.clone());
        }
        index.ids.insert(id.clone());
        self.nodes.insert(node.id(), (kind, id.clone()));
        self.source_names.insert(id.clone(), name.clone());
        (id, name)
    }

    fn lookup(&self, kind: EntityKind, raw: &str) -> Option<String> {
        let raw = raw.trim();
        let index = self.indexes.get(&kind)?;
        index
            .by_name
            .get(raw)
            .or_else(|| index.by_source_id.get(raw))
            .cloned()
            .or_else(|| index.ids.contains(raw).then(|| raw.to_string()))
    }

    /// Canonical id for a source reference; the raw value when unresolved.
    fn resolve(&mut self, kind: EntityKind, raw: &str, owner: &str) -> String {
        match self.lookup(kind, raw) {
            Some(id) => id,
            None => {
                self.diagnostics.push(
                    Diagnostic::warning(
                        "W-REF-UNRESOLVED",
                        format!("'{}' references unknown {} '{}'", owner, kind.label(), raw.trim()),
                    )
                    .with_context("kind", kind.label())
                    .with_context("reference", raw.trim())
                    .with_context("owner", owner),
                );
                raw.trim().to_string()
            }
        }
    }

    fn reference(
        &mut self,
        owner_kind: EntityKind,
        node: Node<'_, '_>,
        field: &str,
        target: EntityKind,
        owner: &str,
    ) -> Option<String> {
        let raw = self.fields.text(owner_kind, node, field)?;
        Some(self.resolve(target, &raw, owner))
    }

    fn references(
        &mut self,
        owner_kind: EntityKind,
        node: Node<'_, '_>,
        field: &str,
        target: EntityKind,
        owner: &str,
    ) -> Vec<String> {
        self.fields
            .all(owner_kind, node, field)
            .into_iter()
            .map(|raw| self.resolve(target, &raw, owner))
            .collect()
    }

    /// Nearest enclosing entity element of this kind.
    fn enclosing(&self, node: Node<'_, '_>, kind: EntityKind) -> Option<String> {
        node.ancestors().skip(1).find_map(|a| match self.nodes.get(&a.id()) {
            Some((k, id)) if *k == kind => Some(id.clone()),
            _ => None,
        })
    }

    fn source_name(&self, id: &str) -> String {
        self.source_names
            .get(id)
            .filter(|n| !n.is_empty())
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn label(name: &str, node: Node<'_, '_>) -> String {
        if name.is_empty() {
            local_name(node).to_string()
        } else {
            name.to_string()
        }
    }

    fn is_entity_tag(&self, tag: &str) -> bool {
        self.cfg
            .entities
            .values()
            .any(|e| e.tags.iter().any(|r| r.tag == tag))
    }

    /// Unconsumed attributes and text children, plus the source tag.
    fn annotation(&self, kind: EntityKind, node: Node<'_, '_>) -> Annotation {
        let consumed = self.cfg.consumed_names(kind);
        let mut annotation = Annotation::new();
        annotation.insert("xml_tag".into(), Value::String(local_name(node).to_string()));

        for attr in node.attributes() {
            if !consumed.contains(attr.name()) {
                annotation
                    .entry(format!("@{}", attr.name()))
                    .or_insert_with(|| Value::String(attr.value().to_string()));
            }
        }
        for child in element_children(node).filter(|c| is_leaf(*c)) {
            let tag = local_name(child);
            if consumed.contains(tag) || self.is_entity_tag(tag) {
                continue;
            }
            if let Some(value) = text(child) {
                annotation
                    .entry(tag.to_string())
                    .or_insert_with(|| Value::String(value.to_string()));
            }
        }
        annotation
    }

    // -------------------------------------------------------------------------
    // Project
    // -------------------------------------------------------------------------

    fn read_project(&mut self, root: Node<'_, '_>) {
        let kind = EntityKind::Project;
        let tags = &self.cfg.project_tags;
        let node = if tags.iter().any(|t| t == local_name(root)) {
            root
        } else {
            root.descendants()
                .filter(|n| n.is_element())
                .find(|n| tags.iter().any(|t| t == local_name(*n)))
                .unwrap_or(root)
        };

        let name = self.name_of(node);
        let label = name.clone().unwrap_or_else(|| "project".to_string());
        let project = &mut self.model.project;
        project.name = name;
        project.model_info = ModelInfo {
            source_format: Some(self.format.to_string()),
            ruleset: self.fields.text(kind, node, "ruleset"),
            software_version: self.fields.text(kind, node, "software_version"),
            translator_version: Some(format!("ecotools {}", env!("CARGO_PKG_VERSION"))),
            ..ModelInfo::default()
        };

        let location = &mut project.location;
        location.city = self.fields.text(kind, node, "city");
        location.state = self.fields.text(kind, node, "state");
        location.zip_code = self.fields.text(kind, node, "zip_code");
        location.climate_zone = self.fields.text(kind, node, "climate_zone");
        location.latitude = self.fields.number(kind, node, "latitude", &label);
        location.longitude = self.fields.number(kind, node, "longitude", &label);
        location.elevation_m = self.fields.number(kind, node, "elevation", &label);

        if location.zip_code.is_none() {
            self.diagnostics.push(Diagnostic::warning(
                "W-LOC-NOZIP",
                "project location has no zip code",
            ));
        }
    }

    // -------------------------------------------------------------------------
    // Catalogs
    // -------------------------------------------------------------------------

    fn read_materials(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::Material;
        for (node, _) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);
            let material = Material {
                material_type: self.fields.text(kind, node, "material_type"),
                thickness_m: self.fields.number(kind, node, "thickness", &label),
                r_value_si: self.fields.number(kind, node, "r_value", &label),
                density_kg_m3: self.fields.number(kind, node, "density", &label),
                specific_heat_j_kgk: self.fields.number(kind, node, "specific_heat", &label),
                annotation: self.annotation(kind, node),
                id,
                name,
            };
            self.model.materials.push(material);
        }
    }

    fn read_constructions(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::Construction;
        for (node, _) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);
            let construction = Construction {
                construction_type: self.fields.text(kind, node, "construction_type"),
                u_factor_si: self.fields.number(kind, node, "u_factor", &label),
                r_value_si: self.fields.number(kind, node, "r_value", &label),
                material_refs: self.references(kind, node, "material_refs", EntityKind::Material, &label),
                annotation: self.annotation(kind, node),
                id,
                name,
            };
            self.model.constructions.push(construction);
        }
    }

    fn read_window_types(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::WindowType;
        for (node, rule) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);
            let window_type = WindowType {
                fenestration_type: rule
                    .kind
                    .as_deref()
                    .and_then(OpeningType::from_kind)
                    .unwrap_or_default(),
                u_factor_si: self.fields.number(kind, node, "u_factor", &label),
                shgc: self.fields.number(kind, node, "shgc", &label),
                vt: self.fields.number(kind, node, "vt", &label),
                frame_type: self.fields.text(kind, node, "frame_type"),
                num_panes: self.fields.count(kind, node, "num_panes", &label),
                gas_fill: self.fields.text(kind, node, "gas_fill"),
                annotation: self.annotation(kind, node),
                id,
                name,
            };
            self.model.window_types.push(window_type);
        }
    }

    fn read_du_types(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::DuType;
        for (node, _) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);
            let du_type = DuType {
                floor_area_m2: self.fields.number(kind, node, "floor_area", &label),
                bedrooms: self.fields.count(kind, node, "bedrooms", &label),
                annotation: self.annotation(kind, node),
                id,
                name,
            };
            self.model.du_types.push(du_type);
        }
    }

    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------

    fn read_zone_groups(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::ZoneGroup;
        for (node, _) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);
            let group = ZoneGroup {
                group_type: self.fields.text(kind, node, "group_type"),
                floor_to_floor_height_m: self.fields.number(kind, node, "floor_to_floor_height", &label),
                floor_to_ceiling_height_m: self.fields.number(kind, node, "floor_to_ceiling_height", &label),
                zone_refs: Vec::new(),
                annotation: self.annotation(kind, node),
                id,
                name,
            };
            self.model.zone_groups.push(group);
        }
    }

    fn read_zones(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::Zone;
        for (node, rule) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);

            let mut zone = Zone::new(id.clone(), name);
            zone.building_type = rule
                .kind
                .as_deref()
                .and_then(BuildingType::from_kind)
                .unwrap_or_default();
            zone.multiplier = self.fields.integer(kind, node, "multiplier", &label).unwrap_or(1);
            zone.floor_area_m2 = self.fields.number(kind, node, "floor_area", &label);
            zone.volume_m3 = self.fields.number(kind, node, "volume", &label);
            zone.du_type_ref = self.reference(kind, node, "du_type_ref", EntityKind::DuType, &label);
            zone.annotation = self.annotation(kind, node);

            let group = self.enclosing(node, EntityKind::ZoneGroup).or_else(|| {
                self.reference(kind, node, "zone_group_ref", EntityKind::ZoneGroup, &label)
            });
            if let Some(group) = group.and_then(|g| self.model.zone_groups.iter_mut().find(|z| z.id == g)) {
                group.zone_refs.push(id);
            }
            self.model.zones.push(zone);
        }
    }

    fn read_surfaces(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::Surface;
        for (node, rule) in elements(self.cfg, doc, kind) {
            let provisional = self.name_of(node).unwrap_or_default();
            let provisional = Self::label(&provisional, node);

            let zone_id = self
                .enclosing(node, EntityKind::Zone)
                .or_else(|| self.reference(kind, node, "zone_ref", EntityKind::Zone, &provisional));
            let Some(zone_id) = zone_id else {
                self.diagnostics.push(
                    Diagnostic::warning(
                        "W-SURF-NOZONE",
                        format!("surface '{}' has no zone and was skipped", provisional),
                    )
                    .with_context("surface", provisional.as_str()),
                );
                continue;
            };

            let zone_name = self.source_name(&zone_id);
            let (id, name) = self.identify(kind, node, &zone_name);
            let label = Self::label(&name, node);

            let surface_type = rule
                .kind
                .as_deref()
                .and_then(SurfaceType::from_kind)
                .unwrap_or_default();
            let mut surface = Surface::new(id.clone(), zone_id.clone(), surface_type);
            surface.name = name;
            surface.adjacency = rule
                .adjacency
                .as_deref()
                .and_then(Adjacency::classify)
                .unwrap_or_default();
            if let Some(raw) = self.fields.text(kind, node, "adjacency") {
                match Adjacency::classify(&raw) {
                    Some(adjacency) => surface.adjacency = adjacency,
                    None => self.diagnostics.push(
                        Diagnostic::warning(
                            "W-FIELD-PARSE",
                            format!("surface '{}': adjacency '{}' not recognised", label, raw),
                        )
                        .with_context("field", "adjacency")
                        .with_context("value", raw),
                    ),
                }
            }
            if let Some(adjacent) = self.reference(kind, node, "adjacent_zone_ref", EntityKind::Zone, &label) {
                surface.adjacency = Adjacency::Zone(adjacent);
            }
            surface.area_m2 = self.fields.number(kind, node, "area", &label);
            surface.tilt_deg = self.fields.number(kind, node, "tilt", &label);
            surface.azimuth_deg = self.fields.number(kind, node, "azimuth", &label);
            surface.construction_ref =
                self.reference(kind, node, "construction_ref", EntityKind::Construction, &label);
            surface.annotation = self.annotation(kind, node);

            if let Some(zone) = self.model.zones.iter_mut().find(|z| z.id == zone_id) {
                zone.surface_ids.push(id);
            }
            self.model.surfaces.push(surface);
        }
    }

    fn read_openings(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::Opening;
        for (node, rule) in elements(self.cfg, doc, kind) {
            let provisional = self.name_of(node).unwrap_or_default();
            let provisional = Self::label(&provisional, node);

            let parent = self
                .enclosing(node, EntityKind::Surface)
                .or_else(|| self.reference(kind, node, "surface_ref", EntityKind::Surface, &provisional));
            let Some(parent) = parent else {
                self.diagnostics.push(
                    Diagnostic::warning(
                        "W-OPEN-NOPARENT",
                        format!("opening '{}' has no parent surface and was skipped", provisional),
                    )
                    .with_context("opening", provisional.as_str()),
                );
                continue;
            };

            let zone_name = self
                .model
                .surface(&parent)
                .map(|s| s.zone_id.clone())
                .map(|z| self.source_name(&z))
                .unwrap_or_default();
            let context = format!("{}/{}", zone_name, self.source_name(&parent));
            let (id, name) = self.identify(kind, node, &context);
            let label = Self::label(&name, node);

            let opening_type = rule
                .kind
                .as_deref()
                .and_then(OpeningType::from_kind)
                .unwrap_or_default();
            let mut opening = Opening::new(id, parent, opening_type);
            opening.name = name;
            opening.area_m2 = self.fields.number(kind, node, "area", &label);
            opening.width_m = self.fields.number(kind, node, "width", &label);
            opening.height_m = self.fields.number(kind, node, "height", &label);
            opening.u_factor_si = self.fields.number(kind, node, "u_factor", &label);
            opening.shgc = self.fields.number(kind, node, "shgc", &label);
            opening.vt = self.fields.number(kind, node, "vt", &label);
            opening.window_type_ref =
                self.reference(kind, node, "window_type_ref", EntityKind::WindowType, &label);
            opening.annotation = self.annotation(kind, node);
            self.model.openings.push(opening);
        }
    }

    // -------------------------------------------------------------------------
    // Systems
    // -------------------------------------------------------------------------

    fn read_hvac(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::Hvac;
        for (node, _) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);
            let system = HvacSystem {
                system_type: self.fields.text(kind, node, "system_type"),
                fuel: self.fields.text(kind, node, "fuel"),
                heating_capacity_w: self.fields.number(kind, node, "heating_capacity", &label),
                cooling_capacity_w: self.fields.number(kind, node, "cooling_capacity", &label),
                zone_refs: self.references(kind, node, "zone_refs", EntityKind::Zone, &label),
                annotation: self.annotation(kind, node),
                id,
                name,
            };
            self.model.hvac_systems.push(system);
        }
    }

    fn read_dhw(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::Dhw;
        for (node, _) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);
            let system = DhwSystem {
                system_type: self.fields.text(kind, node, "system_type"),
                fuel: self.fields.text(kind, node, "fuel"),
                tank_volume_l: self.fields.number(kind, node, "tank_volume", &label),
                setpoint_c: self.fields.number(kind, node, "setpoint", &label),
                recirc_type: self.fields.text(kind, node, "recirc_type"),
                zone_refs: self.references(kind, node, "zone_refs", EntityKind::Zone, &label),
                hpwh: None,
                annotation: self.annotation(kind, node),
                id,
                name,
            };
            self.model.dhw_systems.push(system);
        }
    }

    fn read_iaq_fans(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::IaqFan;
        for (node, _) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);
            let fan = IaqFan {
                fan_type: self.fields.text(kind, node, "fan_type"),
                airflow_m3_per_h: self.fields.number(kind, node, "airflow", &label),
                power_w: self.fields.number(kind, node, "power", &label),
                zone_refs: self.references(kind, node, "zone_refs", EntityKind::Zone, &label),
                annotation: self.annotation(kind, node),
                id,
                name,
            };
            self.model.iaq_fans.push(fan);
        }
    }

    fn read_pv(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::PvArray;
        for (node, _) in elements(self.cfg, doc, kind) {
            let (id, name) = self.identify(kind, node, "");
            let label = Self::label(&name, node);
            let pv = PvArray {
                rated_capacity_w: self.fields.number(kind, node, "rated_capacity", &label),
                tilt_deg: self.fields.number(kind, node, "tilt", &label),
                azimuth_deg: self.fields.number(kind, node, "azimuth", &label),
                inverter_efficiency: self.fields.number(kind, node, "inverter_efficiency", &label),
                module_count: self.fields.count(kind, node, "module_count", &label),
                annotation: self.annotation(kind, node),
                id,
                name,
            };
            self.model.pv_arrays.push(pv);
        }
    }

    /// HPWH elements become records for the enrichment pass.
    fn read_heat_pumps(&mut self, doc: &Document<'_>) {
        let kind = EntityKind::Hpwh;
        for (node, _) in elements(self.cfg, doc, kind) {
            let name = self.name_of(node).unwrap_or_default();
            let label = Self::label(&name, node);
            let dhw_ref = self
                .fields
                .text(kind, node, "dhw_system_ref")
                .map(|raw| self.lookup(EntityKind::Dhw, &raw).unwrap_or(raw));
            let details = HeatPumpDetails {
                compressor_cop: self.fields.number(kind, node, "compressor_cop", &label),
                airflow_m3_per_h: self.fields.number(kind, node, "airflow", &label),
                tank_volume_l: self.fields.number(kind, node, "tank_volume", &label),
                backup_fuel: self.fields.text(kind, node, "backup_fuel"),
                min_ambient_c: self.fields.number(kind, node, "min_ambient", &label),
                ambient_zone_ref: self.reference(kind, node, "ambient_zone_ref", EntityKind::Zone, &label),
                name,
            };
            self.heat_pumps.push(HeatPumpRecord { dhw_ref, details });
        }
    }
}
