//! Canonical model -> XML document.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::formats::dialect::{DialectConfig, Layout};
use crate::formats::Serialized;
use crate::models::{Annotation, CanonicalModel, Diagnostic, EntityKind};
use crate::units::{explicit_unit_label, from_si, Quantity};

// =============================================================================
// Element tree
// =============================================================================

/// Minimal owned XML element used to build output documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set or replace an attribute.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Append a child and return it.
    pub fn push(&mut self, child: XmlElement) -> &mut XmlElement {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// First child with this name, created when missing.
    pub fn child_mut(&mut self, name: &str) -> &mut XmlElement {
        match self.children.iter().position(|c| c.name == name) {
            Some(index) => &mut self.children[index],
            None => self.push(XmlElement::new(name)),
        }
    }

    /// Document with declaration, two-space indent and a trailing newline.
    pub fn to_document(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attributes {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&escape(v));
            out.push('"');
        }

        match (&self.text, self.children.is_empty()) {
            (None, true) => out.push_str("/>\n"),
            (Some(text), true) => {
                out.push('>');
                out.push_str(&escape(text));
                out.push_str("</");
                out.push_str(&self.name);
                out.push_str(">\n");
            }
            (text, false) => {
                out.push_str(">\n");
                if let Some(text) = text {
                    out.push_str(&indent);
                    out.push_str("  ");
                    out.push_str(&escape(text));
                    out.push('\n');
                }
                for child in &self.children {
                    child.render_into(out, depth + 1);
                }
                out.push_str(&indent);
                out.push_str("</");
                out.push_str(&self.name);
                out.push_str(">\n");
            }
        }
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Whether a string can be used as an element or attribute name.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.to_lowercase().starts_with("xml")
}

/// Six decimals at most, trailing zeros trimmed.
pub fn format_number(value: f64) -> String {
    let formatted = format!("{:.6}", value);
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted.as_str()
    };
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

// =============================================================================
// Model -> tree
// =============================================================================

struct Writer<'c, 'm> {
    cfg: &'c DialectConfig,
    model: &'m CanonicalModel,
    /// Canonical id -> name written for it.
    labels: HashMap<&'m str, &'m str>,
    diagnostics: Vec<Diagnostic>,
    unslotted: BTreeMap<(EntityKind, &'static str), usize>,
}

/// Render a model in this dialect.
pub(crate) fn write(cfg: &DialectConfig, model: &CanonicalModel) -> Serialized {
    let mut writer = Writer {
        cfg,
        model,
        labels: labels(model),
        diagnostics: Vec::new(),
        unslotted: BTreeMap::new(),
    };
    let root = writer.document();
    let mut diagnostics = writer.diagnostics;
    for ((kind, field), count) in writer.unslotted {
        diagnostics.push(
            Diagnostic::info(
                "I-SER-NOSLOT",
                format!(
                    "{} has no slot for {} {} value(s) of '{}'",
                    cfg.dialect,
                    count,
                    kind.label(),
                    field
                ),
            )
            .with_context("kind", kind.label())
            .with_context("field", field)
            .with_context("count", count),
        );
    }
    Serialized {
        text: root.to_document(),
        diagnostics,
    }
}

/// Name each entity is written under: its name, or its id when unnamed.
fn labels(model: &CanonicalModel) -> HashMap<&str, &str> {
    let named = model
        .zone_groups
        .iter()
        .map(|e| (e.id.as_str(), e.name.as_str()))
        .chain(model.zones.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.surfaces.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.openings.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.window_types.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.constructions.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.materials.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.du_types.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.pv_arrays.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.hvac_systems.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.dhw_systems.iter().map(|e| (e.id.as_str(), e.name.as_str())))
        .chain(model.iaq_fans.iter().map(|e| (e.id.as_str(), e.name.as_str())));
    named
        .map(|(id, name)| (id, if name.is_empty() { id } else { name }))
        .collect()
}

impl<'c, 'm> Writer<'c, 'm> {
    fn document(&mut self) -> XmlElement {
        let cfg = self.cfg;
        let root_is_project = cfg.project_tags.iter().any(|t| *t == cfg.root_tag);
        let project_tag = if root_is_project {
            cfg.root_tag.as_str()
        } else {
            cfg.project_tags.first().map(String::as_str).unwrap_or("Project")
        };

        let mut project = XmlElement::new(project_tag);
        self.project(&mut project);
        project.children.extend(self.catalogs());

        let geometry = self.geometry();
        match cfg.building_tags.first() {
            Some(tag) => {
                let mut building = XmlElement::new(tag.as_str());
                building.children = geometry;
                project.push(building);
            }
            None => project.children.extend(geometry),
        }
        project.children.extend(self.systems());

        if root_is_project {
            return project;
        }
        let mut root = XmlElement::new(cfg.root_tag.as_str());
        root.push(project);
        root
    }

    // -------------------------------------------------------------------------
    // Field slots
    // -------------------------------------------------------------------------

    fn unslotted(&mut self, kind: EntityKind, field: &'static str) {
        *self.unslotted.entry((kind, field)).or_insert(0) += 1;
    }

    /// Write `value` into the first alias of `field`; returns the element
    /// holding it when that is a child element.
    fn put<'e>(
        &mut self,
        element: &'e mut XmlElement,
        kind: EntityKind,
        field: &'static str,
        value: &str,
    ) -> Option<&'e mut XmlElement> {
        let cfg = self.cfg;
        let Some(alias) = cfg.field(kind, field).and_then(|f| f.aliases.first()) else {
            self.unslotted(kind, field);
            return None;
        };

        match (alias.child.as_deref(), alias.attr.as_deref()) {
            (Some(path), attr) => {
                let steps: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                let (last, parents) = steps.split_last()?;
                let mut current = element;
                for step in parents {
                    current = current.child_mut(step);
                }
                match attr {
                    Some(attr) => {
                        let target = current.child_mut(last);
                        target.set_attribute(attr, value);
                        None
                    }
                    None => Some(current.push(XmlElement::with_text(*last, value))),
                }
            }
            (None, Some(attr)) => {
                element.set_attribute(attr, value);
                None
            }
            (None, None) => None,
        }
    }

    fn put_text(&mut self, element: &mut XmlElement, kind: EntityKind, field: &'static str, value: &Option<String>) {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            self.put(element, kind, field, value);
        }
    }

    fn put_number(&mut self, element: &mut XmlElement, kind: EntityKind, field: &'static str, value: Option<f64>) {
        let Some(value) = value else { return };
        let quantity = self
            .cfg
            .field(kind, field)
            .map(|f| f.quantity)
            .unwrap_or(Quantity::Number);
        let system = self.cfg.default_units;
        let written = format_number(from_si(quantity, value, system));
        let unit_attribute = self.cfg.unit_attributes.first().cloned();

        if let Some(target) = self.put(element, kind, field, &written) {
            if let (Some(label), Some(attr)) = (explicit_unit_label(quantity, system), unit_attribute) {
                target.set_attribute(attr, label);
            }
        }
    }

    fn put_count<N: Into<f64>>(&mut self, element: &mut XmlElement, kind: EntityKind, field: &'static str, value: Option<N>) {
        self.put_number(element, kind, field, value.map(Into::into));
    }

    /// Reference as the target's label (nested) or id (flat).
    fn reference(&self, target: &str) -> String {
        match self.cfg.layout {
            Layout::Flat => target.to_string(),
            Layout::Nested => self.labels.get(target).copied().unwrap_or(target).to_string(),
        }
    }

    fn put_ref(&mut self, element: &mut XmlElement, kind: EntityKind, field: &'static str, target: Option<&str>) {
        if let Some(target) = target.filter(|t| !t.is_empty()) {
            let value = self.reference(target);
            self.put(element, kind, field, &value);
        }
    }

    fn put_refs(&mut self, element: &mut XmlElement, kind: EntityKind, field: &'static str, targets: &[String]) {
        for target in targets {
            self.put_ref(element, kind, field, Some(target));
        }
    }

    /// Create the element for one entity with its name and, in flat
    /// layouts or when unnamed, its id. `None` when the dialect has no tag for the kind.
    fn open(
        &mut self,
        kind: EntityKind,
        id: &str,
        name: &str,
        annotation: &Annotation,
        variant: Option<&str>,
        adjacency: Option<&str>,
    ) -> Option<XmlElement> {
        let cfg = self.cfg;
        let preferred = annotation.get("xml_tag").and_then(Value::as_str);
        let Some(tag) = cfg.write_tag(kind, preferred, variant, adjacency) else {
            self.diagnostics.push(
                Diagnostic::warning(
                    "W-SER-DROPPED",
                    format!("{} has no element for {} '{}'", self.cfg.dialect, kind.label(), id),
                )
                .with_context("kind", kind.label())
                .with_context("id", id),
            );
            return None;
        };

        let mut element = XmlElement::new(tag);
        if let Some(alias) = self.cfg.name.first().filter(|_| !name.is_empty()) {
            match (alias.child.as_deref(), alias.attr.as_deref()) {
                (Some(child), None) => {
                    element.push(XmlElement::with_text(child, name));
                }
                (Some(child), Some(attr)) => element.child_mut(child).set_attribute(attr, name),
                (None, Some(attr)) => element.set_attribute(attr, name),
                (None, None) => {}
            }
        }
        // Unnamed entities keep their id so references and re-reads find them.
        if (self.cfg.layout == Layout::Flat || name.is_empty()) && element.attribute("id").is_none() {
            element.set_attribute("id", id);
        }
        Some(element)
    }

    /// Re-emit annotation entries that have no canonical slot.
    fn annotate(&self, element: &mut XmlElement, kind: EntityKind, annotation: &Annotation) {
        let consumed = self.cfg.consumed_names(kind);
        for (key, value) in annotation {
            if key.starts_with("xml_") {
                continue;
            }
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if let Some(attr) = key.strip_prefix('@') {
                if is_xml_name(attr) && !consumed.contains(attr) && element.attribute(attr).is_none() {
                    element.set_attribute(attr, text);
                }
            } else if is_xml_name(key)
                && !consumed.contains(key.as_str())
                && !element.children.iter().any(|c| c.name == *key)
            {
                element.push(XmlElement::with_text(key.as_str(), text));
            }
        }
    }

    fn dropped(&mut self, kind: EntityKind, id: &str, reason: &str) {
        self.diagnostics.push(
            Diagnostic::warning(
                "W-SER-DROPPED",
                format!("{} '{}' was not written: {}", kind.label(), id, reason),
            )
            .with_context("kind", kind.label())
            .with_context("id", id),
        );
    }

    // -------------------------------------------------------------------------
    // Sections
    // -------------------------------------------------------------------------

    fn project(&mut self, element: &mut XmlElement) {
        let kind = EntityKind::Project;
        let model = self.model;
        let project = &model.project;
        if let Some(name) = project.name.as_deref().filter(|n| !n.is_empty()) {
            if let Some(alias) = self.cfg.name.first() {
                match (alias.child.as_deref(), alias.attr.as_deref()) {
                    (Some(child), None) => {
                        element.push(XmlElement::with_text(child, name));
                    }
                    (Some(child), Some(attr)) => element.child_mut(child).set_attribute(attr, name),
                    (None, Some(attr)) => element.set_attribute(attr, name),
                    (None, None) => {}
                }
            }
        }
        self.put_text(element, kind, "ruleset", &project.model_info.ruleset);
        self.put_text(element, kind, "software_version", &project.model_info.software_version);

        let location = &project.location;
        self.put_text(element, kind, "city", &location.city);
        self.put_text(element, kind, "state", &location.state);
        self.put_text(element, kind, "zip_code", &location.zip_code);
        self.put_text(element, kind, "climate_zone", &location.climate_zone);
        self.put_number(element, kind, "latitude", location.latitude);
        self.put_number(element, kind, "longitude", location.longitude);
        self.put_number(element, kind, "elevation", location.elevation_m);
    }

    fn catalogs(&mut self) -> Vec<XmlElement> {
        let model = self.model;
        let mut out = Vec::new();

        let kind = EntityKind::Material;
        for m in &model.materials {
            let Some(mut e) = self.open(kind, &m.id, &m.name, &m.annotation, None, None) else { continue };
            self.put_text(&mut e, kind, "material_type", &m.material_type);
            self.put_number(&mut e, kind, "thickness", m.thickness_m);
            self.put_number(&mut e, kind, "r_value", m.r_value_si);
            self.put_number(&mut e, kind, "density", m.density_kg_m3);
            self.put_number(&mut e, kind, "specific_heat", m.specific_heat_j_kgk);
            self.annotate(&mut e, kind, &m.annotation);
            out.push(e);
        }

        let kind = EntityKind::Construction;
        for c in &model.constructions {
            let Some(mut e) = self.open(kind, &c.id, &c.name, &c.annotation, None, None) else { continue };
            self.put_text(&mut e, kind, "construction_type", &c.construction_type);
            self.put_number(&mut e, kind, "u_factor", c.u_factor_si);
            self.put_number(&mut e, kind, "r_value", c.r_value_si);
            self.put_refs(&mut e, kind, "material_refs", &c.material_refs);
            self.annotate(&mut e, kind, &c.annotation);
            out.push(e);
        }

        let kind = EntityKind::WindowType;
        for w in &model.window_types {
            let variant = Some(w.fenestration_type.as_str());
            let Some(mut e) = self.open(kind, &w.id, &w.name, &w.annotation, variant, None) else { continue };
            self.put_number(&mut e, kind, "u_factor", w.u_factor_si);
            self.put_number(&mut e, kind, "shgc", w.shgc);
            self.put_number(&mut e, kind, "vt", w.vt);
            self.put_text(&mut e, kind, "frame_type", &w.frame_type);
            self.put_count(&mut e, kind, "num_panes", w.num_panes);
            self.put_text(&mut e, kind, "gas_fill", &w.gas_fill);
            self.annotate(&mut e, kind, &w.annotation);
            out.push(e);
        }

        let kind = EntityKind::DuType;
        for d in &model.du_types {
            let Some(mut e) = self.open(kind, &d.id, &d.name, &d.annotation, None, None) else { continue };
            self.put_number(&mut e, kind, "floor_area", d.floor_area_m2);
            self.put_count(&mut e, kind, "bedrooms", d.bedrooms);
            self.annotate(&mut e, kind, &d.annotation);
            out.push(e);
        }
        out
    }

    fn opening_elements(&mut self) -> Vec<(String, XmlElement)> {
        let model = self.model;
        let kind = EntityKind::Opening;
        let mut out = Vec::new();
        for o in &model.openings {
            let variant = Some(o.opening_type.as_str());
            let Some(mut e) = self.open(kind, &o.id, &o.name, &o.annotation, variant, None) else { continue };
            if self.cfg.layout == Layout::Flat {
                self.put_ref(&mut e, kind, "surface_ref", Some(&o.parent_surface_id));
            }
            self.put_number(&mut e, kind, "area", o.area_m2);
            self.put_number(&mut e, kind, "width", o.width_m);
            self.put_number(&mut e, kind, "height", o.height_m);
            self.put_number(&mut e, kind, "u_factor", o.u_factor_si);
            self.put_number(&mut e, kind, "shgc", o.shgc);
            self.put_number(&mut e, kind, "vt", o.vt);
            self.put_ref(&mut e, kind, "window_type_ref", o.window_type_ref.as_deref());
            self.annotate(&mut e, kind, &o.annotation);
            out.push((o.parent_surface_id.clone(), e));
        }
        out
    }

    fn surface_elements(&mut self) -> Vec<(String, String, XmlElement)> {
        let model = self.model;
        let cfg = self.cfg;
        let kind = EntityKind::Surface;
        let mut out = Vec::new();
        for s in &model.surfaces {
            let variant = Some(s.surface_type.as_str());
            let adjacency = s.adjacency.kind();
            let Some(mut e) = self.open(kind, &s.id, &s.name, &s.annotation, variant, Some(adjacency)) else {
                continue;
            };
            if cfg.layout == Layout::Flat {
                self.put_ref(&mut e, kind, "zone_ref", Some(&s.zone_id));
            }
            let implied = cfg
                .rule_for_tag(kind, &e.name)
                .and_then(|r| r.adjacency.as_deref());
            match s.adjacency.zone_id() {
                Some(zone) => self.put_ref(&mut e, kind, "adjacent_zone_ref", Some(zone)),
                None if implied != Some(adjacency) => {
                    self.put(&mut e, kind, "adjacency", adjacency);
                }
                None => {}
            }
            self.put_number(&mut e, kind, "area", s.area_m2);
            self.put_number(&mut e, kind, "tilt", s.tilt_deg);
            self.put_number(&mut e, kind, "azimuth", s.azimuth_deg);
            self.put_ref(&mut e, kind, "construction_ref", s.construction_ref.as_deref());
            self.annotate(&mut e, kind, &s.annotation);
            out.push((s.id.clone(), s.zone_id.clone(), e));
        }
        out
    }

    fn zone_elements(&mut self) -> Vec<(String, XmlElement)> {
        let model = self.model;
        let kind = EntityKind::Zone;
        let mut out = Vec::new();
        for z in &model.zones {
            let variant = Some(z.building_type.as_str());
            let Some(mut e) = self.open(kind, &z.id, &z.name, &z.annotation, variant, None) else { continue };
            if self.cfg.layout == Layout::Flat {
                let group = model
                    .zone_groups
                    .iter()
                    .find(|g| g.zone_refs.iter().any(|r| *r == z.id))
                    .map(|g| g.id.as_str());
                self.put_ref(&mut e, kind, "zone_group_ref", group);
            }
            self.put_number(&mut e, kind, "floor_area", z.floor_area_m2);
            self.put_number(&mut e, kind, "volume", z.volume_m3);
            if z.multiplier != 1 {
                self.put_number(&mut e, kind, "multiplier", Some(z.multiplier as f64));
            }
            self.put_ref(&mut e, kind, "du_type_ref", z.du_type_ref.as_deref());
            self.annotate(&mut e, kind, &z.annotation);
            out.push((z.id.clone(), e));
        }
        out
    }

    fn zone_group_elements(&mut self) -> Vec<(String, XmlElement)> {
        let model = self.model;
        let kind = EntityKind::ZoneGroup;
        let mut out = Vec::new();
        for g in &model.zone_groups {
            let Some(mut e) = self.open(kind, &g.id, &g.name, &g.annotation, None, None) else { continue };
            self.put_text(&mut e, kind, "group_type", &g.group_type);
            self.put_number(&mut e, kind, "floor_to_floor_height", g.floor_to_floor_height_m);
            self.put_number(&mut e, kind, "floor_to_ceiling_height", g.floor_to_ceiling_height_m);
            self.annotate(&mut e, kind, &g.annotation);
            out.push((g.id.clone(), e));
        }
        out
    }

    fn geometry(&mut self) -> Vec<XmlElement> {
        let openings = self.opening_elements();
        let surfaces = self.surface_elements();
        let zones = self.zone_elements();
        let groups = self.zone_group_elements();

        if self.cfg.layout == Layout::Flat {
            return groups
                .into_iter()
                .map(|(_, e)| e)
                .chain(zones.into_iter().map(|(_, e)| e))
                .chain(surfaces.into_iter().map(|(_, _, e)| e))
                .chain(openings.into_iter().map(|(_, e)| e))
                .collect();
        }

        let mut openings_by_surface: HashMap<String, Vec<XmlElement>> = HashMap::new();
        for (parent, e) in openings {
            openings_by_surface.entry(parent).or_default().push(e);
        }

        let mut surfaces_by_zone: HashMap<String, Vec<XmlElement>> = HashMap::new();
        for (id, zone, mut e) in surfaces {
            if let Some(children) = openings_by_surface.remove(&id) {
                e.children.extend(children);
            }
            surfaces_by_zone.entry(zone).or_default().push(e);
        }
        let mut orphans: Vec<&str> = openings_by_surface.keys().map(String::as_str).collect();
        orphans.sort_unstable();
        let orphan_openings: Vec<String> = self
            .model
            .openings
            .iter()
            .filter(|o| orphans.contains(&o.parent_surface_id.as_str()))
            .map(|o| o.id.clone())
            .collect();
        for id in orphan_openings {
            self.dropped(EntityKind::Opening, &id, "parent surface was not written");
        }

        let mut zone_elements: HashMap<String, XmlElement> = HashMap::new();
        let mut zone_order = Vec::new();
        for (id, mut e) in zones {
            if let Some(children) = surfaces_by_zone.remove(&id) {
                e.children.extend(children);
            }
            zone_order.push(id.clone());
            zone_elements.insert(id, e);
        }
        let orphan_surfaces: Vec<String> = self
            .model
            .surfaces
            .iter()
            .filter(|s| surfaces_by_zone.contains_key(&s.zone_id))
            .map(|s| s.id.clone())
            .collect();
        for id in orphan_surfaces {
            self.dropped(EntityKind::Surface, &id, "zone was not written");
        }

        let mut out = Vec::new();
        for (group_id, mut e) in groups {
            let members = self
                .model
                .zone_groups
                .iter()
                .find(|g| g.id == group_id)
                .map(|g| g.zone_refs.clone())
                .unwrap_or_default();
            for member in members {
                if let Some(zone) = zone_elements.remove(&member) {
                    e.children.push(zone);
                }
            }
            out.push(e);
        }
        for id in zone_order {
            if let Some(zone) = zone_elements.remove(&id) {
                out.push(zone);
            }
        }
        out
    }

    fn systems(&mut self) -> Vec<XmlElement> {
        let model = self.model;
        let mut out = Vec::new();

        let kind = EntityKind::Hvac;
        for h in &model.hvac_systems {
            let Some(mut e) = self.open(kind, &h.id, &h.name, &h.annotation, None, None) else { continue };
            self.put_text(&mut e, kind, "system_type", &h.system_type);
            self.put_text(&mut e, kind, "fuel", &h.fuel);
            self.put_number(&mut e, kind, "heating_capacity", h.heating_capacity_w);
            self.put_number(&mut e, kind, "cooling_capacity", h.cooling_capacity_w);
            self.put_refs(&mut e, kind, "zone_refs", &h.zone_refs);
            self.annotate(&mut e, kind, &h.annotation);
            out.push(e);
        }

        let kind = EntityKind::Dhw;
        let mut heat_pumps = Vec::new();
        for d in &model.dhw_systems {
            let Some(mut e) = self.open(kind, &d.id, &d.name, &d.annotation, None, None) else { continue };
            self.put_text(&mut e, kind, "system_type", &d.system_type);
            self.put_text(&mut e, kind, "fuel", &d.fuel);
            self.put_number(&mut e, kind, "tank_volume", d.tank_volume_l);
            self.put_number(&mut e, kind, "setpoint", d.setpoint_c);
            self.put_text(&mut e, kind, "recirc_type", &d.recirc_type);
            self.put_refs(&mut e, kind, "zone_refs", &d.zone_refs);
            self.annotate(&mut e, kind, &d.annotation);
            out.push(e);
            if let Some(hp) = &d.hpwh {
                heat_pumps.push((d.id.as_str(), hp));
            }
        }

        let kind = EntityKind::Hpwh;
        for (dhw_id, hp) in heat_pumps {
            let id = format!("{}-hpwh", dhw_id);
            let Some(mut e) = self.open(kind, &id, &hp.name, &Annotation::new(), None, None) else { continue };
            if self.cfg.layout == Layout::Flat {
                e.attributes.retain(|(k, _)| k != "id");
            }
            self.put_ref(&mut e, kind, "dhw_system_ref", Some(dhw_id));
            self.put_number(&mut e, kind, "compressor_cop", hp.compressor_cop);
            self.put_number(&mut e, kind, "airflow", hp.airflow_m3_per_h);
            self.put_number(&mut e, kind, "tank_volume", hp.tank_volume_l);
            self.put_text(&mut e, kind, "backup_fuel", &hp.backup_fuel);
            self.put_number(&mut e, kind, "min_ambient", hp.min_ambient_c);
            self.put_ref(&mut e, kind, "ambient_zone_ref", hp.ambient_zone_ref.as_deref());
            out.push(e);
        }

        let kind = EntityKind::IaqFan;
        for f in &model.iaq_fans {
            let Some(mut e) = self.open(kind, &f.id, &f.name, &f.annotation, None, None) else { continue };
            self.put_text(&mut e, kind, "fan_type", &f.fan_type);
            self.put_number(&mut e, kind, "airflow", f.airflow_m3_per_h);
            self.put_number(&mut e, kind, "power", f.power_w);
            self.put_refs(&mut e, kind, "zone_refs", &f.zone_refs);
            self.annotate(&mut e, kind, &f.annotation);
            out.push(e);
        }

        let kind = EntityKind::PvArray;
        for p in &model.pv_arrays {
            let Some(mut e) = self.open(kind, &p.id, &p.name, &p.annotation, None, None) else { continue };
            self.put_number(&mut e, kind, "rated_capacity", p.rated_capacity_w);
            self.put_number(&mut e, kind, "tilt", p.tilt_deg);
            self.put_number(&mut e, kind, "azimuth", p.azimuth_deg);
            self.put_number(&mut e, kind, "inverter_efficiency", p.inverter_efficiency);
            self.put_count(&mut e, kind, "module_count", p.module_count);
            self.annotate(&mut e, kind, &p.annotation);
            out.push(e);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_and_render() {
        let mut root = XmlElement::new("Proj");
        root.set_attribute("note", "a \"b\" & c");
        root.push(XmlElement::with_text("Name", "<House>"));
        root.push(XmlElement::new("Empty"));

        let doc = root.to_document();
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(doc.contains("<Proj note=\"a &quot;b&quot; &amp; c\">"));
        assert!(doc.contains("  <Name>&lt;House&gt;</Name>\n"));
        assert!(doc.contains("  <Empty/>\n"));
        assert!(doc.ends_with("</Proj>\n"));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.1234567), "0.123457");
        assert_eq!(format_number(-0.0000001), "0");
    }

    #[test]
    fn test_child_mut_reuses_existing() {
        let mut root = XmlElement::new("Project");
        root.child_mut("Location").set_attribute("city", "Fresno");
        root.child_mut("Location").set_attribute("state", "CA");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].attribute("state"), Some("CA"));
    }

    #[test]
    fn test_xml_names() {
        assert!(is_xml_name("ZnGrpRef"));
        assert!(is_xml_name("_x-1.a"));
        assert!(!is_xml_name("1abc"));
        assert!(!is_xml_name("has space"));
        assert!(!is_xml_name("xml_tag"));
    }
}
