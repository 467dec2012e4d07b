//! Canonical building model shared by every dialect.
//!
//! This module contains the entity graph every adapter produces and consumes:
//!
//! - [`CanonicalModel`] - the root, owning every entity collection
//! - [`Zone`], [`ZoneGroup`], [`Surface`], [`Opening`] - geometry
//! - [`WindowType`], [`Construction`], [`Material`], [`DuType`], [`PvArray`] - catalogs
//! - [`HvacSystem`], [`DhwSystem`], [`IaqFan`] - systems
//! - [`Diagnostic`] - leveled, coded messages accumulated by the pipeline
//!
//! All physical quantities are SI. Entities reference each other by id only;
//! surfaces and openings live in model-wide collections and zones hold the
//! list of their surface ids.

mod diagnostic;

pub use diagnostic::{Diagnostic, DiagnosticLevel};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Dialect-specific fields that have no canonical slot.
pub type Annotation = BTreeMap<String, Value>;

// =============================================================================
// Enumerations
// =============================================================================

/// Occupancy class of a zone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuildingType {
    #[default]
    Residential,
    NonResidential,
    Other,
}

impl BuildingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Residential => "residential",
            Self::NonResidential => "non_residential",
            Self::Other => "other",
        }
    }

    /// Parse from a tag-rule kind or free text.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "residential" | "res" | "mf" => Some(Self::Residential),
            "non_residential" | "nonresidential" | "nr" | "commercial" => {
                Some(Self::NonResidential)
            }
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Surface classification; also the bucket a surface is written to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceType {
    #[default]
    Wall,
    Roof,
    Floor,
}

impl SurfaceType {
    pub const ALL: [SurfaceType; 3] = [Self::Wall, Self::Roof, Self::Floor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wall => "wall",
            Self::Roof => "roof",
            Self::Floor => "floor",
        }
    }

    /// Canonical JSON bucket name.
    pub fn bucket(&self) -> &'static str {
        match self {
            Self::Wall => "walls",
            Self::Roof => "roofs",
            Self::Floor => "floors",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind.trim().to_lowercase().as_str() {
            "wall" | "walls" => Some(Self::Wall),
            "roof" | "roofs" | "ceiling" => Some(Self::Roof),
            "floor" | "floors" | "slab" => Some(Self::Floor),
            _ => None,
        }
    }
}

/// Opening classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OpeningType {
    #[default]
    Window,
    Door,
    Skylight,
}

impl OpeningType {
    pub const ALL: [OpeningType; 3] = [Self::Window, Self::Door, Self::Skylight];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Door => "door",
            Self::Skylight => "skylight",
        }
    }

    pub fn bucket(&self) -> &'static str {
        match self {
            Self::Window => "windows",
            Self::Door => "doors",
            Self::Skylight => "skylights",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind.trim().to_lowercase().as_str() {
            "window" | "windows" => Some(Self::Window),
            "door" | "doors" => Some(Self::Door),
            "skylight" | "skylights" => Some(Self::Skylight),
            _ => None,
        }
    }
}

/// What lies on the other side of a surface.
///
/// Serialized as a plain string: `exterior`, `ground`, `adiabatic` or
/// `zone:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Adjacency {
    #[default]
    Exterior,
    Ground,
    Adiabatic,
    Zone(String),
}

impl Adjacency {
    /// Classify free text from a boundary-condition field.
    ///
    /// Returns `None` when the text carries no recognisable classifier.
    pub fn classify(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();
        if lower.starts_with("zone:") {
            return Some(Self::Zone(trimmed[5..].trim().to_string()));
        }
        if lower.contains("ground") || lower.contains("slab") || lower.contains("underground") {
            Some(Self::Ground)
        } else if lower.contains("adiabatic")
            || lower.contains("interior")
            || lower.contains("party")
            || lower == "int"
        {
            Some(Self::Adiabatic)
        } else if lower.contains("exterior") || lower.contains("outdoor") || lower == "ext" {
            Some(Self::Exterior)
        } else {
            None
        }
    }

    /// Adjacent zone id, if any.
    pub fn zone_id(&self) -> Option<&str> {
        match self {
            Self::Zone(id) => Some(id),
            _ => None,
        }
    }

    /// Classifier without the zone id, used to pick a dialect tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Exterior => "exterior",
            Self::Ground => "ground",
            Self::Adiabatic => "adiabatic",
            Self::Zone(_) => "zone",
        }
    }
}

impl fmt::Display for Adjacency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zone(id) => write!(f, "zone:{}", id),
            other => f.write_str(other.kind()),
        }
    }
}

impl FromStr for Adjacency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::classify(s).ok_or_else(|| format!("unknown adjacency '{}'", s))
    }
}

impl Serialize for Adjacency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Adjacency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Entity kinds, used for id prefixes, diagnostics and dialect tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    ZoneGroup,
    Zone,
    Surface,
    Opening,
    WindowType,
    Construction,
    Material,
    DuType,
    PvArray,
    Hvac,
    Dhw,
    IaqFan,
    Hpwh,
}

impl EntityKind {
    /// Registry prefix for generated ids.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Project => "PRJ",
            Self::ZoneGroup => "ZG",
            Self::Zone => "Z",
            Self::Surface => "S",
            Self::Opening => "O",
            Self::WindowType => "WT",
            Self::Construction => "CONS",
            Self::Material => "MAT",
            Self::DuType => "DU",
            Self::PvArray => "PV",
            Self::Hvac => "HVAC",
            Self::Dhw => "DHW",
            Self::IaqFan => "IAQ",
            Self::Hpwh => "HPWH",
        }
    }

    /// Human label, singular.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::ZoneGroup => "zone group",
            Self::Zone => "zone",
            Self::Surface => "surface",
            Self::Opening => "opening",
            Self::WindowType => "window type",
            Self::Construction => "construction",
            Self::Material => "material",
            Self::DuType => "dwelling unit type",
            Self::PvArray => "PV array",
            Self::Hvac => "HVAC system",
            Self::Dhw => "DHW system",
            Self::IaqFan => "IAQ fan",
            Self::Hpwh => "heat pump water heater",
        }
    }

    /// `"1 zone"`, `"3 zones"`.
    pub fn count_label(&self, n: usize) -> String {
        if n == 1 {
            format!("1 {}", self.label())
        } else {
            format!("{} {}s", n, self.label())
        }
    }

    /// Upper-case token used inside diagnostic codes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Project => "PROJECT",
            Self::ZoneGroup => "ZGRP",
            Self::Zone => "ZONES",
            Self::Surface => "SURFACES",
            Self::Opening => "OPENINGS",
            Self::WindowType => "WINTYPES",
            Self::Construction => "CONSTRUCTIONS",
            Self::Material => "MATERIALS",
            Self::DuType => "DUTYPES",
            Self::PvArray => "PV",
            Self::Hvac => "HVAC",
            Self::Dhw => "DHW",
            Self::IaqFan => "IAQ",
            Self::Hpwh => "HPWH",
        }
    }
}

// =============================================================================
// Project
// =============================================================================

/// Provenance of the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ModelInfo {
    pub source_format: Option<String>,
    pub source_version: Option<String>,
    pub building_type: Option<String>,
    pub ruleset: Option<String>,
    pub software_version: Option<String>,
    pub translator_version: Option<String>,
}

/// Site information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub climate_zone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Project {
    pub name: Option<String>,
    pub model_info: ModelInfo,
    pub location: Location,
}

// =============================================================================
// Geometry
// =============================================================================

fn default_multiplier() -> i64 {
    1
}

/// A thermal zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Zone {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub building_type: BuildingType,
    /// Number of identical zones this one stands for.
    #[serde(default = "default_multiplier")]
    pub multiplier: i64,
    #[serde(default)]
    pub floor_area_m2: Option<f64>,
    #[serde(default)]
    pub volume_m3: Option<f64>,
    #[serde(default)]
    pub du_type_ref: Option<String>,
    /// Ids of the surfaces bounding this zone.
    #[serde(default)]
    pub surface_ids: Vec<String>,
    #[serde(default)]
    pub annotation: Annotation,
}

impl Zone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            building_type: BuildingType::default(),
            multiplier: 1,
            floor_area_m2: None,
            volume_m3: None,
            du_type_ref: None,
            surface_ids: Vec::new(),
            annotation: Annotation::new(),
        }
    }
}

/// Aggregation of zones, e.g. a floor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group_type: Option<String>,
    #[serde(default)]
    pub floor_to_floor_height_m: Option<f64>,
    #[serde(default)]
    pub floor_to_ceiling_height_m: Option<f64>,
    #[serde(default)]
    pub zone_refs: Vec<String>,
    #[serde(default)]
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Surface {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub zone_id: String,
    #[serde(default)]
    pub surface_type: SurfaceType,
    #[serde(default)]
    pub tilt_deg: Option<f64>,
    #[serde(default)]
    pub azimuth_deg: Option<f64>,
    #[serde(default)]
    pub area_m2: Option<f64>,
    #[serde(default)]
    pub adjacency: Adjacency,
    #[serde(default)]
    pub construction_ref: Option<String>,
    #[serde(default)]
    pub annotation: Annotation,
}

impl Surface {
    pub fn new(id: impl Into<String>, zone_id: impl Into<String>, surface_type: SurfaceType) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            zone_id: zone_id.into(),
            surface_type,
            tilt_deg: None,
            azimuth_deg: None,
            area_m2: None,
            adjacency: Adjacency::Exterior,
            construction_ref: None,
            annotation: Annotation::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opening {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub parent_surface_id: String,
    #[serde(default)]
    pub opening_type: OpeningType,
    #[serde(default)]
    pub area_m2: Option<f64>,
    #[serde(default)]
    pub width_m: Option<f64>,
    #[serde(default)]
    pub height_m: Option<f64>,
    /// W/m²K.
    #[serde(default)]
    pub u_factor_si: Option<f64>,
    #[serde(default)]
    pub shgc: Option<f64>,
    #[serde(default)]
    pub vt: Option<f64>,
    #[serde(default)]
    pub window_type_ref: Option<String>,
    #[serde(default)]
    pub annotation: Annotation,
}

impl Opening {
    pub fn new(
        id: impl Into<String>,
        parent_surface_id: impl Into<String>,
        opening_type: OpeningType,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            parent_surface_id: parent_surface_id.into(),
            opening_type,
            area_m2: None,
            width_m: None,
            height_m: None,
            u_factor_si: None,
            shgc: None,
            vt: None,
            window_type_ref: None,
            annotation: Annotation::new(),
        }
    }
}

// =============================================================================
// Catalogs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowType {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fenestration_type: OpeningType,
    #[serde(default)]
    pub u_factor_si: Option<f64>,
    #[serde(default)]
    pub shgc: Option<f64>,
    #[serde(default)]
    pub vt: Option<f64>,
    #[serde(default)]
    pub frame_type: Option<String>,
    #[serde(default)]
    pub num_panes: Option<u32>,
    #[serde(default)]
    pub gas_fill: Option<String>,
    #[serde(default)]
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Construction {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub construction_type: Option<String>,
    #[serde(default)]
    pub u_factor_si: Option<f64>,
    /// m²K/W.
    #[serde(default)]
    pub r_value_si: Option<f64>,
    /// Layers, outside to inside.
    #[serde(default)]
    pub material_refs: Vec<String>,
    #[serde(default)]
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Material {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub material_type: Option<String>,
    #[serde(default)]
    pub thickness_m: Option<f64>,
    #[serde(default)]
    pub r_value_si: Option<f64>,
    #[serde(default)]
    pub density_kg_m3: Option<f64>,
    #[serde(default)]
    pub specific_heat_j_kgk: Option<f64>,
    #[serde(default)]
    pub annotation: Annotation,
}

/// Dwelling unit type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuType {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub floor_area_m2: Option<f64>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PvArray {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rated_capacity_w: Option<f64>,
    #[serde(default)]
    pub tilt_deg: Option<f64>,
    #[serde(default)]
    pub azimuth_deg: Option<f64>,
    #[serde(default)]
    pub inverter_efficiency: Option<f64>,
    #[serde(default)]
    pub module_count: Option<u32>,
    #[serde(default)]
    pub annotation: Annotation,
}

// =============================================================================
// Systems
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HvacSystem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system_type: Option<String>,
    #[serde(default)]
    pub fuel: Option<String>,
    #[serde(default)]
    pub heating_capacity_w: Option<f64>,
    #[serde(default)]
    pub cooling_capacity_w: Option<f64>,
    #[serde(default)]
    pub zone_refs: Vec<String>,
    #[serde(default)]
    pub annotation: Annotation,
}

/// Heat-pump water heater details attached to a DHW system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct HeatPumpDetails {
    pub name: String,
    pub compressor_cop: Option<f64>,
    pub airflow_m3_per_h: Option<f64>,
    pub tank_volume_l: Option<f64>,
    pub backup_fuel: Option<String>,
    pub min_ambient_c: Option<f64>,
    pub ambient_zone_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DhwSystem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub system_type: Option<String>,
    #[serde(default)]
    pub fuel: Option<String>,
    #[serde(default)]
    pub tank_volume_l: Option<f64>,
    #[serde(default)]
    pub setpoint_c: Option<f64>,
    #[serde(default)]
    pub recirc_type: Option<String>,
    #[serde(default)]
    pub zone_refs: Vec<String>,
    #[serde(default)]
    pub hpwh: Option<HeatPumpDetails>,
    #[serde(default)]
    pub annotation: Annotation,
}

/// Indoor air quality ventilation fan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IaqFan {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fan_type: Option<String>,
    #[serde(default)]
    pub airflow_m3_per_h: Option<f64>,
    #[serde(default)]
    pub power_w: Option<f64>,
    #[serde(default)]
    pub zone_refs: Vec<String>,
    #[serde(default)]
    pub annotation: Annotation,
}

// =============================================================================
// Canonical Model
// =============================================================================

/// The in-memory building model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CanonicalModel {
    pub project: Project,
    pub zone_groups: Vec<ZoneGroup>,
    pub zones: Vec<Zone>,
    pub surfaces: Vec<Surface>,
    pub openings: Vec<Opening>,
    pub window_types: Vec<WindowType>,
    pub constructions: Vec<Construction>,
    pub materials: Vec<Material>,
    pub du_types: Vec<DuType>,
    pub pv_arrays: Vec<PvArray>,
    pub hvac_systems: Vec<HvacSystem>,
    pub dhw_systems: Vec<DhwSystem>,
    pub iaq_fans: Vec<IaqFan>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CanonicalModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zone(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn surface(&self, id: &str) -> Option<&Surface> {
        self.surfaces.iter().find(|s| s.id == id)
    }

    /// Surfaces of one type, in model order.
    pub fn surfaces_of(&self, surface_type: SurfaceType) -> impl Iterator<Item = &Surface> {
        self.surfaces
            .iter()
            .filter(move |s| s.surface_type == surface_type)
    }

    pub fn openings_of(&self, opening_type: OpeningType) -> impl Iterator<Item = &Opening> {
        self.openings
            .iter()
            .filter(move |o| o.opening_type == opening_type)
    }

    /// Fill `surface_ids` of zones that list none from the surface collection.
    pub fn link_zone_surfaces(&mut self) {
        for zone in self.zones.iter_mut().filter(|z| z.surface_ids.is_empty()) {
            zone.surface_ids = self
                .surfaces
                .iter()
                .filter(|s| s.zone_id == zone.id)
                .map(|s| s.id.clone())
                .collect();
        }
    }

    /// Every `(kind, id)` pair in the model, in collection order.
    pub fn ids(&self) -> Vec<(EntityKind, &str)> {
        let mut ids: Vec<(EntityKind, &str)> = Vec::new();
        ids.extend(self.zone_groups.iter().map(|e| (EntityKind::ZoneGroup, e.id.as_str())));
        ids.extend(self.zones.iter().map(|e| (EntityKind::Zone, e.id.as_str())));
        ids.extend(self.surfaces.iter().map(|e| (EntityKind::Surface, e.id.as_str())));
        ids.extend(self.openings.iter().map(|e| (EntityKind::Opening, e.id.as_str())));
        ids.extend(self.window_types.iter().map(|e| (EntityKind::WindowType, e.id.as_str())));
        ids.extend(self.constructions.iter().map(|e| (EntityKind::Construction, e.id.as_str())));
        ids.extend(self.materials.iter().map(|e| (EntityKind::Material, e.id.as_str())));
        ids.extend(self.du_types.iter().map(|e| (EntityKind::DuType, e.id.as_str())));
        ids.extend(self.pv_arrays.iter().map(|e| (EntityKind::PvArray, e.id.as_str())));
        ids.extend(self.hvac_systems.iter().map(|e| (EntityKind::Hvac, e.id.as_str())));
        ids.extend(self.dhw_systems.iter().map(|e| (EntityKind::Dhw, e.id.as_str())));
        ids.extend(self.iaq_fans.iter().map(|e| (EntityKind::IaqFan, e.id.as_str())));
        ids
    }

    /// Counts per canonical bucket, keyed by the canonical JSON path.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        counts.insert("zones".to_string(), self.zones.len());
        counts.insert("zone_groups".to_string(), self.zone_groups.len());
        for t in SurfaceType::ALL {
            counts.insert(format!("surfaces.{}", t.bucket()), self.surfaces_of(t).count());
        }
        for t in OpeningType::ALL {
            counts.insert(format!("openings.{}", t.bucket()), self.openings_of(t).count());
        }
        counts.insert("window_types".to_string(), self.window_types.len());
        counts.insert("construction_types".to_string(), self.constructions.len());
        counts.insert("materials".to_string(), self.materials.len());
        counts.insert("du_types".to_string(), self.du_types.len());
        counts.insert("pv".to_string(), self.pv_arrays.len());
        counts.insert("hvac".to_string(), self.hvac_systems.len());
        counts.insert("dhw".to_string(), self.dhw_systems.len());
        counts.insert("iaq_fans".to_string(), self.iaq_fans.len());
        counts
    }

    /// Conditioned floor area including zone multipliers, m².
    pub fn total_floor_area_m2(&self) -> f64 {
        self.zones
            .iter()
            .filter_map(|z| z.floor_area_m2.map(|a| a * z.multiplier.max(1) as f64))
            .sum()
    }

    pub fn window_area_m2(&self) -> f64 {
        self.openings_of(OpeningType::Window)
            .filter_map(|o| o.area_m2)
            .sum()
    }

    /// Window area over exterior wall area, when there is wall area.
    pub fn window_to_wall_ratio(&self) -> Option<f64> {
        let wall: f64 = self
            .surfaces_of(SurfaceType::Wall)
            .filter(|s| s.adjacency == Adjacency::Exterior)
            .filter_map(|s| s.area_m2)
            .sum();
        (wall > 0.0).then(|| self.window_area_m2() / wall)
    }
}
