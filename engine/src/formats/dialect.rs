//! Dialect configuration tables
//!
//! A [`DialectConfig`] tells the generic XML adapter which tags stand for
//! which entity and where each logical field may appear. Field aliases are
//! tried in order and the first one present wins; that order is part of the
//! contract, not an implementation detail.
//!
//! Two tables ship embedded (`dialects/cibd22x.json`, `dialects/cibd22.json`);
//! others can be loaded from disk with [`DialectConfig::from_file`].

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::Dialect;
use crate::error::{ConfigError, ConfigResult};
use crate::models::EntityKind;
use crate::units::{Quantity, UnitSystem};

static CIBD22X_TABLE: Lazy<Result<DialectConfig, String>> = Lazy::new(|| {
    DialectConfig::from_json(include_str!("../../dialects/cibd22x.json")).map_err(|e| e.to_string())
});

static CIBD22_TABLE: Lazy<Result<DialectConfig, String>> = Lazy::new(|| {
    DialectConfig::from_json(include_str!("../../dialects/cibd22.json")).map_err(|e| e.to_string())
});

/// How geometry is arranged in the document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Zones inside groups or the building, surfaces inside zones, openings
    /// inside surfaces.
    #[default]
    Nested,
    /// Everything under the building; parents named by reference fields.
    Flat,
}

/// One place a value may live.
///
/// - `child` alone: text of a direct child element (`/` descends further)
/// - `attr` alone: attribute of the element itself
/// - both: attribute of that child
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alias {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
}

impl Alias {
    pub fn child(name: impl Into<String>) -> Self {
        Self {
            child: Some(name.into()),
            attr: None,
        }
    }

    pub fn attr(name: impl Into<String>) -> Self {
        Self {
            child: None,
            attr: Some(name.into()),
        }
    }

    /// Name of the direct child element this alias reads, if any.
    pub fn first_step(&self) -> Option<&str> {
        self.child
            .as_deref()
            .and_then(|c| c.split('/').find(|s| !s.is_empty()))
    }
}

/// Where a logical field lives and what it measures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    pub aliases: Vec<Alias>,
    #[serde(default)]
    pub quantity: Quantity,
    /// Collect every value of the first matching alias instead of one.
    #[serde(default)]
    pub multiple: bool,
}

impl FieldSpec {
    pub fn new(aliases: Vec<Alias>, quantity: Quantity) -> Self {
        Self {
            aliases,
            quantity,
            multiple: false,
        }
    }
}

/// A tag recognised for an entity, with the variant it implies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagRule {
    pub tag: String,
    /// Building type for zones, surface/opening type for geometry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Default adjacency for surfaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjacency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EntitySpec {
    #[serde(default)]
    pub tags: Vec<TagRule>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSpec>,
}

fn default_unit_attributes() -> Vec<String> {
    vec!["unit".to_string(), "units".to_string()]
}

/// Complete mapping table for one dialect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialectConfig {
    pub dialect: Dialect,

    #[serde(default)]
    pub description: String,

    /// Root element written on serialize.
    pub root_tag: String,

    /// Tags of the element carrying project and location fields.
    #[serde(default)]
    pub project_tags: Vec<String>,

    /// Tags of the element holding geometry.
    #[serde(default)]
    pub building_tags: Vec<String>,

    #[serde(default)]
    pub layout: Layout,

    /// Units assumed when a value carries none.
    #[serde(default)]
    pub default_units: UnitSystem,

    /// Attribute names carrying an explicit unit, in priority order.
    #[serde(default = "default_unit_attributes")]
    pub unit_attributes: Vec<String>,

    /// Where the object name lives, in priority order.
    pub name: Vec<Alias>,

    #[serde(default)]
    pub entities: BTreeMap<EntityKind, EntitySpec>,
}

impl DialectConfig {
    /// Embedded table for an XML dialect.
    pub fn builtin(dialect: Dialect) -> ConfigResult<&'static DialectConfig> {
        let table = match dialect {
            Dialect::Cibd22x => &*CIBD22X_TABLE,
            Dialect::Cibd22 => &*CIBD22_TABLE,
            Dialect::EmJson => {
                return Err(ConfigError::InvalidValue {
                    key: "dialect".into(),
                    value: "EMJSON has no XML mapping table".into(),
                })
            }
        };
        table.as_ref().map_err(|e| ConfigError::InvalidValue {
            key: format!("embedded table {}", dialect),
            value: e.clone(),
        })
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: DialectConfig = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject tables the adapter cannot use.
    fn check(&self) -> ConfigResult<()> {
        if self.root_tag.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "root_tag".into(),
                value: "must not be empty".into(),
            });
        }
        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "name".into(),
                value: "at least one name alias is required".into(),
            });
        }
        for (kind, spec) in &self.entities {
            for (field, fs) in &spec.fields {
                if let Some(bad) = fs.aliases.iter().find(|a| a.child.is_none() && a.attr.is_none()) {
                    return Err(ConfigError::InvalidValue {
                        key: format!("{:?}.{}", kind, field),
                        value: format!("alias {:?} names neither child nor attr", bad),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn entity(&self, kind: EntityKind) -> Option<&EntitySpec> {
        self.entities.get(&kind)
    }

    pub fn field(&self, kind: EntityKind, field: &str) -> Option<&FieldSpec> {
        self.entity(kind).and_then(|e| e.fields.get(field))
    }

    /// Tag rule matching this element tag.
    pub fn rule_for_tag(&self, kind: EntityKind, tag: &str) -> Option<&TagRule> {
        self.entity(kind)
            .and_then(|e| e.tags.iter().find(|r| r.tag == tag))
    }

    pub fn has_tag(&self, kind: EntityKind, tag: &str) -> bool {
        self.rule_for_tag(kind, tag).is_some()
    }

    /// Tags of zone rules whose kind is this building type.
    pub fn zone_tags_of(&self, building_type: &str) -> Vec<&str> {
        self.entity(EntityKind::Zone)
            .map(|e| {
                e.tags
                    .iter()
                    .filter(|r| r.kind.as_deref() == Some(building_type))
                    .map(|r| r.tag.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tag to write for an entity.
    ///
    /// `preferred` (usually the tag the entity was read from) wins when this
    /// table knows it. Otherwise the first rule matching `kind`, then
    /// `adjacency`, is chosen, falling back to the first rule of the kind.
    pub fn write_tag(
        &self,
        kind: EntityKind,
        preferred: Option<&str>,
        variant: Option<&str>,
        adjacency: Option<&str>,
    ) -> Option<&str> {
        let spec = self.entity(kind)?;
        if let Some(rule) = preferred.and_then(|p| spec.tags.iter().find(|r| r.tag == p)) {
            let variant_ok = variant.is_none() || rule.kind.is_none() || rule.kind.as_deref() == variant;
            if variant_ok {
                return Some(rule.tag.as_str());
            }
        }

        let same_variant = |r: &&TagRule| variant.is_none() || r.kind.as_deref() == variant;
        spec.tags
            .iter()
            .filter(same_variant)
            .find(|r| adjacency.is_some() && r.adjacency.as_deref() == adjacency)
            .or_else(|| spec.tags.iter().find(same_variant))
            .or_else(|| spec.tags.first())
            .map(|r| r.tag.as_str())
    }

    /// Child and attribute names read by this entity's aliases.
    ///
    /// Everything else found on the element goes to the annotation map.
    pub fn consumed_names(&self, kind: EntityKind) -> BTreeSet<&str> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        let field_aliases = self
            .entity(kind)
            .into_iter()
            .flat_map(|e| e.fields.values())
            .flat_map(|f| f.aliases.iter());
        for alias in self.name.iter().chain(field_aliases) {
            match (alias.first_step(), alias.attr.as_deref()) {
                (Some(child), _) => {
                    names.insert(child);
                }
                (None, Some(attr)) => {
                    names.insert(attr);
                }
                (None, None) => {}
            }
        }
        names.extend(self.unit_attributes.iter().map(String::as_str));
        names
    }
}
