//! Generic field extraction driven by a [`DialectConfig`].
//!
//! [`field`] applies one field's aliases to one element. [`FieldReader`]
//! wraps it for a whole parse and turns per-value outcomes into
//! diagnostics, aggregated per (entity kind, field) so that a large model
//! with a systematic gap yields one message rather than thousands.

use roxmltree::Node;
use std::collections::{BTreeMap, BTreeSet};

use super::dialect::{Alias, DialectConfig, FieldSpec};
use crate::models::{Diagnostic, EntityKind};
use crate::parser::{attribute, descend, text};
use crate::units::{to_si, UnitPolicy};

/// A raw value found under one alias.
#[derive(Debug, Clone, PartialEq)]
pub struct RawValue {
    pub text: String,
    pub unit: Option<String>,
}

/// Result of extracting one field from one element.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Absent,
    Text(String),
    Number {
        value: f64,
        heuristic: bool,
        unknown_unit: Option<String>,
    },
    /// Present but not a number.
    Invalid(String),
}

fn unit_hint(node: Node<'_, '_>, cfg: &DialectConfig) -> Option<String> {
    cfg.unit_attributes
        .iter()
        .find_map(|name| attribute(node, name))
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

/// Every non-empty value this alias yields, in document order.
pub fn read_alias(node: Node<'_, '_>, alias: &Alias, cfg: &DialectConfig) -> Vec<RawValue> {
    match (alias.child.as_deref(), alias.attr.as_deref()) {
        (Some(path), None) => descend(node, path)
            .into_iter()
            .filter_map(|c| {
                text(c).map(|t| RawValue {
                    text: t.to_string(),
                    unit: unit_hint(c, cfg),
                })
            })
            .collect(),
        (Some(path), Some(attr)) => descend(node, path)
            .into_iter()
            .filter_map(|c| attribute(c, attr))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| RawValue {
                text: v.to_string(),
                unit: None,
            })
            .collect(),
        (None, Some(attr)) => attribute(node, attr)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| {
                vec![RawValue {
                    text: v.to_string(),
                    unit: None,
                }]
            })
            .unwrap_or_default(),
        (None, None) => Vec::new(),
    }
}

/// First value of the first alias that has one.
pub fn first_value(node: Node<'_, '_>, spec: &FieldSpec, cfg: &DialectConfig) -> Option<RawValue> {
    spec.aliases
        .iter()
        .find_map(|alias| read_alias(node, alias, cfg).into_iter().next())
}

/// All values of the first alias that has any.
pub fn all_values(node: Node<'_, '_>, spec: &FieldSpec, cfg: &DialectConfig) -> Vec<RawValue> {
    spec.aliases
        .iter()
        .map(|alias| read_alias(node, alias, cfg))
        .find(|values| !values.is_empty())
        .unwrap_or_default()
}

/// Parse a number, tolerating thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Extract one field from an element.
pub fn field(
    node: Node<'_, '_>,
    spec: &FieldSpec,
    cfg: &DialectConfig,
    policy: &UnitPolicy,
) -> Extracted {
    let Some(raw) = first_value(node, spec, cfg) else {
        return Extracted::Absent;
    };
    if !spec.quantity.is_numeric() {
        return Extracted::Text(raw.text);
    }
    match parse_number(&raw.text) {
        Some(value) => {
            let converted = to_si(spec.quantity, value, raw.unit.as_deref(), policy);
            Extracted::Number {
                value: converted.value,
                heuristic: converted.heuristic,
                unknown_unit: raw.unit.filter(|_| converted.unknown_hint),
            }
        }
        None => Extracted::Invalid(raw.text),
    }
}

#[derive(Debug, Default)]
struct FieldStats {
    seen: usize,
    absent: usize,
    heuristic: usize,
    unknown_units: BTreeSet<String>,
}

/// Stateful extraction for one parse.
#[derive(Debug)]
pub struct FieldReader<'c> {
    cfg: &'c DialectConfig,
    policy: UnitPolicy,
    stats: BTreeMap<(EntityKind, String), FieldStats>,
    diagnostics: Vec<Diagnostic>,
}

impl<'c> FieldReader<'c> {
    pub fn new(cfg: &'c DialectConfig, policy: UnitPolicy) -> Self {
        Self {
            cfg,
            policy,
            stats: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn config(&self) -> &'c DialectConfig {
        self.cfg
    }

    pub fn text(&mut self, kind: EntityKind, node: Node<'_, '_>, name: &str) -> Option<String> {
        let spec = self.cfg.field(kind, name)?;
        first_value(node, spec, self.cfg).map(|v| v.text)
    }

    /// Every value of a `multiple` field.
    pub fn all(&mut self, kind: EntityKind, node: Node<'_, '_>, name: &str) -> Vec<String> {
        match self.cfg.field(kind, name) {
            Some(spec) => all_values(node, spec, self.cfg)
                .into_iter()
                .map(|v| v.text)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Numeric field in SI; `entity` names the element in diagnostics.
    pub fn number(
        &mut self,
        kind: EntityKind,
        node: Node<'_, '_>,
        name: &str,
        entity: &str,
    ) -> Option<f64> {
        let spec = self.cfg.field(kind, name)?;
        let extracted = field(node, spec, self.cfg, &self.policy);
        let stats = self.stats.entry((kind, name.to_string())).or_default();
        stats.seen += 1;

        match extracted {
            Extracted::Absent => {
                stats.absent += 1;
                None
            }
            Extracted::Number {
                value,
                heuristic,
                unknown_unit,
            } => {
                if heuristic {
                    stats.heuristic += 1;
                }
                if let Some(unit) = unknown_unit {
                    stats.unknown_units.insert(unit);
                }
                Some(value)
            }
            Extracted::Invalid(raw) | Extracted::Text(raw) => {
                self.diagnostics.push(
                    Diagnostic::warning(
                        "W-FIELD-PARSE",
                        format!("{} '{}': {} value '{}' is not a number", kind.label(), entity, name, raw),
                    )
                    .with_context("kind", kind.label())
                    .with_context("field", name)
                    .with_context("value", raw),
                );
                None
            }
        }
    }

    /// Non-negative integer field.
    pub fn count(
        &mut self,
        kind: EntityKind,
        node: Node<'_, '_>,
        name: &str,
        entity: &str,
    ) -> Option<u32> {
        self.number(kind, node, name, entity)
            .filter(|v| *v >= 0.0)
            .map(|v| v.round() as u32)
    }

    /// Signed integer field, kept as read so range checks can see it.
    pub fn integer(
        &mut self,
        kind: EntityKind,
        node: Node<'_, '_>,
        name: &str,
        entity: &str,
    ) -> Option<i64> {
        self.number(kind, node, name, entity).map(|v| v.round() as i64)
    }

    /// Aggregate diagnostics, then everything reported per value.
    pub fn finish(self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for ((kind, name), stats) in &self.stats {
            if stats.absent > 0 {
                out.push(
                    Diagnostic::info(
                        "I-FIELD-ABSENT",
                        format!(
                            "{} of {} {}s have no {}",
                            stats.absent,
                            stats.seen,
                            kind.label(),
                            name
                        ),
                    )
                    .with_context("kind", kind.label())
                    .with_context("field", name.as_str())
                    .with_context("count", stats.absent),
                );
            }
            if stats.heuristic > 0 {
                out.push(
                    Diagnostic::info(
                        "I-UNIT-HEURISTIC",
                        format!(
                            "unit of {} {} value(s) on {}s inferred from magnitude",
                            stats.heuristic,
                            name,
                            kind.label()
                        ),
                    )
                    .with_context("kind", kind.label())
                    .with_context("field", name.as_str())
                    .with_context("count", stats.heuristic),
                );
            }
            if !stats.unknown_units.is_empty() {
                let units: Vec<&str> = stats.unknown_units.iter().map(String::as_str).collect();
                out.push(
                    Diagnostic::warning(
                        "W-UNIT-UNKNOWN",
                        format!(
                            "unrecognised unit(s) {} on {} of {}s; dialect default used",
                            units.join(", "),
                            name,
                            kind.label()
                        ),
                    )
                    .with_context("kind", kind.label())
                    .with_context("field", name.as_str())
                    .with_context("units", units),
                );
            }
        }
        out.extend(self.diagnostics);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Dialect;
    use crate::parser::parse_xml;
    use crate::units::Quantity;

    fn cfg() -> &'static DialectConfig {
        DialectConfig::builtin(Dialect::Cibd22x).unwrap()
    }

    fn spec(aliases: Vec<Alias>, quantity: Quantity) -> FieldSpec {
        FieldSpec::new(aliases, quantity)
    }

    #[test]
    fn test_first_alias_wins() {
        let doc = parse_xml("<Win><NFRCUfactor>0.30</NFRCUfactor><UFactor>0.50</UFactor></Win>").unwrap();
        let spec = spec(
            vec![Alias::child("UFactor"), Alias::child("NFRCUfactor")],
            Quantity::Text,
        );
        let value = first_value(doc.root_element(), &spec, cfg()).unwrap();
        assert_eq!(value.text, "0.50");
    }

    #[test]
    fn test_attribute_and_child_attribute_aliases() {
        let doc = parse_xml(r#"<Proj area="12"><RulesetFilename file="CA Res 2022.bin"/></Proj>"#).unwrap();
        let root = doc.root_element();

        let attr = spec(vec![Alias::attr("area")], Quantity::Text);
        assert_eq!(first_value(root, &attr, cfg()).unwrap().text, "12");

        let both = spec(
            vec![Alias {
                child: Some("RulesetFilename".into()),
                attr: Some("file".into()),
            }],
            Quantity::Text,
        );
        assert_eq!(first_value(root, &both, cfg()).unwrap().text, "CA Res 2022.bin");
    }

    #[test]
    fn test_blank_values_fall_through() {
        let doc = parse_xml("<Zn><FloorArea>  </FloorArea><ZnFlrArea>50</ZnFlrArea></Zn>").unwrap();
        let spec = spec(
            vec![Alias::child("FloorArea"), Alias::child("ZnFlrArea")],
            Quantity::Number,
        );
        let out = field(doc.root_element(), &spec, cfg(), &UnitPolicy::default());
        assert!(matches!(out, Extracted::Number { value, .. } if value == 50.0));
    }

    #[test]
    fn test_unit_conversion_and_separators() {
        let doc = parse_xml(r#"<Zn><FloorArea unit="ft2">1,000</FloorArea></Zn>"#).unwrap();
        let spec = spec(vec![Alias::child("FloorArea")], Quantity::Area);
        match field(doc.root_element(), &spec, cfg(), &UnitPolicy::default()) {
            Extracted::Number { value, heuristic, unknown_unit } => {
                assert!((value - 92.90304).abs() < 1e-6);
                assert!(!heuristic);
                assert!(unknown_unit.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_and_absent() {
        let doc = parse_xml("<Zn><FloorArea>big</FloorArea></Zn>").unwrap();
        let area = spec(vec![Alias::child("FloorArea")], Quantity::Area);
        let vol = spec(vec![Alias::child("Volume")], Quantity::Volume);
        let policy = UnitPolicy::default();
        assert_eq!(
            field(doc.root_element(), &area, cfg(), &policy),
            Extracted::Invalid("big".into())
        );
        assert_eq!(field(doc.root_element(), &vol, cfg(), &policy), Extracted::Absent);
    }

    #[test]
    fn test_multiple_values() {
        let doc = parse_xml("<Cons><MatRef>Gyp</MatRef><MatRef>Stud</MatRef><MaterialRef>X</MaterialRef></Cons>").unwrap();
        let spec = FieldSpec {
            aliases: vec![Alias::child("MatRef"), Alias::child("MaterialRef")],
            quantity: Quantity::Text,
            multiple: true,
        };
        let values: Vec<String> = all_values(doc.root_element(), &spec, cfg())
            .into_iter()
            .map(|v| v.text)
            .collect();
        assert_eq!(values, vec!["Gyp", "Stud"]);
    }

    #[test]
    fn test_reader_aggregates_diagnostics() {
        let doc = parse_xml(
            r#"<Bldg>
                <Win><UFactor>0.32</UFactor></Win>
                <Win><UFactor>2.0</UFactor><SHGC>n/a</SHGC></Win>
                <Win><UFactor unit="furlongs">0.3</UFactor></Win>
            </Bldg>"#,
        )
        .unwrap();
        let mut reader = FieldReader::new(cfg(), UnitPolicy::default());
        for win in doc.root_element().children().filter(|n| n.is_element()) {
            reader.number(EntityKind::Opening, win, "u_factor", "w");
            reader.number(EntityKind::Opening, win, "shgc", "w");
        }
        let diags = reader.finish();
        let codes: Vec<&str> = diags.iter().map(|d| d.code.as_str()).collect();

        assert!(codes.contains(&"I-UNIT-HEURISTIC"));
        assert!(codes.contains(&"W-UNIT-UNKNOWN"));
        assert!(codes.contains(&"I-FIELD-ABSENT"));
        assert_eq!(codes.iter().filter(|c| **c == "W-FIELD-PARSE").count(), 1);
    }

    #[test]
    fn test_unconfigured_field_is_none() {
        let doc = parse_xml("<Zn><Foo>1</Foo></Zn>").unwrap();
        let mut reader = FieldReader::new(cfg(), UnitPolicy::default());
        assert_eq!(reader.number(EntityKind::Zone, doc.root_element(), "foo", "z"), None);
        assert!(reader.finish().is_empty());
    }
}
