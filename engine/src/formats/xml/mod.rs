//! Table-driven adapter shared by the XML dialects.

mod reader;
mod writer;

use std::sync::Arc;

pub use writer::{escape, format_number, XmlElement};

use super::dialect::DialectConfig;
use super::{Dialect, FormatAdapter, Parsed, Serialized};
use crate::error::{ConfigResult, DocumentError, DocumentResult, TranslateResult};
use crate::models::CanonicalModel;
use crate::parser::SourceDocument;
use crate::translate::TranslationContext;

/// Reads and writes one XML dialect as described by its [`DialectConfig`].
#[derive(Debug, Clone)]
pub struct XmlAdapter {
    config: Arc<DialectConfig>,
}

impl XmlAdapter {
    pub fn new(config: DialectConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Adapter over an embedded table.
    pub fn builtin(dialect: Dialect) -> ConfigResult<Self> {
        Ok(Self::new(DialectConfig::builtin(dialect)?.clone()))
    }

    pub fn config(&self) -> &DialectConfig {
        &self.config
    }
}

impl FormatAdapter for XmlAdapter {
    fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    fn parse_source(
        &self,
        document: &SourceDocument<'_>,
        ctx: &mut TranslationContext,
    ) -> DocumentResult<Parsed> {
        match document {
            SourceDocument::Xml(doc) => Ok(reader::read(&self.config, doc, ctx)),
            SourceDocument::Json(_) => Err(DocumentError::malformed(
                self.config.dialect,
                "expected an XML document, found JSON",
            )),
        }
    }

    fn serialize(
        &self,
        model: &CanonicalModel,
        _ctx: &mut TranslationContext,
    ) -> TranslateResult<Serialized> {
        Ok(writer::write(&self.config, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Adjacency, BuildingType, OpeningType, SurfaceType};

    const RESIDENTIAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SDDXML>
  <Proj>
    <Name>Sample House</Name>
    <RulesetFilename file="CA Res 2022.bin"/>
    <SoftwareVersion>2022.1.0</SoftwareVersion>
    <ZipCode>93721</ZipCode>
    <ClimateZone>13</ClimateZone>
    <WinType>
      <Name>Dbl Low-E</Name>
      <UFactor>0.30</UFactor>
      <SHGC>0.23</SHGC>
    </WinType>
    <Bldg>
      <ResZnGrp>
        <Name>First Floor</Name>
        <ResZn>
          <Name>Living</Name>
          <FloorArea>1200</FloorArea>
          <ResExtWall>
            <Name>North Wall</Name>
            <Area>320</Area>
            <Az>0</Az>
            <Tilt>90</Tilt>
            <Color>beige</Color>
            <ResWin>
              <Name>N Win 1</Name>
              <Area>15</Area>
              <UFactor unit="IP">0.30</UFactor>
              <SHGC>23</SHGC>
              <WinType>Dbl Low-E</WinType>
            </ResWin>
          </ResExtWall>
          <ResSlabFlr>
            <Name>Slab</Name>
            <Area>1200</Area>
          </ResSlabFlr>
        </ResZn>
      </ResZnGrp>
    </Bldg>
  </Proj>
</SDDXML>
"#;

    fn parse(adapter: &XmlAdapter, text: &str) -> Parsed {
        let mut ctx = TranslationContext::default();
        adapter.parse(text, &mut ctx).unwrap()
    }

    #[test]
    fn test_reads_nested_residential() {
        let adapter = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let parsed = parse(&adapter, RESIDENTIAL);
        let model = &parsed.model;

        assert_eq!(model.project.name.as_deref(), Some("Sample House"));
        assert_eq!(model.project.model_info.ruleset.as_deref(), Some("CA Res 2022.bin"));
        assert_eq!(model.project.location.zip_code.as_deref(), Some("93721"));

        assert_eq!(model.zone_groups.len(), 1);
        assert_eq!(model.zones.len(), 1);
        let zone = &model.zones[0];
        assert_eq!(zone.name, "Living");
        assert_eq!(zone.building_type, BuildingType::Residential);
        assert!(zone.id.starts_with("Z-"));
        assert!(zone.id.ends_with("-living"));
        assert_eq!(model.zone_groups[0].zone_refs, vec![zone.id.clone()]);
        assert!((zone.floor_area_m2.unwrap() - 111.483648).abs() < 1e-4);

        assert_eq!(model.surfaces.len(), 2);
        let wall = &model.surfaces[0];
        assert_eq!(wall.surface_type, SurfaceType::Wall);
        assert_eq!(wall.adjacency, Adjacency::Exterior);
        assert_eq!(wall.zone_id, zone.id);
        assert_eq!(wall.annotation.get("Color").and_then(|v| v.as_str()), Some("beige"));
        assert_eq!(model.surfaces[1].surface_type, SurfaceType::Floor);
        assert_eq!(model.surfaces[1].adjacency, Adjacency::Ground);
        assert_eq!(zone.surface_ids.len(), 2);

        assert_eq!(model.window_types.len(), 1);
        assert_eq!(model.openings.len(), 1);
        let window = &model.openings[0];
        assert_eq!(window.opening_type, OpeningType::Window);
        assert_eq!(window.parent_surface_id, wall.id);
        assert_eq!(window.window_type_ref.as_deref(), Some(model.window_types[0].id.as_str()));
        assert!((window.u_factor_si.unwrap() - 1.703479).abs() < 1e-4);
        assert!((window.shgc.unwrap() - 0.23).abs() < 1e-9);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let adapter = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let a = parse(&adapter, RESIDENTIAL).model;
        let b = parse(&adapter, RESIDENTIAL).model;
        assert_eq!(a.ids(), b.ids());
    }

    #[test]
    fn test_map_diagnostics_first() {
        let adapter = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let parsed = parse(&adapter, RESIDENTIAL);
        assert_eq!(parsed.diagnostics[0].code, "I-MAP-ZONES");
        assert!(parsed.diagnostics.iter().all(|d| d.code != "W-LOC-NOZIP"));
    }

    #[test]
    fn test_unnamed_and_duplicate_names() {
        let text = r#"<SDDXML><Proj><Bldg>
            <ResZn><FloorArea>100</FloorArea></ResZn>
            <ResZn><FloorArea>200</FloorArea></ResZn>
            <ResZn><Name>Bed</Name></ResZn>
            <ResZn><Name>Bed</Name></ResZn>
        </Bldg></Proj></SDDXML>"#;
        let adapter = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let parsed = parse(&adapter, text);
        let ids: Vec<&str> = parsed.model.zones.iter().map(|z| z.id.as_str()).collect();
        assert_eq!(ids.len(), 4);
        let unique: std::collections::HashSet<&str> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 4);
        assert!(parsed.diagnostics.iter().any(|d| d.code == "W-NAME-DUPLICATE"));
    }

    #[test]
    fn test_duplicate_names_in_different_zones() {
        let text = r#"<SDDXML><Proj><Bldg>
            <ResZn><Name>A</Name>
              <ResExtWall><Name>Wall</Name><Area>10</Area></ResExtWall>
              <ResExtWall><Name>Wall</Name><Area>20</Area></ResExtWall>
            </ResZn>
            <ResZn><Name>B</Name>
              <ResExtWall><Name>Wall</Name><Area>30</Area></ResExtWall>
              <ResExtWall><Name>Wall</Name><Area>40</Area></ResExtWall>
            </ResZn>
        </Bldg></Proj></SDDXML>"#;
        let adapter = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let parsed = parse(&adapter, text);
        let model = &parsed.model;

        let ids: std::collections::HashSet<&str> =
            model.surfaces.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(model.surfaces.len(), 4);
        assert_eq!(ids.len(), 4);
        for zone in &model.zones {
            assert_eq!(zone.surface_ids.len(), 2);
            for id in &zone.surface_ids {
                let surface = model.surfaces.iter().find(|s| &s.id == id).unwrap();
                assert_eq!(surface.zone_id, zone.id);
            }
        }

        let report = crate::validation::validate_model(model);
        assert!(report.errors.iter().all(|d| d.code != "E-ID-DUPLICATE"));
    }

    #[test]
    fn test_unnamed_entities_keep_ids_through_rewrite() {
        let text = r#"<SDDXML><Proj><Bldg>
            <ResZn><FloorArea>100</FloorArea>
              <ResExtWall><Area>10</Area></ResExtWall>
            </ResZn>
            <ResZn><Name>Bed</Name><FloorArea>200</FloorArea></ResZn>
        </Bldg></Proj></SDDXML>"#;
        let adapter = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let original = parse(&adapter, text).model;
        let unnamed = original.zones[0].id.clone();

        for dialect in [Dialect::Cibd22x, Dialect::Cibd22] {
            let target = XmlAdapter::builtin(dialect).unwrap();
            let out = target.serialize(&original, &mut TranslationContext::default()).unwrap();
            assert!(!out.text.contains(&format!("<Name>{}</Name>", unnamed)), "{}", dialect);
            assert!(!out.text.contains(&format!("name=\"{}\"", unnamed)), "{}", dialect);
            assert!(out.text.contains(&format!("id=\"{}\"", unnamed)), "{}", dialect);

            let back = parse(&target, &out.text).model;
            let ids: Vec<&str> = back.zones.iter().map(|z| z.id.as_str()).collect();
            let expected: Vec<&str> = original.zones.iter().map(|z| z.id.as_str()).collect();
            assert_eq!(ids, expected, "{}", dialect);
            assert_eq!(back.surfaces[0].id, original.surfaces[0].id);
            assert_eq!(back.surfaces[0].zone_id, unnamed);
        }
    }

    #[test]
    fn test_canonical_id_shape() {
        assert!(reader::is_canonical_id("Z", "Z-3f9a0c12-living"));
        assert!(reader::is_canonical_id("Z", "Z-3f9a0c12"));
        assert!(!reader::is_canonical_id("Z", "ZG-3f9a0c12-floor"));
        assert!(!reader::is_canonical_id("Z", "Z-xyz"));
        assert!(!reader::is_canonical_id("Z", "Z-ééééé"));
        assert!(!reader::is_canonical_id("S", "z1"));
    }

    #[test]
    fn test_broken_markup_is_malformed() {
        let adapter = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let mut ctx = TranslationContext::default();
        let err = adapter.parse("<a><b></a>", &mut ctx).unwrap_err();
        assert!(matches!(err, DocumentError::Malformed { ref format, .. } if format == "CIBD22X"));

        let err = adapter.parse("  \n", &mut ctx).unwrap_err();
        assert!(matches!(err, DocumentError::Unreadable(_)));
    }

    #[test]
    fn test_orphans_are_skipped_with_warnings() {
        let text = r#"<Project name="P">
            <Building name="B">
              <ExteriorWall name="Lost"><Area>10</Area></ExteriorWall>
              <Window name="Nowhere"><Area>2</Area></Window>
            </Building>
        </Project>"#;
        let adapter = XmlAdapter::builtin(Dialect::Cibd22).unwrap();
        let parsed = parse(&adapter, text);
        assert!(parsed.model.surfaces.is_empty());
        assert!(parsed.model.openings.is_empty());
        let codes: Vec<&str> = parsed.diagnostics.iter().map(|d| d.code.as_str()).collect();
        assert!(codes.contains(&"W-SURF-NOZONE"));
        assert!(codes.contains(&"W-OPEN-NOPARENT"));
    }

    #[test]
    fn test_flat_references_resolve() {
        let text = r#"<Project name="P">
            <Building name="B">
              <ResidentialZone id="z1" name="Kitchen"><FloorArea>150</FloorArea></ResidentialZone>
              <ExteriorWall id="w1" name="East"><ZoneIdRef>z1</ZoneIdRef><Area>80</Area></ExteriorWall>
              <Door name="Back"><SurfaceIdRef>East</SurfaceIdRef><Area>20</Area></Door>
              <Roof name="Top" zoneIdRef="Ghost"><Area>150</Area></Roof>
            </Building>
        </Project>"#;
        let adapter = XmlAdapter::builtin(Dialect::Cibd22).unwrap();
        let parsed = parse(&adapter, text);
        let model = &parsed.model;
        let zone = &model.zones[0];
        assert_eq!(model.surfaces[0].zone_id, zone.id);
        assert_eq!(model.openings[0].parent_surface_id, model.surfaces[0].id);
        assert_eq!(model.openings[0].opening_type, OpeningType::Door);
        assert_eq!(model.surfaces[1].zone_id, "Ghost");
        assert!(parsed.diagnostics.iter().any(|d| d.code == "W-REF-UNRESOLVED"));
    }

    #[test]
    fn test_json_document_is_rejected() {
        let adapter = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let mut ctx = TranslationContext::default();
        let err = adapter.parse(r#"{"geometry": {}}"#, &mut ctx).unwrap_err();
        assert!(matches!(err, DocumentError::Malformed { .. }));
    }

    #[test]
    fn test_roundtrip_through_each_dialect() {
        let source = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let original = parse(&source, RESIDENTIAL).model;

        for dialect in [Dialect::Cibd22x, Dialect::Cibd22] {
            let adapter = XmlAdapter::builtin(dialect).unwrap();
            let mut ctx = TranslationContext::default();
            let out = adapter.serialize(&original, &mut ctx).unwrap();
            let back = parse(&adapter, &out.text).model;

            assert_eq!(back.counts(), original.counts(), "{}", dialect);
            assert_eq!(back.zones[0].name, "Living");
            assert_eq!(back.surfaces[1].surface_type, SurfaceType::Floor);
            assert_eq!(back.surfaces[1].adjacency, Adjacency::Ground);
            assert_eq!(back.openings[0].parent_surface_id, back.surfaces[0].id);
            let u = back.openings[0].u_factor_si.unwrap();
            assert!((u - original.openings[0].u_factor_si.unwrap()).abs() < 1e-4);
            let area = back.zones[0].floor_area_m2.unwrap();
            assert!((area - original.zones[0].floor_area_m2.unwrap()).abs() < 1e-4);
        }
    }

    #[test]
    fn test_u_factor_written_with_unit() {
        let source = XmlAdapter::builtin(Dialect::Cibd22x).unwrap();
        let model = parse(&source, RESIDENTIAL).model;
        let mut ctx = TranslationContext::default();
        let out = source.serialize(&model, &mut ctx).unwrap();
        assert!(out.text.contains("<UFactor unit=\"IP\">0.3</UFactor>"));
    }
}
