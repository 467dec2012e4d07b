//! Enrichment passes run after parse and before validation.
//!
//! These are the only mutations a model sees after it is built.

use crate::models::{CanonicalModel, Diagnostic, HeatPumpDetails};

/// Heat-pump water heater read from the source, waiting to be attached to
/// the DHW system it names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeatPumpRecord {
    /// Canonical id of the DHW system when resolved at parse, the raw
    /// source reference otherwise.
    pub dhw_ref: Option<String>,
    pub details: HeatPumpDetails,
}

/// Run every pass in order.
pub fn run(model: &mut CanonicalModel, heat_pumps: Vec<HeatPumpRecord>) -> Vec<Diagnostic> {
    let mut diagnostics = attach_heat_pumps(model, heat_pumps);
    diagnostics.extend(derive_opening_areas(model));
    diagnostics
}

/// Attach HPWH details to their DHW systems, matching id then name.
pub fn attach_heat_pumps(model: &mut CanonicalModel, heat_pumps: Vec<HeatPumpRecord>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for record in heat_pumps {
        let target = record.dhw_ref.as_deref().and_then(|r| {
            model
                .dhw_systems
                .iter()
                .position(|d| d.id == r)
                .or_else(|| model.dhw_systems.iter().position(|d| d.name == r))
        });

        match target {
            Some(index) => {
                let dhw = &mut model.dhw_systems[index];
                // First record wins.
                if let Some(existing) = &dhw.hpwh {
                    diagnostics.push(
                        Diagnostic::warning(
                            "W-HPWH-MULTIPLE",
                            format!(
                                "DHW system '{}' already has heat pump '{}'; '{}' is ignored",
                                dhw.name, existing.name, record.details.name
                            ),
                        )
                        .with_context("dhw", dhw.id.as_str())
                        .with_context("kept", existing.name.as_str())
                        .with_context("ignored", record.details.name.as_str()),
                    );
                    continue;
                }
                dhw.hpwh = Some(record.details);
            }
            None => {
                let reference = record.dhw_ref.unwrap_or_default();
                diagnostics.push(
                    Diagnostic::warning(
                        "W-HPWH-NODHW",
                        format!(
                            "heat pump water heater '{}' references unknown DHW system '{}'",
                            record.details.name, reference
                        ),
                    )
                    .with_context("hpwh", record.details.name.as_str())
                    .with_context("dhw_ref", reference),
                );
            }
        }
    }
    diagnostics
}

/// Fill opening areas from width × height where only dimensions are known.
pub fn derive_opening_areas(model: &mut CanonicalModel) -> Vec<Diagnostic> {
    let mut derived = Vec::new();
    for opening in model.openings.iter_mut().filter(|o| o.area_m2.is_none()) {
        if let (Some(w), Some(h)) = (opening.width_m, opening.height_m) {
            opening.area_m2 = Some(w * h);
            derived.push(opening.id.clone());
        }
    }

    if derived.is_empty() {
        return Vec::new();
    }
    vec![Diagnostic::info(
        "I-ENRICH-AREA",
        format!("area of {} opening(s) derived from width and height", derived.len()),
    )
    .with_context("count", derived.len())
    .with_context("openings", derived)]
}
