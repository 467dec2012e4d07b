//! Unit conversion between dialect (usually IP) values and canonical SI.
//!
//! Conversion happens once, at extraction time. Each configured field names
//! a [`Quantity`]; [`to_si`] resolves an explicit unit hint when the source
//! carries one and otherwise falls back to the dialect default or, for the
//! ambiguous quantities, a magnitude heuristic.
//!
//! # Heuristics
//!
//! Two quantities are ambiguous in practice because tools write them without
//! units:
//!
//! - **U-factor**: a value `<= u_factor_si_threshold` (default 1.5) is taken
//!   as already SI, a larger one as IP and converted. Real IP window
//!   U-factors are often below 1.5, so this guess can be wrong; an explicit
//!   unit attribute always wins and the serializer always writes one.
//! - **Fractions** (SHGC, VT, efficiencies): a value `> fraction_percent_threshold`
//!   is taken as a percentage and divided by 100.
//!
//! Every heuristic decision is reported to the caller through
//! [`Converted::heuristic`].

use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

pub const FT_TO_M: f64 = 0.3048;
pub const IN_TO_M: f64 = 0.0254;
pub const FT2_TO_M2: f64 = FT_TO_M * FT_TO_M;
pub const FT3_TO_M3: f64 = FT2_TO_M2 * FT_TO_M;
pub const GAL_TO_L: f64 = 3.785_411_784;
/// Btu/(h·ft²·°F) to W/(m²·K).
pub const U_IP_TO_SI: f64 = 5.678_263_337;
/// h·ft²·°F/Btu to m²·K/W.
pub const R_IP_TO_SI: f64 = 1.0 / U_IP_TO_SI;
pub const LB_FT3_TO_KG_M3: f64 = 16.018_463_37;
pub const BTU_LBF_TO_J_KGK: f64 = 4186.8;
pub const BTUH_TO_W: f64 = 0.293_071_07;
pub const TON_TO_W: f64 = 3516.852_842;
pub const CFM_TO_M3H: f64 = 1.699_010_8;

/// Default U-factor threshold at or below which a value is taken as SI.
pub const DEFAULT_U_THRESHOLD: f64 = 1.5;

/// Default threshold above which a fraction is taken as a percentage.
pub const DEFAULT_PERCENT_THRESHOLD: f64 = 1.5;

// =============================================================================
// Plain conversions
// =============================================================================

pub fn ft_to_m(ft: f64) -> f64 {
    ft * FT_TO_M
}

pub fn m_to_ft(m: f64) -> f64 {
    m / FT_TO_M
}

pub fn in_to_m(inches: f64) -> f64 {
    inches * IN_TO_M
}

pub fn ft2_to_m2(ft2: f64) -> f64 {
    ft2 * FT2_TO_M2
}

pub fn m2_to_ft2(m2: f64) -> f64 {
    m2 / FT2_TO_M2
}

pub fn ft3_to_m3(ft3: f64) -> f64 {
    ft3 * FT3_TO_M3
}

pub fn gal_to_l(gal: f64) -> f64 {
    gal * GAL_TO_L
}

pub fn l_to_gal(l: f64) -> f64 {
    l / GAL_TO_L
}

pub fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn btuh_to_w(btuh: f64) -> f64 {
    btuh * BTUH_TO_W
}

pub fn cfm_to_m3h(cfm: f64) -> f64 {
    cfm * CFM_TO_M3H
}

/// U-factor to W/m²K.
///
/// `hint` is the source unit label: `"IP"` and `"SI"` (or a spelled-out
/// unit) are honoured as given; anything else falls back to the magnitude
/// heuristic with [`DEFAULT_U_THRESHOLD`].
pub fn u_to_si(value: f64, hint: &str) -> f64 {
    u_to_si_with_threshold(value, hint, DEFAULT_U_THRESHOLD)
}

pub fn u_to_si_with_threshold(value: f64, hint: &str, threshold: f64) -> f64 {
    match hint_factor(Quantity::UFactor, hint) {
        Some(factor) => value * factor,
        None if value <= threshold => value,
        None => value * U_IP_TO_SI,
    }
}

pub fn percent_to_fraction(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value / 100.0
    } else {
        value
    }
}

// =============================================================================
// Quantities
// =============================================================================

/// Unit system a dialect writes when a value carries no unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Ip,
    Si,
}

/// Physical kind of a configured field; the IP unit is the dialect default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    #[default]
    Text,
    /// Unitless number.
    Number,
    /// Non-negative integer.
    Count,
    /// Degrees.
    Angle,
    /// Feet.
    LengthFt,
    /// Inches.
    LengthIn,
    /// Square feet.
    Area,
    /// Cubic feet.
    Volume,
    /// Gallons; SI is litres.
    VolumeGal,
    /// Btu/(h·ft²·°F).
    UFactor,
    /// h·ft²·°F/Btu.
    RValue,
    /// lb/ft³.
    Density,
    /// Btu/(lb·°F).
    SpecificHeat,
    /// Btu/h; SI is W.
    PowerBtuh,
    /// kW; SI is W.
    PowerKw,
    /// W in both systems.
    PowerW,
    /// cfm; SI is m³/h.
    AirflowCfm,
    /// °F; SI is °C.
    TemperatureF,
    /// 0..1, percentages tolerated.
    Fraction,
}

impl Quantity {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text)
    }

    /// Multiplier from the IP default unit to SI. `None` for affine or
    /// unitless quantities.
    fn ip_factor(&self) -> Option<f64> {
        match self {
            Self::LengthFt => Some(FT_TO_M),
            Self::LengthIn => Some(IN_TO_M),
            Self::Area => Some(FT2_TO_M2),
            Self::Volume => Some(FT3_TO_M3),
            Self::VolumeGal => Some(GAL_TO_L),
            Self::UFactor => Some(U_IP_TO_SI),
            Self::RValue => Some(R_IP_TO_SI),
            Self::Density => Some(LB_FT3_TO_KG_M3),
            Self::SpecificHeat => Some(BTU_LBF_TO_J_KGK),
            Self::PowerBtuh => Some(BTUH_TO_W),
            Self::PowerKw => Some(1000.0),
            Self::AirflowCfm => Some(CFM_TO_M3H),
            _ => None,
        }
    }

    /// Whether the magnitude heuristic governs this quantity when no unit
    /// is given.
    pub fn uses_heuristic(&self) -> bool {
        matches!(self, Self::UFactor | Self::Fraction)
    }
}

fn normalize_hint(hint: &str) -> String {
    hint.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '°')
        .map(|c| match c {
            '²' => '2',
            '³' => '3',
            '·' | '*' | '.' => '-',
            other => other,
        })
        .collect()
}

/// Factor to SI for an explicit unit hint, `None` when the hint is empty or
/// not understood for this quantity. Temperature is handled in [`to_si`].
fn hint_factor(quantity: Quantity, hint: &str) -> Option<f64> {
    let h = normalize_hint(hint);
    if h.is_empty() {
        return None;
    }
    if h == "si" {
        return Some(1.0);
    }
    if h == "ip" {
        return Some(quantity.ip_factor().unwrap_or(1.0));
    }

    let factor = match quantity {
        Quantity::LengthFt | Quantity::LengthIn => match h.as_str() {
            "ft" | "feet" | "foot" => FT_TO_M,
            "in" | "inch" | "inches" => IN_TO_M,
            "m" | "meter" | "meters" | "metre" => 1.0,
            "cm" => 0.01,
            "mm" => 0.001,
            _ => return None,
        },
        Quantity::Area => match h.as_str() {
            "ft2" | "sqft" | "sf" | "squarefeet" => FT2_TO_M2,
            "m2" | "sqm" => 1.0,
            _ => return None,
        },
        Quantity::Volume => match h.as_str() {
            "ft3" | "cuft" | "cf" => FT3_TO_M3,
            "m3" => 1.0,
            "l" | "liter" | "liters" => 0.001,
            "gal" | "gallons" => GAL_TO_L / 1000.0,
            _ => return None,
        },
        Quantity::VolumeGal => match h.as_str() {
            "gal" | "gallon" | "gallons" => GAL_TO_L,
            "l" | "liter" | "liters" | "litre" => 1.0,
            "m3" => 1000.0,
            _ => return None,
        },
        Quantity::UFactor => match h.as_str() {
            "btu/hr-ft2-f" | "btu/h-ft2-f" | "btu/(hr-ft2-f)" | "btu/(h-ft2-f)" => U_IP_TO_SI,
            "w/m2k" | "w/m2-k" | "w/(m2-k)" => 1.0,
            _ => return None,
        },
        Quantity::RValue => match h.as_str() {
            "hr-ft2-f/btu" | "h-ft2-f/btu" => R_IP_TO_SI,
            "m2k/w" | "m2-k/w" => 1.0,
            _ => return None,
        },
        Quantity::Density => match h.as_str() {
            "lb/ft3" | "pcf" => LB_FT3_TO_KG_M3,
            "kg/m3" => 1.0,
            _ => return None,
        },
        Quantity::SpecificHeat => match h.as_str() {
            "btu/lb-f" => BTU_LBF_TO_J_KGK,
            "j/kg-k" | "j/kgk" => 1.0,
            "kj/kg-k" => 1000.0,
            _ => return None,
        },
        Quantity::PowerBtuh | Quantity::PowerKw | Quantity::PowerW => match h.as_str() {
            "btuh" | "btu/h" | "btu/hr" => BTUH_TO_W,
            "kbtuh" | "kbtu/h" | "kbtu/hr" => BTUH_TO_W * 1000.0,
            "ton" | "tons" => TON_TO_W,
            "w" => 1.0,
            "kw" => 1000.0,
            _ => return None,
        },
        Quantity::AirflowCfm => match h.as_str() {
            "cfm" | "ft3/min" => CFM_TO_M3H,
            "m3/h" | "m3/hr" => 1.0,
            "l/s" => 3.6,
            _ => return None,
        },
        Quantity::Fraction => match h.as_str() {
            "%" | "percent" | "pct" => 0.01,
            "fraction" | "frac" => 1.0,
            _ => return None,
        },
        Quantity::Angle => match h.as_str() {
            "deg" | "degree" | "degrees" => 1.0,
            "rad" | "radian" | "radians" => 180.0 / std::f64::consts::PI,
            _ => return None,
        },
        Quantity::Text | Quantity::Number | Quantity::Count | Quantity::TemperatureF => {
            return None
        }
    };
    Some(factor)
}

/// Thresholds and defaults applied while converting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitPolicy {
    pub u_factor_si_threshold: f64,
    pub fraction_percent_threshold: f64,
    pub default_system: UnitSystem,
}

impl Default for UnitPolicy {
    fn default() -> Self {
        Self {
            u_factor_si_threshold: DEFAULT_U_THRESHOLD,
            fraction_percent_threshold: DEFAULT_PERCENT_THRESHOLD,
            default_system: UnitSystem::Ip,
        }
    }
}

/// Outcome of a single conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Converted {
    pub value: f64,
    /// The magnitude heuristic picked the unit.
    pub heuristic: bool,
    /// A unit hint was present but not understood; the default was used.
    pub unknown_hint: bool,
}

impl Converted {
    fn exact(value: f64) -> Self {
        Self {
            value,
            heuristic: false,
            unknown_hint: false,
        }
    }
}

/// Convert a source value to SI.
pub fn to_si(quantity: Quantity, value: f64, hint: Option<&str>, policy: &UnitPolicy) -> Converted {
    let hint = hint.map(str::trim).filter(|h| !h.is_empty());

    if quantity == Quantity::TemperatureF {
        return match hint.map(normalize_hint).as_deref() {
            Some("f" | "degf" | "fahrenheit" | "ip") => Converted::exact(f_to_c(value)),
            Some("c" | "degc" | "celsius" | "si") => Converted::exact(value),
            Some(_) => Converted {
                unknown_hint: true,
                ..default_conversion(quantity, value, policy)
            },
            None => default_conversion(quantity, value, policy),
        };
    }

    match hint {
        Some(h) => match hint_factor(quantity, h) {
            Some(factor) => Converted::exact(value * factor),
            None if quantity.ip_factor().is_none() && !quantity.uses_heuristic() => {
                // Unitless quantities ignore decorative hints such as "deg".
                Converted::exact(value)
            }
            None => Converted {
                unknown_hint: true,
                ..default_conversion(quantity, value, policy)
            },
        },
        None => default_conversion(quantity, value, policy),
    }
}

fn default_conversion(quantity: Quantity, value: f64, policy: &UnitPolicy) -> Converted {
    match quantity {
        Quantity::UFactor => Converted {
            value: u_to_si_with_threshold(value, "", policy.u_factor_si_threshold),
            heuristic: true,
            unknown_hint: false,
        },
        Quantity::Fraction => Converted {
            value: percent_to_fraction(value, policy.fraction_percent_threshold),
            heuristic: value > policy.fraction_percent_threshold,
            unknown_hint: false,
        },
        Quantity::TemperatureF if policy.default_system == UnitSystem::Ip => {
            Converted::exact(f_to_c(value))
        }
        _ => match (policy.default_system, quantity.ip_factor()) {
            (UnitSystem::Ip, Some(factor)) => Converted::exact(value * factor),
            _ => Converted::exact(value),
        },
    }
}

/// Convert a canonical SI value back to a dialect's default unit system.
pub fn from_si(quantity: Quantity, value: f64, system: UnitSystem) -> f64 {
    if system == UnitSystem::Si {
        return value;
    }
    match quantity {
        Quantity::TemperatureF => c_to_f(value),
        _ => match quantity.ip_factor() {
            Some(factor) => value / factor,
            None => value,
        },
    }
}

/// Label written next to heuristic-governed values so that re-reading
/// never depends on the heuristic.
pub fn explicit_unit_label(quantity: Quantity, system: UnitSystem) -> Option<&'static str> {
    match (quantity, system) {
        (Quantity::UFactor, UnitSystem::Ip) => Some("IP"),
        (Quantity::UFactor, UnitSystem::Si) => Some("SI"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_conversions() {
        assert!((u_to_si(1.0, "IP") - 5.678263).abs() < 1e-6);
        assert_eq!(ft_to_m(1.0), 0.3048);
        assert!((gal_to_l(1.0) - 3.78541).abs() < 1e-5);
        assert!((f_to_c(212.0) - 100.0).abs() < 1e-9);
        assert!((c_to_f(f_to_c(70.0)) - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_u_factor_threshold_is_1_5() {
        // At or below the threshold the value is kept as SI.
        assert_eq!(u_to_si(1.5, ""), 1.5);
        assert_eq!(u_to_si(0.32, ""), 0.32);
        // Above it the value is converted from IP.
        assert!((u_to_si(2.0, "") - 2.0 * U_IP_TO_SI).abs() < 1e-9);
    }

    #[test]
    fn test_explicit_unit_beats_heuristic() {
        assert!((u_to_si(0.32, "IP") - 0.32 * U_IP_TO_SI).abs() < 1e-9);
        assert!((u_to_si(0.32, "Btu/hr-ft2-F") - 0.32 * U_IP_TO_SI).abs() < 1e-9);
        assert_eq!(u_to_si(3.5, "SI"), 3.5);
        assert_eq!(u_to_si(3.5, "W/m²K"), 3.5);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let policy = UnitPolicy {
            u_factor_si_threshold: 1.0,
            ..UnitPolicy::default()
        };
        let c = to_si(Quantity::UFactor, 1.2, None, &policy);
        assert!(c.heuristic);
        assert!((c.value - 1.2 * U_IP_TO_SI).abs() < 1e-9);
    }

    #[test]
    fn test_area_with_explicit_hint() {
        let policy = UnitPolicy::default();
        let c = to_si(Quantity::Area, 1000.0, Some("ft²"), &policy);
        assert!((c.value - 92.903).abs() < 1e-3);
        assert!(!c.heuristic);

        let c = to_si(Quantity::Area, 12.5, Some("m2"), &policy);
        assert_eq!(c.value, 12.5);
    }

    #[test]
    fn test_dialect_default_units() {
        let ip = UnitPolicy::default();
        assert!((to_si(Quantity::Area, 100.0, None, &ip).value - 9.290304).abs() < 1e-9);

        let si = UnitPolicy {
            default_system: UnitSystem::Si,
            ..UnitPolicy::default()
        };
        assert_eq!(to_si(Quantity::Area, 100.0, None, &si).value, 100.0);
    }

    #[test]
    fn test_unknown_hint_falls_back() {
        let c = to_si(Quantity::Area, 10.0, Some("furlongs2"), &UnitPolicy::default());
        assert!(c.unknown_hint);
        assert!((c.value - 10.0 * FT2_TO_M2).abs() < 1e-9);
    }

    #[test]
    fn test_fraction_percent_heuristic() {
        let policy = UnitPolicy::default();
        let c = to_si(Quantity::Fraction, 45.0, None, &policy);
        assert!(c.heuristic);
        assert!((c.value - 0.45).abs() < 1e-12);

        let c = to_si(Quantity::Fraction, 0.45, None, &policy);
        assert!(!c.heuristic);
        assert_eq!(c.value, 0.45);
    }

    #[test]
    fn test_from_si_inverts_default() {
        let policy = UnitPolicy::default();
        for q in [Quantity::Area, Quantity::LengthIn, Quantity::VolumeGal, Quantity::TemperatureF] {
            let si = to_si(q, 42.0, None, &policy).value;
            assert!((from_si(q, si, UnitSystem::Ip) - 42.0).abs() < 1e-9, "{:?}", q);
        }
    }

    #[test]
    fn test_power_hints() {
        let policy = UnitPolicy::default();
        let c = to_si(Quantity::PowerBtuh, 3.0, Some("tons"), &policy);
        assert!((c.value - 3.0 * TON_TO_W).abs() < 1e-6);
        let c = to_si(Quantity::PowerKw, 4.2, None, &policy);
        assert!((c.value - 4200.0).abs() < 1e-9);
    }
}
