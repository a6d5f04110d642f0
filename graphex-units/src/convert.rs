use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{PREFIXES_IEC, PREFIXES_SI, UnitInfo, class_units};

/// A calculus operation required to make two units comparable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvOp {
    /// Derive the series with respect to time, turning a gauge into a rate.
    Derive,
    /// Integrate the series over time, turning a rate into a total.
    Integrate,
}

/// How to convert a series from one unit into the requested unit.
///
/// `value_in_requested_units = multiplier * value`, after applying `op` to
/// the series first if one is present.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    /// The scale factor into the requested unit.
    pub multiplier: f64,
    /// The calculus operation to apply before scaling, if any.
    pub op: Option<ConvOp>,
}

/// Options for [`determine_compatible_units`].
#[derive(Clone, Copy, Debug)]
pub struct ConversionOptions {
    /// Allow matching gauges whose derivative yields the requested rate.
    pub allow_derivation: bool,
    /// Allow matching rates whose integral yields the requested unit.
    pub allow_integration: bool,
    /// Allow scale prefixes on denominator units (`B/ks`).
    pub allow_prefixes_in_denominator: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            allow_derivation: true,
            allow_integration: false,
            allow_prefixes_in_denominator: false,
        }
    }
}

/// Every simple unit compatible with the given one: the units of its class
/// (or just the unit itself for unknown classes), optionally combined with
/// every scale prefix. Factors are relative to the class's primary unit.
fn compat_simple_units(
    unit_class: Option<&str>,
    base_unit: &str,
    allow_prefixes: bool,
) -> Vec<(String, f64)> {
    let units: Vec<(&str, f64)> = match unit_class.and_then(class_units) {
        Some(units) => units.to_vec(),
        None => vec![(base_unit, 1.0)],
    };

    let mut compat = Vec::new();
    for &(unit, factor) in &units {
        compat.push((unit.to_owned(), factor));
        if allow_prefixes {
            for &(prefix, multiplier) in PREFIXES_IEC.iter().chain(PREFIXES_SI) {
                compat.push((format!("{prefix}{unit}"), multiplier * factor));
            }
        }
    }
    compat
}

/// Computes all unit strings convertible into the requested unit.
///
/// Returns a map from unit string to the [`Conversion`] that turns a series
/// expressed in that unit into the requested one. The requested unit's own
/// `multiplier` determines the target: callers that parsed with
/// `fold_scale_prefix = false` get conversions into the prefixless base unit
/// and are expected to render the prefix through axis suffixes.
pub fn determine_compatible_units(
    info: &UnitInfo,
    options: &ConversionOptions,
) -> BTreeMap<String, Conversion> {
    let requested = info.multiplier;
    let numer_units =
        compat_simple_units(info.numer.unit_class.as_deref(), &info.numer.base_unit, true);

    let mut compatibles = BTreeMap::new();

    match &info.denom {
        None => {
            for (unit, factor) in &numer_units {
                compatibles.insert(
                    unit.clone(),
                    Conversion {
                        multiplier: factor / requested,
                        op: None,
                    },
                );
            }

            if options.allow_integration {
                // No scale prefix is allowed on the time denominator here.
                let time_units = compat_simple_units(Some("time"), "s", false);
                for (unit, factor) in &numer_units {
                    for (time_unit, time_factor) in &time_units {
                        compatibles.insert(
                            format!("{unit}/{time_unit}"),
                            Conversion {
                                multiplier: (factor / time_factor) / requested,
                                op: Some(ConvOp::Integrate),
                            },
                        );
                    }
                }
            }
        }
        Some(denom) => {
            if options.allow_derivation && denom.unit_class.as_deref() == Some("time") {
                // If deriving this gauge with respect to time produces the
                // requested rate, the bare numerator unit is compatible.
                for (unit, factor) in &numer_units {
                    compatibles.insert(
                        unit.clone(),
                        Conversion {
                            multiplier: factor / requested,
                            op: Some(ConvOp::Derive),
                        },
                    );
                }
            }

            let denom_units = compat_simple_units(
                denom.unit_class.as_deref(),
                &denom.base_unit,
                options.allow_prefixes_in_denominator,
            );
            for (unit, factor) in &numer_units {
                for (denom_unit, denom_factor) in &denom_units {
                    compatibles.insert(
                        format!("{unit}/{denom_unit}"),
                        Conversion {
                            multiplier: (factor / denom_factor) / requested,
                            op: None,
                        },
                    );
                }
            }
        }
    }

    compatibles
}

/// The display class of a scale multiplier, used to pick axis suffixes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefixClass {
    /// IEC-style axis labels (Ki, Mi, ...).
    Binary,
    /// SI-style axis labels (k, M, ...).
    Si,
}

/// Returns [`PrefixClass::Binary`] if the multiplier is an integer power of
/// two greater than one, [`PrefixClass::Si`] otherwise.
pub fn prefix_class_for(multiplier: f64) -> PrefixClass {
    if multiplier > 1.0
        && multiplier.fract() == 0.0
        && multiplier <= u64::MAX as f64
        && (multiplier as u64).is_power_of_two()
    {
        PrefixClass::Binary
    } else {
        PrefixClass::Si
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use crate::parse_unitname;

    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let ratio = actual / expected;
        assert!(
            (ratio - 1.0).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_self_compatibility() {
        for unit in ["b", "B", "kb", "GiB/h", "Pckt/s", "Req"] {
            let info = parse_unitname(unit, true);
            let compatibles =
                determine_compatible_units(&info, &ConversionOptions::default());
            let conversion = compatibles
                .get(unit)
                .unwrap_or_else(|| panic!("{unit} not compatible with itself"));
            assert_close(conversion.multiplier, 1.0);
            assert_eq!(conversion.op, None);
        }
    }

    #[test]
    fn test_straightforward_conversion() {
        // Requesting bytes when the data is in bits.
        let info = parse_unitname("B", true);
        let compatibles = determine_compatible_units(&info, &ConversionOptions::default());
        let conversion = compatibles.get("b").unwrap();
        assert_eq!(conversion.multiplier, 0.125);
        assert_eq!(conversion.op, None);
    }

    #[test]
    fn test_compound_conversion_with_derivation() {
        // Requesting MiB/d when the data exists as a kb gauge: the
        // derivative of the gauge, scaled by 86400 * 1000 / 8, yields the
        // prefixless B/d (the Mi prefix is handled by axis suffixes).
        let info = parse_unitname("MiB/d", false);
        let compatibles = determine_compatible_units(&info, &ConversionOptions::default());
        let conversion = compatibles.get("kb").unwrap();
        assert_close(conversion.multiplier, 10_800_000.0);
        assert_eq!(conversion.op, Some(ConvOp::Derive));
    }

    #[test]
    fn test_integration_entries() {
        let info = parse_unitname("B", true);
        let options = ConversionOptions {
            allow_integration: true,
            ..Default::default()
        };
        let compatibles = determine_compatible_units(&info, &options);

        // Integrating a b/h rate and scaling by 1 / (3600 * 8) yields bytes.
        let conversion = compatibles.get("b/h").unwrap();
        assert_close(conversion.multiplier, 1.0 / (3600.0 * 8.0));
        assert_eq!(conversion.op, Some(ConvOp::Integrate));

        // No prefixed denominators in the integration case.
        assert!(!compatibles.keys().any(|key| key.ends_with("/ks")));
    }

    #[test]
    fn test_no_derivation_for_non_time_denominator() {
        let info = parse_unitname("B/Req", true);
        let compatibles = determine_compatible_units(&info, &ConversionOptions::default());
        assert!(!compatibles.contains_key("B"));
        assert!(compatibles.contains_key("B/Req"));
    }

    #[test]
    fn test_unknown_unit_prefix_variants() {
        let info = parse_unitname("Req", true);
        let compatibles = determine_compatible_units(&info, &ConversionOptions::default());
        let conversion = compatibles.get("kReq").unwrap();
        assert_eq!(conversion.multiplier, 1000.0);
    }

    #[test]
    fn test_conversion_serde_preserves_multipliers() {
        // Many multipliers have no short decimal form (the Mb/d entry is
        // 125000.00000000001); the JSON parser must reproduce them exactly.
        let info = parse_unitname("MiB/d", false);
        let compatibles = determine_compatible_units(&info, &ConversionOptions::default());

        let json = serde_json::to_string(&compatibles).unwrap();
        let back: BTreeMap<String, Conversion> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, compatibles);
    }

    #[test]
    fn test_prefix_class() {
        assert_eq!(prefix_class_for(1_048_576.0), PrefixClass::Binary);
        assert_eq!(prefix_class_for(1024.0), PrefixClass::Binary);
        assert_eq!(prefix_class_for(1000.0), PrefixClass::Si);
        assert_eq!(prefix_class_for(1.0), PrefixClass::Si);
        assert_eq!(prefix_class_for(0.5), PrefixClass::Si);
    }
}
