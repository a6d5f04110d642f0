use serde::{Deserialize, Serialize};

use crate::{PREFIXES_IEC, PREFIXES_SI, SPECIAL_UNITS, UNIT_CLASSES, UnitError};

/// One side of a unit string: either the whole of a simple unit such as
/// `"GiB"`, or the numerator/denominator of a compound unit such as
/// `"GiB/h"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitSide {
    /// The unit with any scale prefix stripped.
    pub base_unit: String,
    /// The canonical (smallest) unit of the class, or `base_unit` for
    /// unknown classes.
    pub primary_unit: String,
    /// The unit class (`"time"`, `"datasize"`), if known.
    pub unit_class: Option<String>,
    /// Factor from `primary_unit` to this unit. Includes the scale prefix
    /// when parsed with `fold_scale_prefix`, excludes it otherwise.
    pub multiplier: f64,
    /// The scale prefix's own contribution. `1.0` when folded into
    /// `multiplier`.
    pub scale_multiplier: f64,
}

/// A parsed unit string.
///
/// For compound units the top-level fields combine both sides:
/// `unit_class` is `"numer/denom"` (or `None` if either side is unknown),
/// and `multiplier` is the numerator multiplier divided by the denominator
/// multiplier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitInfo {
    /// The unit with scale prefixes stripped, e.g. `"B/h"` for `"GiB/h"`.
    pub base_unit: String,
    /// The canonical unit, e.g. `"b/s"` for `"GiB/h"`.
    pub primary_unit: String,
    /// The combined unit class, e.g. `"datasize/time"`.
    pub unit_class: Option<String>,
    /// Factor from `primary_unit` to the requested unit.
    pub multiplier: f64,
    /// Combined scale-prefix contribution. `1.0` when folded.
    pub scale_multiplier: f64,
    /// The numerator side. Identical to the top-level fields for simple
    /// units.
    pub numer: UnitSide,
    /// The denominator side, for compound units.
    pub denom: Option<UnitSide>,
}

impl UnitInfo {
    /// Returns `true` if this unit has a time denominator, i.e. it is a rate.
    pub fn is_rate(&self) -> bool {
        self.denom
            .as_ref()
            .is_some_and(|d| d.unit_class.as_deref() == Some("time"))
    }
}

/// Splits a scale prefix off a unit string.
///
/// IEC prefixes are tried before SI prefixes since they are longer and would
/// otherwise be masked (`Ki` must not parse as `k` + `i`). The prefix must
/// consume at least one further character: a bare `"Ki"` is returned
/// unprefixed. Special units such as `"Pckt"` never lose a prefix.
fn split_prefix(name: &str) -> (f64, &str) {
    if SPECIAL_UNITS.contains(&name) {
        return (1.0, name);
    }

    for &(prefix, multiplier) in PREFIXES_IEC.iter().chain(PREFIXES_SI) {
        if let Some(rest) = name.strip_prefix(prefix) {
            if !rest.is_empty() {
                return (multiplier, rest);
            }
        }
    }

    (1.0, name)
}

fn parse_side(name: &str, fold_scale_prefix: bool) -> UnitSide {
    let (scale, base) = split_prefix(name);

    let mut unit_class = None;
    let mut primary = base;
    let mut multiplier = 1.0;
    for &(class, units) in UNIT_CLASSES {
        if let Some(&(_, factor)) = units.iter().find(|(unit, _)| *unit == base) {
            unit_class = Some(class.to_owned());
            primary = units[0].0;
            multiplier = factor;
            break;
        }
    }

    let (multiplier, scale_multiplier) = if fold_scale_prefix {
        (multiplier * scale, 1.0)
    } else {
        (multiplier, scale)
    };

    UnitSide {
        base_unit: base.to_owned(),
        primary_unit: primary.to_owned(),
        unit_class,
        multiplier,
        scale_multiplier,
    }
}

/// Treats the whole string as an unknown pass-through unit.
fn opaque(name: &str) -> UnitInfo {
    let side = UnitSide {
        base_unit: name.to_owned(),
        primary_unit: name.to_owned(),
        unit_class: None,
        multiplier: 1.0,
        scale_multiplier: 1.0,
    };

    UnitInfo {
        base_unit: name.to_owned(),
        primary_unit: name.to_owned(),
        unit_class: None,
        multiplier: 1.0,
        scale_multiplier: 1.0,
        numer: side,
        denom: None,
    }
}

/// Parses a unit string such as `"kb"`, `"GiB/h"` or `"Pckt/s"`.
///
/// With `fold_scale_prefix` the prefix is folded into `multiplier`;
/// otherwise it is reported separately in `scale_multiplier` so that callers
/// can handle it through axis suffix formatting instead of scaling the data.
///
/// This function does not fail. Malformed compound strings (more than one
/// `/`, or an empty numerator or denominator) are treated as opaque unknown
/// units with multiplier 1.
pub fn parse_unitname(unitname: &str, fold_scale_prefix: bool) -> UnitInfo {
    match unitname.split_once('/') {
        None => {
            let side = parse_side(unitname, fold_scale_prefix);
            UnitInfo {
                base_unit: side.base_unit.clone(),
                primary_unit: side.primary_unit.clone(),
                unit_class: side.unit_class.clone(),
                multiplier: side.multiplier,
                scale_multiplier: side.scale_multiplier,
                numer: side,
                denom: None,
            }
        }
        Some((numer, denom)) => {
            if numer.is_empty() || denom.is_empty() || denom.contains('/') {
                return opaque(unitname);
            }

            let numer = parse_side(numer, fold_scale_prefix);
            let denom = parse_side(denom, fold_scale_prefix);

            let unit_class = match (&numer.unit_class, &denom.unit_class) {
                (Some(n), Some(d)) => Some(format!("{n}/{d}")),
                _ => None,
            };

            UnitInfo {
                base_unit: format!("{}/{}", numer.base_unit, denom.base_unit),
                primary_unit: format!("{}/{}", numer.primary_unit, denom.primary_unit),
                unit_class,
                multiplier: numer.multiplier / denom.multiplier,
                scale_multiplier: numer.scale_multiplier / denom.scale_multiplier,
                numer,
                denom: Some(denom),
            }
        }
    }
}

/// Parses a numeric literal with an optional scale prefix, e.g. `"5k"` →
/// `5000.0` or `"2Ki"` → `2048.0`.
///
/// Unlike unit parsing this raises on input it cannot interpret, since it is
/// used to validate user-supplied `min`/`max` bounds.
pub fn parse_number_with_prefix(value: &str) -> Result<f64, UnitError> {
    if let Ok(number) = value.parse::<f64>() {
        return Ok(number);
    }

    for &(prefix, multiplier) in PREFIXES_IEC.iter().chain(PREFIXES_SI) {
        if let Some(number) = value.strip_suffix(prefix) {
            if let Ok(number) = number.parse::<f64>() {
                return Ok(number * multiplier);
            }
        }
    }

    Err(UnitError::UnparseableNumber(value.to_owned()))
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_parse_simple_prefixed() {
        let info = parse_unitname("Mb", true);
        assert_eq!(info.base_unit, "b");
        assert_eq!(info.primary_unit, "b");
        assert_eq!(info.unit_class.as_deref(), Some("datasize"));
        assert_eq!(info.multiplier, 1e6);
        assert_eq!(info.scale_multiplier, 1.0);
    }

    #[test]
    fn test_parse_unfolded_prefix() {
        let info = parse_unitname("GiB", false);
        assert_eq!(info.base_unit, "B");
        assert_eq!(info.multiplier, 8.0);
        assert_eq!(info.scale_multiplier, 1_073_741_824.0);
    }

    #[test]
    fn test_parse_compound() {
        let info = parse_unitname("GiB/h", true);
        assert_eq!(info.base_unit, "B/h");
        assert_eq!(info.primary_unit, "b/s");
        assert_eq!(info.unit_class.as_deref(), Some("datasize/time"));
        assert_eq!(info.multiplier, 1_073_741_824.0 * 8.0 / 3600.0);
        assert!(info.is_rate());
    }

    #[test]
    fn test_parse_compound_unfolded() {
        let info = parse_unitname("MiB/d", false);
        assert_eq!(info.multiplier, 8.0 / 86400.0);
        assert_eq!(info.scale_multiplier, 1_048_576.0);
    }

    #[test]
    fn test_special_units_keep_their_prefix() {
        let info = parse_unitname("Pckt", true);
        assert_eq!(info.base_unit, "Pckt");
        assert_eq!(info.multiplier, 1.0);
        assert_eq!(info.unit_class, None);

        let info = parse_unitname("Msg/s", true);
        assert_eq!(info.numer.base_unit, "Msg");
        assert_eq!(info.numer.multiplier, 1.0);
    }

    #[test]
    fn test_bare_prefix_is_a_unit() {
        // A prefix must consume at least one more character.
        let info = parse_unitname("Ki", true);
        assert_eq!(info.base_unit, "Ki");
        assert_eq!(info.multiplier, 1.0);
    }

    #[test]
    fn test_unknown_unit_with_prefix() {
        let info = parse_unitname("kReq", true);
        assert_eq!(info.base_unit, "Req");
        assert_eq!(info.unit_class, None);
        assert_eq!(info.multiplier, 1000.0);
    }

    #[test]
    fn test_malformed_compound_is_opaque() {
        for malformed in ["a/b/c", "/b", "a/", "/"] {
            let info = parse_unitname(malformed, true);
            assert_eq!(info.base_unit, malformed);
            assert_eq!(info.unit_class, None);
            assert_eq!(info.multiplier, 1.0);
            assert_eq!(info.denom, None);
        }
    }

    #[test]
    fn test_parse_number_with_prefix() {
        assert_eq!(parse_number_with_prefix("5"), Ok(5.0));
        assert_eq!(parse_number_with_prefix("5k"), Ok(5000.0));
        assert_eq!(parse_number_with_prefix("2Ki"), Ok(2048.0));
        assert_eq!(parse_number_with_prefix("1.5M"), Ok(1_500_000.0));
        assert_eq!(parse_number_with_prefix("-3"), Ok(-3.0));

        assert_eq!(
            parse_number_with_prefix("5x"),
            Err(UnitError::UnparseableNumber("5x".to_owned()))
        );
        assert_eq!(
            parse_number_with_prefix("Ki").unwrap_err().to_string(),
            "I didn't understand 'Ki'"
        );
    }
}
