use std::collections::BTreeMap;

use graphex_match::MatchExpr;
use graphex_units::{
    Conversion, ConversionOptions, PrefixClass, determine_compatible_units, parse_unitname,
    prefix_class_for,
};
use serde::{Deserialize, Serialize};

/// A rendering instruction attached to a query, applied to every matched
/// target (in registration order) during graph building.
///
/// Modifiers are plain data; the application logic lives with the graph
/// builder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TargetModifier {
    /// Convert a target from its actual unit into the requested one, using
    /// the compatible-units map computed at parse time.
    ConvertUnit {
        /// Actual unit → conversion into the requested unit.
        compatibles: BTreeMap<String, Conversion>,
        /// The requested unit with scale prefixes stripped.
        base_unit: String,
    },
    /// Overwrite the target's `unit` tag with the requested base unit, for
    /// consistent display after conversion.
    RelabelUnit {
        /// The requested unit with scale prefixes stripped.
        base_unit: String,
    },
    /// Display the graph with IEC-style (binary) axis suffixes.
    BinarySuffixes,
    /// Default behavior without an explicit `unit=` clause: apply a
    /// non-negative derivative to targets whose `target_type` is `counter`,
    /// making counters directly graphable.
    DeriveCounters,
}

/// Rewrites `unit=` equality nodes into a disjunction over all compatible
/// units and returns the target modifiers implementing the conversion.
///
/// Only the root node and one level below a root `AND`/`OR` are examined.
/// Without any `unit=` clause the returned modifiers default to
/// [`TargetModifier::DeriveCounters`].
pub fn allow_compatible_units(ast: &mut MatchExpr) -> Vec<TargetModifier> {
    let mut modifiers = Vec::new();

    let mut found = rewrite_unit_equality(ast, &mut modifiers);
    if !found {
        if let MatchExpr::And { inner } | MatchExpr::Or { inner } = ast {
            for node in inner.iter_mut() {
                if rewrite_unit_equality(node, &mut modifiers) {
                    found = true;
                    break;
                }
            }
        }
    }

    if !found {
        modifiers.push(TargetModifier::DeriveCounters);
    }

    modifiers
}

fn rewrite_unit_equality(node: &mut MatchExpr, modifiers: &mut Vec<TargetModifier>) -> bool {
    match node {
        MatchExpr::TagEquality { key, term } if key == "unit" => {
            let info = parse_unitname(term, false);
            let options = ConversionOptions {
                allow_derivation: true,
                allow_integration: true,
                allow_prefixes_in_denominator: false,
            };
            let compatibles = determine_compatible_units(&info, &options);

            let inner = compatibles
                .keys()
                .map(|unit| MatchExpr::TagEquality {
                    key: "unit".to_owned(),
                    term: unit.clone(),
                })
                .collect();

            modifiers.push(TargetModifier::ConvertUnit {
                compatibles,
                base_unit: info.base_unit.clone(),
            });
            modifiers.push(TargetModifier::RelabelUnit {
                base_unit: info.base_unit.clone(),
            });
            if prefix_class_for(info.scale_multiplier) == PrefixClass::Binary {
                modifiers.push(TargetModifier::BinarySuffixes);
            }

            *node = MatchExpr::Or { inner };
            true
        }
        _ => false,
    }
}
