//! Unit parsing and conversion for graphex.
//!
//! Metric series carry a `unit` tag such as `"b"`, `"GiB/h"` or `"Pckt/s"`.
//! This crate parses those strings into a structured [`UnitInfo`] and computes
//! which other unit strings are convertible into a requested unit, together
//! with the numeric scale factor and any calculus operation (derivative or
//! integral) required to make the series comparable.
//!
//! Parsing never fails: a string that matches no known unit class degrades to
//! an opaque pass-through unit that is still compatible with itself and its
//! own scale-prefix variants. Only the standalone numeric literal parser
//! ([`parse_number_with_prefix`]) returns errors.

#![warn(missing_docs)]

mod convert;
mod parse;

pub use self::convert::*;
pub use self::parse::*;

use thiserror::Error;

/// SI scale prefixes, in powers of 1000.
pub(crate) const PREFIXES_SI: &[(&str, f64)] = &[
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
];

/// IEC scale prefixes, in powers of 1024.
///
/// These must be tried before the SI prefixes: `Ki` would otherwise be
/// consumed as `k` + `i`.
pub(crate) const PREFIXES_IEC: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
];

/// Units that must never be interpreted as carrying a scale prefix.
///
/// `Pckt` is the unit "packet", not peta-"ckt".
pub(crate) const SPECIAL_UNITS: &[&str] = &["Pckt", "Msg", "Metric", "Ticket"];

/// Known unit classes. The first unit of each class is the primary (smallest)
/// unit; multipliers are relative to it.
pub(crate) const UNIT_CLASSES: &[(&str, &[(&str, f64)])] = &[
    (
        "time",
        &[
            ("s", 1.0),
            ("M", 60.0),
            ("h", 3600.0),
            ("d", 86400.0),
            ("w", 604800.0),
            // 30-day month
            ("mo", 2592000.0),
        ],
    ),
    ("datasize", &[("b", 1.0), ("B", 8.0)]),
];

/// Returns the unit table of a class, if the class is known.
pub(crate) fn class_units(unit_class: &str) -> Option<&'static [(&'static str, f64)]> {
    UNIT_CLASSES
        .iter()
        .find(|(name, _)| *name == unit_class)
        .map(|(_, units)| *units)
}

/// An error returned when a numeric literal cannot be parsed.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum UnitError {
    /// The string is neither a number nor a number followed by a known scale
    /// prefix.
    #[error("I didn't understand '{0}'")]
    UnparseableNumber(String),
}
