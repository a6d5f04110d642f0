//! The graphex query language.
//!
//! A query is one line of free text such as:
//!
//! ```text
//! stack from -2hours sum by core server=web1 unit=B cpu
//! ```
//!
//! Recognized clauses (`from`, `to`, `GROUP BY`/`group by`, `sum by`,
//! `avg by`, `avg over`, `min`, `max`, `limit`, a leading statement keyword
//! and a trailing `|| events` section) may appear anywhere in the string and
//! are located by search-and-remove; whatever tokens remain become match
//! patterns compiled into a [`MatchExpr`](graphex_match::MatchExpr) tree.
//!
//! The special `unit=` pattern expands into a disjunction over all
//! convertible units and registers [`TargetModifier`]s that scale, derive or
//! integrate matched series into the requested unit during graph building.

#![warn(missing_docs)]

mod ast;
mod modifiers;
mod parse;
mod query;

pub use self::ast::*;
pub use self::modifiers::*;
pub use self::query::*;

use thiserror::Error;

/// An error returned when a query cannot be parsed.
///
/// Most of the query language degrades on a best-effort basis instead of
/// failing; only user-supplied numeric bounds are validated strictly.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A `min` or `max` bound is not a number with an optional scale prefix.
    #[error(transparent)]
    Number(#[from] graphex_units::UnitError),
}
