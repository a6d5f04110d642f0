//! Graph building for the graphex metrics explorer.
//!
//! Matched metrics become [`Target`]s, targets are bucketed into [`Graph`]s
//! by the query's `GROUP BY` specs, aggregated within each graph by the
//! `sum by` and `avg by` specs, and finally rewritten by the query's target
//! modifiers (unit conversion, counter derivation) and any environment
//! [`GraphOptions`].
//!
//! The entry point is [`GraphBuilder::build`], which takes the matched
//! subset of the metric store and returns finished graphs keyed by their
//! group key.

#![warn(missing_docs)]

mod aggregate;
mod builder;
mod keys;
mod options;
mod target;

pub use self::aggregate::*;
pub use self::builder::*;
pub use self::keys::*;
pub use self::options::*;
pub use self::target::*;
