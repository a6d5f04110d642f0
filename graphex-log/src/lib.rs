//! Logging facade for graphex.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The
//! configuration implements `serde` traits, so it can be obtained from
//! configuration files.
//!
//! ```
//! use graphex_log::LogConfig;
//!
//! graphex_log::init(&LogConfig::default());
//! ```
//!
//! # Logging
//!
//! The basic use of this crate is through the five logging macros: [`error!`],
//! [`warn!`], [`info!`], [`debug!`] and [`trace!`] where `error!` represents
//! the highest-priority log messages and `trace!` the lowest.
//!
//! Log messages should start lowercase and end without punctuation. Prefer
//! short and precise log messages over verbose text.
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`]
//! that should be called at the beginning of a test. It routes events into
//! the test harness's capture buffer and restricts them to the calling
//! crate.
//!
//! ```
//! #[test]
//! fn test_something() {
//!     graphex_log::init_test!();
//! }
//! ```

#![warn(missing_docs)]

mod setup;
pub use setup::*;

mod test;
pub use test::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};
