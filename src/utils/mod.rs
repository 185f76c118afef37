//! Utility module.
//!
//! Formatting helpers used in log output.
/// Amount formatting
pub mod format;

pub use format::format_minor_units;
