//! Per-item normalization errors.

use thiserror::Error;

/// A raw item could not be turned into a listing.
///
/// These never abort a run: the item is logged and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No path in the field map produced a usable value
    #[error("missing field: {field}")]
    MissingField {
        /// Canonical field name
        field: &'static str,
    },

    /// A value was present but unusable
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Canonical field name
        field: &'static str,
        /// The offending value, as JSON
        value: String,
    },
}
