//! Error types.

use thiserror::Error;

/// Invalid suite configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("section is a per-entry policy and cannot be the suite default")]
    SectionPolicy,
}
