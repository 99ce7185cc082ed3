//! Error taxonomy for the trajectory core.

use thiserror::Error;

/// Errors produced by normalization, regression, and classification.
///
/// "Not enough data yet" is never an error: those states are sentinel
/// values on the outputs. Everything here is either malformed input or a
/// broken invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrajectoryError {
    /// A period label does not name a training year of 1 or more.
    #[error("malformed period label {label:?}: {reason}")]
    MalformedPeriodLabel { label: String, reason: &'static str },

    /// Two records resolved to the same training year.
    #[error("duplicate records for year index {year_index} ({first:?} and {second:?})")]
    DuplicateYear {
        year_index: u32,
        first: String,
        second: String,
    },

    /// A percentile outside [0, 100] or not finite.
    #[error("percentile {value} for period {label:?} is outside [0, 100]")]
    PercentileOutOfRange { label: String, value: f64 },

    /// Regression was asked to fit an empty point set.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// An archetype id that the active catalog does not define.
    #[error("unknown archetype id: {0}")]
    UnknownArchetype(String),

    /// A score series reached the classifier in violation of its contract.
    #[error("invalid score series: {0}")]
    InvalidSeries(String),

    /// A catalog failed validation.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// The engine configuration file could not be read or parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, TrajectoryError>;
