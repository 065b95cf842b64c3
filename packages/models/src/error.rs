//! Error kinds shared by the detection engines.
//!
//! [`DetectionError`] is what the engines return. When a single
//! surveillance step fails, the error is turned into a [`StepFailure`] and
//! recorded in place of that step's result so the run can continue.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Errors that can occur while aggregating data or running a detector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    /// A case or district lacks required reference data.
    #[error("Missing reference data: {message}")]
    MissingReferenceData {
        /// Description of what is missing.
        message: String,
    },

    /// Not enough history to invert the covariance matrix.
    #[error(
        "Singular covariance: {observations} observations for {dimensions} dimensions (need more observations than dimensions)"
    )]
    SingularCovariance {
        /// Number of baseline observations.
        observations: usize,
        /// Number of dimensions (states).
        dimensions: usize,
    },

    /// Every candidate cluster had zero expected count under the null.
    #[error("Degenerate zone: {message}")]
    DegenerateZone {
        /// Description of the degenerate case.
        message: String,
    },

    /// The run configuration is malformed.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Description of the problem.
        message: String,
    },
}

impl DetectionError {
    /// Shorthand for [`DetectionError::MissingReferenceData`].
    pub fn missing(message: impl Into<String>) -> Self {
        Self::MissingReferenceData {
            message: message.into(),
        }
    }

    /// Shorthand for [`DetectionError::DegenerateZone`].
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateZone {
            message: message.into(),
        }
    }

    /// Shorthand for [`DetectionError::InvalidConfiguration`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// The serializable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::MissingReferenceData { .. } => FailureKind::MissingReferenceData,
            Self::SingularCovariance { .. } => FailureKind::SingularCovariance,
            Self::DegenerateZone { .. } => FailureKind::DegenerateZone,
            Self::InvalidConfiguration { .. } => FailureKind::InvalidConfiguration,
        }
    }
}

/// Serializable discriminant of [`DetectionError`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// See [`DetectionError::MissingReferenceData`].
    MissingReferenceData,
    /// See [`DetectionError::SingularCovariance`].
    SingularCovariance,
    /// See [`DetectionError::DegenerateZone`].
    DegenerateZone,
    /// See [`DetectionError::InvalidConfiguration`].
    InvalidConfiguration,
}

/// A recorded per-step failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Which kind of error occurred.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&DetectionError> for StepFailure {
    fn from(err: &DetectionError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<DetectionError> for StepFailure {
    fn from(err: DetectionError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_covariance_message() {
        let err = DetectionError::SingularCovariance {
            observations: 3,
            dimensions: 3,
        };
        assert_eq!(
            err.to_string(),
            "Singular covariance: 3 observations for 3 dimensions (need more observations than dimensions)"
        );
        assert_eq!(err.kind(), FailureKind::SingularCovariance);
    }

    #[test]
    fn failure_kind_strings() {
        assert_eq!(FailureKind::DegenerateZone.to_string(), "degenerate_zone");
        assert_eq!(
            "missing_reference_data".parse::<FailureKind>().unwrap(),
            FailureKind::MissingReferenceData
        );
    }

    #[test]
    fn step_failure_from_error() {
        let failure = StepFailure::from(DetectionError::degenerate("all zones empty"));
        assert_eq!(failure.kind, FailureKind::DegenerateZone);
        assert_eq!(failure.message, "Degenerate zone: all zones empty");
    }
}
