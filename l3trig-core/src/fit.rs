//! Fit status types.
//!
//! Fits never abort an event. A failed fit is reported as a [`FitFailure`]
//! and the affected candidate is dropped by the caller; the longitudinal
//! part of a helix is allowed to be unavailable while the transverse part
//! is still published.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason a fit produced no usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FitFailure {
    /// Fewer points than the fit needs.
    #[error("too few points ({found} < {required})")]
    TooFewPoints { found: usize, required: usize },
    /// The normal equations had no finite solution.
    #[error("singular fit")]
    Singular,
    /// Fitted curvature above the transverse-momentum limit.
    #[error("curvature out of range")]
    CurvatureOutOfRange,
    /// Fitted impact parameter above the configured limit.
    #[error("impact parameter out of range")]
    ImpactOutOfRange,
}

/// Longitudinal (s-z) part of a helix.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Longitudinal {
    /// Line fit of z versus transverse arclength succeeded.
    Fitted {
        /// z at the point of closest approach (cm).
        dz: f64,
        /// Tangent of the dip angle.
        tan_lambda: f64,
        /// Chi-square of the line fit.
        chi2: f64,
        /// Number of points kept after outlier rejection.
        n_points: usize,
    },
    /// No usable s-z information.
    Unavailable(FitFailure),
}

impl Longitudinal {
    /// z impact parameter, if fitted.
    #[must_use]
    pub fn dz(&self) -> Option<f64> {
        match self {
            Self::Fitted { dz, .. } => Some(*dz),
            Self::Unavailable(_) => None,
        }
    }

    /// Tangent of the dip angle, if fitted.
    #[must_use]
    pub fn tan_lambda(&self) -> Option<f64> {
        match self {
            Self::Fitted { tan_lambda, .. } => Some(*tan_lambda),
            Self::Unavailable(_) => None,
        }
    }

    /// Returns true if the line fit succeeded.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        matches!(self, Self::Fitted { .. })
    }
}

impl Default for Longitudinal {
    fn default() -> Self {
        Self::Unavailable(FitFailure::TooFewPoints {
            found: 0,
            required: 2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longitudinal_accessors() {
        let fitted = Longitudinal::Fitted {
            dz: 1.5,
            tan_lambda: -0.25,
            chi2: 0.1,
            n_points: 12,
        };
        assert_eq!(fitted.dz(), Some(1.5));
        assert_eq!(fitted.tan_lambda(), Some(-0.25));
        assert!(fitted.is_fitted());

        let missing = Longitudinal::default();
        assert_eq!(missing.dz(), None);
        assert!(!missing.is_fitted());
    }

    #[test]
    fn test_fit_failure_display() {
        let failure = FitFailure::TooFewPoints {
            found: 1,
            required: 2,
        };
        assert_eq!(failure.to_string(), "too few points (1 < 2)");
    }

    #[test]
    fn test_fit_failure_is_error() {
        let boxed: Box<dyn std::error::Error> = Box::new(FitFailure::ImpactOutOfRange);
        assert_eq!(boxed.to_string(), "impact parameter out of range");
        assert!(boxed.source().is_none());
        assert_eq!(FitFailure::Singular.to_string(), "singular fit");
    }
}
