//! Output records published to the decision stage.

use crate::config::ALPHA;
use crate::fit::Longitudinal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A reconstructed track, described as a helix about the origin.
///
/// The transverse part is always present; the longitudinal part may be
/// unavailable when too few stereo hits were linked.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackRecord {
    /// Signed transverse distance of closest approach to the origin (cm).
    pub impact: f64,
    /// Azimuth of the track direction at closest approach (rad).
    pub phi: f64,
    /// Signed curvature 1/R (1/cm); positive bends clockwise.
    pub curvature: f64,
    /// z impact and dip angle.
    pub longitudinal: Longitudinal,
    /// Number of points used by the transverse fit.
    pub n_transverse: usize,
    /// Chi-square of the transverse fit.
    pub chi2: f64,
}

impl TrackRecord {
    /// Transverse momentum in GeV/c.
    #[must_use]
    pub fn pt(&self) -> f64 {
        if self.curvature == 0.0 {
            f64::INFINITY
        } else {
            1.0 / (ALPHA * self.curvature.abs())
        }
    }

    /// Signed inverse transverse momentum (the helix `kappa`).
    #[must_use]
    pub fn kappa(&self) -> f64 {
        ALPHA * self.curvature
    }

    /// Charge sign implied by the bending direction in a field along +z.
    #[must_use]
    pub fn charge(&self) -> i8 {
        if self.curvature < 0.0 {
            -1
        } else {
            1
        }
    }
}

/// A calorimeter cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterRecord {
    /// Summed energy (GeV).
    pub energy: f64,
    /// Energy of the seed crystal (GeV).
    pub seed_energy: f64,
    /// Id of the seed crystal.
    pub seed: u32,
    /// Position of the seed crystal (cm).
    pub seed_position: [f64; 3],
    /// Energy-weighted centroid of all members (cm).
    pub centroid: [f64; 3],
    /// Number of member crystals.
    pub n_crystals: usize,
}

/// Everything the trigger produced for one event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventRecord {
    /// Event number copied from the input.
    pub event: u64,
    /// Reconstructed tracks.
    pub tracks: Vec<TrackRecord>,
    /// Reconstructed clusters.
    pub clusters: Vec<ClusterRecord>,
    /// Event vertex, when at least two tracks allowed an estimate.
    pub vertex: Option<[f64; 3]>,
    /// Event-timing correction applied to drift times (ns).
    pub event_timing: f64,
}
