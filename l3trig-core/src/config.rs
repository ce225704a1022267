//! Configuration consumed by the trigger.
//!
//! Geometry constants, drift-time parameters and tunable thresholds. Every
//! struct has a `Default` that reproduces the standard detector, plus
//! `with_*` builders for the values that are commonly tuned.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::missing_errors_doc
)]

use crate::error::{Error, Result};
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Curvature to inverse-momentum conversion, 1/(c·B) in cm·GeV at 1.5 T.
///
/// A track of transverse momentum `pt` (GeV/c) has radius `ALPHA * pt` (cm).
pub const ALPHA: f64 = 222.376_06;

/// Constants of one drift-chamber wire layer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerConfig {
    /// Sense-wire radius at z = 0 (cm).
    pub radius: f64,
    /// Number of sense wires in the layer.
    pub n_wires: u16,
    /// Stereo shift in half wire pitches; 0 for axial layers.
    pub shift: i16,
    /// Forward endplate z (cm).
    pub forward_z: f64,
    /// Backward endplate z (cm).
    pub backward_z: f64,
    /// Azimuthal offset of wire 0 in units of the wire pitch.
    pub offset: f64,
}

/// Whole drift-chamber geometry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChamberConfig {
    /// Layers ordered from the innermost outwards.
    pub layers: Vec<LayerConfig>,
    /// Known-bad wires as `(layer, wire)` pairs.
    pub dead_wires: Vec<(u16, u16)>,
}

impl Default for ChamberConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl ChamberConfig {
    /// The standard 56-layer chamber: one 8-layer axial superlayer followed
    /// by eight 6-layer superlayers alternating stereo and axial.
    #[must_use]
    pub fn standard() -> Self {
        // (layers, wires, shift) per superlayer
        const SUPERLAYERS: [(usize, u16, i16); 9] = [
            (8, 160, 0),
            (6, 160, 9),
            (6, 192, 0),
            (6, 224, -11),
            (6, 256, 0),
            (6, 288, 12),
            (6, 320, 0),
            (6, 352, -13),
            (6, 384, 0),
        ];

        let mut layers = Vec::with_capacity(56);
        for (sl, &(n_layers, n_wires, shift)) in SUPERLAYERS.iter().enumerate() {
            let (first_radius, spacing) = if sl == 0 {
                (16.8, 1.0)
            } else {
                (25.7 + (sl - 1) as f64 * 11.1, 1.8)
            };
            for local in 0..n_layers {
                let radius = first_radius + local as f64 * spacing;
                layers.push(LayerConfig {
                    radius,
                    n_wires,
                    shift,
                    forward_z: 40.0 + 1.05 * radius,
                    backward_z: -(18.0 + 0.48 * radius),
                    offset: if local % 2 == 0 { 0.0 } else { 0.5 },
                });
            }
        }

        Self {
            layers,
            dead_wires: Vec::new(),
        }
    }

    /// Marks a wire as permanently dead.
    #[must_use]
    pub fn with_dead_wire(mut self, layer: u16, wire: u16) -> Self {
        self.dead_wires.push((layer, wire));
        self
    }

    /// Checks the geometry for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::Config("chamber has no layers".into()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.n_wires < 3 {
                return Err(Error::Config(format!(
                    "layer {i} has {} wires, need at least 3",
                    layer.n_wires
                )));
            }
            if layer.radius.is_nan() || layer.radius <= 0.0 {
                return Err(Error::Config(format!("layer {i} has radius {}", layer.radius)));
            }
            if layer.forward_z <= layer.backward_z {
                return Err(Error::Config(format!(
                    "layer {i} endplates are inverted ({} <= {})",
                    layer.forward_z, layer.backward_z
                )));
            }
            if i > 0 && layer.radius <= self.layers[i - 1].radius {
                return Err(Error::Config(format!(
                    "layer {i} radius {} is not above layer {}",
                    layer.radius,
                    i - 1
                )));
            }
        }
        Ok(())
    }
}

/// Drift time to distance relation and acceptance window.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DriftConfig {
    /// Time offset subtracted before conversion (ns).
    pub t_offset: f64,
    /// Scale of the power-law x-t relation (cm / ns^exponent).
    pub xt_coeff: f64,
    /// Exponent of the power-law x-t relation.
    pub xt_exponent: f64,
    /// Earliest accepted drift time (ns).
    pub window_low: f64,
    /// Latest accepted drift time (ns).
    pub window_high: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            t_offset: -15.0,
            xt_coeff: 0.025,
            xt_exponent: 0.6,
            window_low: -400.0,
            window_high: 700.0,
        }
    }
}

impl DriftConfig {
    /// Returns true if `time` is inside the acceptance window.
    #[inline]
    #[must_use]
    pub fn accepts(&self, time: f64) -> bool {
        time >= self.window_low && time <= self.window_high
    }

    /// Drift distance for `time`, capped at half the cell size.
    #[must_use]
    pub fn distance(&self, time: f64, cell_size: f64) -> f64 {
        let t = time - self.t_offset;
        if t <= 0.0 {
            return 0.0;
        }
        (self.xt_coeff * t.powf(self.xt_exponent)).min(0.5 * cell_size)
    }

    /// Inverse of [`DriftConfig::distance`] below the cap.
    #[must_use]
    pub fn time(&self, distance: f64) -> f64 {
        if distance <= 0.0 {
            return self.t_offset;
        }
        self.t_offset + (distance / self.xt_coeff).powf(1.0 / self.xt_exponent)
    }

    /// Sets the acceptance window.
    #[must_use]
    pub fn with_window(mut self, low: f64, high: f64) -> Self {
        self.window_low = low;
        self.window_high = high;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.window_low >= self.window_high {
            return Err(Error::Config(format!(
                "drift window [{}, {}] is empty",
                self.window_low, self.window_high
            )));
        }
        let positive = |value: f64| value > 0.0;
        if !positive(self.xt_coeff) || !positive(self.xt_exponent) {
            return Err(Error::Config("x-t coefficients must be positive".into()));
        }
        Ok(())
    }
}

/// Tunable thresholds of the track finder.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackThresholds {
    /// Minimum transverse momentum (GeV/c); sets the curvature limit.
    pub min_pt: f64,
    /// Maximum transverse impact parameter (cm).
    pub max_impact: f64,
    /// Azimuth window between chained segments (rad).
    pub link_phi_window: f64,
    /// Seed value of the running chaining chi-square.
    pub initial_chain_chi2: f64,
    /// Acceptance window of the first chaining step.
    pub link_chi2_window: f64,
    /// Azimuth tolerance per row of distance when merging short segments,
    /// in wire pitches of the superlayer.
    pub short_merge_pitch: f64,
    /// Weight of the event vertex in the transverse refit.
    pub vertex_weight: f64,
    /// Minimum cosine of the salvage acceptance wedge.
    pub salvage_min_cos: f64,
    /// Maximum |z| at s = 0 implied by a stereo segment (cm).
    pub max_z0: f64,
    /// Maximum |tan(lambda)| implied by a stereo segment.
    pub max_tan_lambda: f64,
    /// Maximum deviation from the s-z trend when disambiguating (cm).
    pub stereo_trend_window: f64,
    /// Residual cuts of the two outlier-rejection rounds of the s-z fit (cm).
    pub sz_outlier_cuts: [f64; 2],
    /// Run the 3D vertex estimate at the end of the event.
    pub find_event_vertex: bool,
    /// Per-event time budget in microseconds, checked between stages.
    pub time_budget_us: Option<u64>,
}

impl Default for TrackThresholds {
    fn default() -> Self {
        Self {
            min_pt: 0.1,
            max_impact: 20.0,
            link_phi_window: 0.075 * PI,
            initial_chain_chi2: 3000.0,
            link_chi2_window: 4000.0,
            short_merge_pitch: 1.5,
            vertex_weight: 2.0,
            salvage_min_cos: std::f64::consts::FRAC_1_SQRT_2,
            max_z0: 50.0,
            max_tan_lambda: 3.0,
            stereo_trend_window: 10.0,
            sz_outlier_cuts: [8.0, 4.0],
            find_event_vertex: false,
            time_budget_us: None,
        }
    }
}

impl TrackThresholds {
    /// Largest accepted |curvature| (1/cm).
    #[must_use]
    pub fn max_curvature(&self) -> f64 {
        1.0 / (ALPHA * self.min_pt)
    }

    /// Sets the minimum transverse momentum.
    #[must_use]
    pub fn with_min_pt(mut self, min_pt: f64) -> Self {
        self.min_pt = min_pt;
        self
    }

    /// Sets the maximum impact parameter.
    #[must_use]
    pub fn with_max_impact(mut self, max_impact: f64) -> Self {
        self.max_impact = max_impact;
        self
    }

    /// Enables or disables the 3D event-vertex estimate.
    #[must_use]
    pub fn with_event_vertex(mut self, enabled: bool) -> Self {
        self.find_event_vertex = enabled;
        self
    }

    /// Sets the per-event time budget.
    #[must_use]
    pub fn with_time_budget_us(mut self, budget: u64) -> Self {
        self.time_budget_us = Some(budget);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.min_pt.is_nan() || self.min_pt <= 0.0 {
            return Err(Error::Config(format!("min_pt must be positive, got {}", self.min_pt)));
        }
        if self.max_impact.is_nan() || self.max_impact <= 0.0 {
            return Err(Error::Config(format!(
                "max_impact must be positive, got {}",
                self.max_impact
            )));
        }
        if self.sz_outlier_cuts[1] > self.sz_outlier_cuts[0] {
            return Err(Error::Config(
                "second s-z outlier cut must not be looser than the first".into(),
            ));
        }
        Ok(())
    }
}

/// Constants of one calorimeter ring.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RingConfig {
    /// Polar angle of the ring centre (rad).
    pub theta: f64,
    /// Number of crystals around the ring.
    pub n_crystals: u16,
    /// Distance of the crystal front faces from the origin (cm).
    pub radius: f64,
}

/// Whole calorimeter geometry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CalorimeterConfig {
    /// Rings ordered by increasing polar angle.
    pub rings: Vec<RingConfig>,
}

impl Default for CalorimeterConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl CalorimeterConfig {
    /// The standard 8736-crystal calorimeter: 13 forward endcap rings,
    /// 46 barrel rings of 144 crystals and 10 backward endcap rings.
    #[must_use]
    pub fn standard() -> Self {
        const FORWARD: [u16; 13] = [48, 48, 64, 64, 64, 96, 96, 96, 96, 96, 96, 144, 144];
        const BACKWARD: [u16; 10] = [144, 144, 96, 96, 96, 96, 96, 64, 64, 64];
        const BARREL_RINGS: usize = 46;

        let mut rings = Vec::with_capacity(FORWARD.len() + BARREL_RINGS + BACKWARD.len());

        let (fwd_lo, fwd_hi) = (12.4_f64.to_radians(), 31.4_f64.to_radians());
        for (i, &n_crystals) in FORWARD.iter().enumerate() {
            let theta = fwd_lo + (fwd_hi - fwd_lo) * i as f64 / (FORWARD.len() - 1) as f64;
            rings.push(RingConfig {
                theta,
                n_crystals,
                radius: 196.0 / theta.cos(),
            });
        }

        let (bar_lo, bar_hi) = (32.2_f64.to_radians(), 128.7_f64.to_radians());
        for i in 0..BARREL_RINGS {
            let theta = bar_lo + (bar_hi - bar_lo) * i as f64 / (BARREL_RINGS - 1) as f64;
            rings.push(RingConfig {
                theta,
                n_crystals: 144,
                radius: 125.0 / theta.sin(),
            });
        }

        let (bwd_lo, bwd_hi) = (130.7_f64.to_radians(), 155.1_f64.to_radians());
        for (i, &n_crystals) in BACKWARD.iter().enumerate() {
            let theta = bwd_lo + (bwd_hi - bwd_lo) * i as f64 / (BACKWARD.len() - 1) as f64;
            rings.push(RingConfig {
                theta,
                n_crystals,
                radius: 102.0 / theta.cos().abs(),
            });
        }

        Self { rings }
    }

    /// Total number of crystals.
    #[must_use]
    pub fn n_crystals(&self) -> usize {
        self.rings.iter().map(|ring| ring.n_crystals as usize).sum()
    }

    /// Checks the geometry for inconsistencies.
    pub fn validate(&self) -> Result<()> {
        if self.rings.is_empty() {
            return Err(Error::Config("calorimeter has no rings".into()));
        }
        if let Some(i) = self.rings.iter().position(|ring| ring.n_crystals == 0) {
            return Err(Error::Config(format!("ring {i} has no crystals")));
        }
        Ok(())
    }
}

/// Energy thresholds of the cluster finder.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClusterThresholds {
    /// Amplitude to energy conversion (GeV per count).
    pub gain: f64,
    /// Crystals at or below this energy are not hits (GeV).
    pub hit_threshold: f64,
    /// Minimum seed energy of a cluster (GeV).
    pub seed_threshold: f64,
    /// Minimum total energy of a cluster (GeV).
    pub cluster_threshold: f64,
}

impl Default for ClusterThresholds {
    fn default() -> Self {
        Self {
            gain: 1.0,
            hit_threshold: 0.0,
            seed_threshold: 0.1,
            cluster_threshold: 0.3,
        }
    }
}

impl ClusterThresholds {
    /// Sets the seed threshold.
    #[must_use]
    pub fn with_seed_threshold(mut self, threshold: f64) -> Self {
        self.seed_threshold = threshold;
        self
    }

    /// Sets the cluster threshold.
    #[must_use]
    pub fn with_cluster_threshold(mut self, threshold: f64) -> Self {
        self.cluster_threshold = threshold;
        self
    }

    /// Sets the hit threshold.
    #[must_use]
    pub fn with_hit_threshold(mut self, threshold: f64) -> Self {
        self.hit_threshold = threshold;
        self
    }

    /// Checks that the gain is positive and no threshold is negative.
    pub fn validate(&self) -> Result<()> {
        if !self.gain.is_finite() || self.gain <= 0.0 {
            return Err(Error::Config(format!("gain {} must be positive", self.gain)));
        }
        for (name, value) in [
            ("hit", self.hit_threshold),
            ("seed", self.seed_threshold),
            ("cluster", self.cluster_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{name} threshold {value} must be non-negative"
                )));
            }
        }
        Ok(())
    }
}

/// Complete trigger configuration.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TriggerConfig {
    /// Drift-chamber geometry.
    pub chamber: ChamberConfig,
    /// Drift-time conversion.
    pub drift: DriftConfig,
    /// Track-finder thresholds.
    pub tracking: TrackThresholds,
    /// Calorimeter geometry.
    pub calorimeter: CalorimeterConfig,
    /// Cluster-finder thresholds.
    pub clustering: ClusterThresholds,
}

impl TriggerConfig {
    /// Creates the standard configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every section of the configuration.
    pub fn validate(&self) -> Result<()> {
        self.chamber.validate()?;
        self.drift.validate()?;
        self.tracking.validate()?;
        self.calorimeter.validate()?;
        self.clustering.validate()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_standard_chamber_layout() {
        let chamber = ChamberConfig::standard();
        assert_eq!(chamber.layers.len(), 56);
        assert_eq!(chamber.layers[0].n_wires, 160);
        assert_eq!(chamber.layers[55].n_wires, 384);
        assert!(chamber.validate().is_ok());
    }

    #[test]
    fn test_standard_calorimeter_layout() {
        let calorimeter = CalorimeterConfig::standard();
        assert_eq!(calorimeter.rings.len(), 69);
        assert_eq!(calorimeter.n_crystals(), 8736);
        assert!(calorimeter.validate().is_ok());
    }

    #[test]
    fn test_drift_round_trip() {
        let drift = DriftConfig::default();
        let d = drift.distance(200.0, 2.0);
        assert!(d > 0.0 && d < 1.0);
        assert_relative_eq!(drift.time(d), 200.0, epsilon = 1e-9);

        // Early times give zero distance; late times saturate at half a cell.
        assert_eq!(drift.distance(-100.0, 2.0), 0.0);
        assert_eq!(drift.distance(5000.0, 0.6), 0.3);
    }

    #[test]
    fn test_drift_window() {
        let drift = DriftConfig::default().with_window(0.0, 500.0);
        assert!(drift.accepts(0.0));
        assert!(drift.accepts(500.0));
        assert!(!drift.accepts(500.1));
        assert!(!drift.accepts(-1.0));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = TriggerConfig::new();
        assert!(config.validate().is_ok());

        config.tracking = TrackThresholds::default().with_min_pt(0.0);
        assert!(config.validate().is_err());

        let mut config = TriggerConfig::new();
        config.chamber.layers[3].radius = 1.0;
        assert!(config.validate().is_err());

        let mut config = TriggerConfig::new();
        config.drift = config.drift.with_window(10.0, 10.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cluster_thresholds_validation() {
        assert!(ClusterThresholds::default().validate().is_ok());

        let mut config = TriggerConfig::new();
        config.clustering = ClusterThresholds::default().with_seed_threshold(-0.1);
        assert!(config.validate().is_err());

        config.clustering = ClusterThresholds::default().with_cluster_threshold(-1.0);
        assert!(config.validate().is_err());

        config.clustering = ClusterThresholds::default().with_hit_threshold(f64::NAN);
        assert!(config.validate().is_err());

        config.clustering = ClusterThresholds {
            gain: 0.0,
            ..ClusterThresholds::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gain"), "{err}");
    }

    #[test]
    fn test_max_curvature() {
        let thresholds = TrackThresholds::default().with_min_pt(1.0);
        assert_relative_eq!(thresholds.max_curvature(), 1.0 / ALPHA);
    }
}
