//! Track candidates and their transverse fits.
//!
//! A track starts as a chain of axial segments, gets a circle from the wire
//! positions, and is refitted once the event timing is known: hit positions
//! are moved from the wire toward the circle by their drift distance, the
//! event vertex may join the fit, and hits of the innermost superlayer can be
//! salvaged from its complicated clusters.

use crate::circle::{Circle, CircleFit};
use crate::geometry::DriftChamber;
use crate::line::{Line, LineFit};
use crate::linker::Chain;
use crate::segment::SegmentRef;
use crate::superlayer::SuperLayerHits;
use crate::wire::{WireId, WireState};
use l3trig_core::{Arena, FitFailure, Longitudinal, TrackRecord, TrackThresholds};

/// Weight of the origin in the running s-z trend.
const ORIGIN_PRIOR: f64 = 0.05;

/// A stereo segment attached to a track, with its (s, z) estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoLink {
    pub segment: SegmentRef,
    pub s: f64,
    pub z: f64,
}

/// One track candidate.
#[derive(Debug, Clone)]
pub struct Track {
    pub(crate) axial: Arena<SegmentRef>,
    pub(crate) chain_kappa: f64,
    pub(crate) chain_chi2: f64,
    pub(crate) salvaged: Arena<WireId>,
    pub(crate) circle: Option<Circle>,
    pub(crate) stereo: Arena<StereoLink>,
    pub(crate) longitudinal: Longitudinal,
}

impl Track {
    /// Track built from an accepted axial chain.
    #[must_use]
    pub fn new(chain: Chain) -> Self {
        Self {
            axial: chain.segments,
            chain_kappa: chain.kappa,
            chain_chi2: chain.chi2,
            salvaged: Arena::new(),
            circle: None,
            stereo: Arena::new(),
            longitudinal: Longitudinal::default(),
        }
    }

    /// Axial segments, outermost first.
    #[must_use]
    pub fn axial_segments(&self) -> &Arena<SegmentRef> {
        &self.axial
    }

    /// Linked stereo segments in linking order.
    #[must_use]
    pub fn stereo_links(&self) -> &Arena<StereoLink> {
        &self.stereo
    }

    /// Hits recovered from the innermost superlayer's salvage pool.
    #[must_use]
    pub fn salvaged(&self) -> &Arena<WireId> {
        &self.salvaged
    }

    /// Curvature estimate of the chain, in units of `kappa`.
    #[must_use]
    pub fn chain_kappa(&self) -> f64 {
        self.chain_kappa
    }

    /// Curvature chi-square of the chain.
    #[must_use]
    pub fn chain_chi2(&self) -> f64 {
        self.chain_chi2
    }

    /// Current transverse fit.
    #[must_use]
    pub fn circle(&self) -> Option<&Circle> {
        self.circle.as_ref()
    }

    /// Current longitudinal fit.
    #[must_use]
    pub fn longitudinal(&self) -> Longitudinal {
        self.longitudinal
    }

    /// Output record, once the transverse fit exists.
    #[must_use]
    pub fn record(&self) -> Option<TrackRecord> {
        self.circle.map(|circle| TrackRecord {
            impact: circle.impact,
            phi: circle.phi,
            curvature: circle.curvature,
            longitudinal: self.longitudinal,
            n_transverse: circle.n_points,
            chi2: circle.chi2,
        })
    }

    /// Axial hits of the chain followed by the salvaged hits.
    pub fn hits<'a>(&'a self, store: &'a [SuperLayerHits]) -> impl Iterator<Item = WireId> + 'a {
        self.axial
            .iter()
            .flat_map(move |r| store[r.superlayer].segments[r.index].hits().iter().copied())
            .chain(self.salvaged.iter().copied())
    }

    /// First circle fit from the wire positions of the chain.
    ///
    /// # Errors
    /// Fails if the fit is degenerate or outside the configured limits.
    pub fn fit_transverse(
        &mut self,
        chamber: &DriftChamber,
        store: &[SuperLayerHits],
        thresholds: &TrackThresholds,
    ) -> Result<Circle, FitFailure> {
        let mut fit = CircleFit::new();
        for id in self.hits(store) {
            let [x, y] = chamber.wire(id).position();
            fit.add(x, y, hit_weight(chamber, id));
        }
        let circle = within_limits(fit.fit()?, thresholds)?;
        self.circle = Some(circle);
        Ok(circle)
    }

    /// Pulls hits of the innermost axial superlayer's complicated clusters
    /// into the track when the chain has no segment there.
    ///
    /// A hit is taken if it lies within one cell of the circle and inside
    /// the wedge about the circle centre set by `salvage_min_cos`, measured
    /// from the innermost hit of the chain. Returns the number of hits taken.
    pub fn salvage(
        &mut self,
        chamber: &mut DriftChamber,
        store: &[SuperLayerHits],
        innermost: usize,
        thresholds: &TrackThresholds,
    ) -> usize {
        let Some(circle) = self.circle else {
            return 0;
        };
        if self.axial.iter().any(|r| r.superlayer == innermost) {
            return 0;
        }
        let Some(anchor) = self
            .axial
            .last()
            .and_then(|r| store[r.superlayer].segments[r.index].inner_bound().first().copied())
        else {
            return 0;
        };
        let anchor = chamber.wire(anchor).position();
        let pivot = circle.center().unwrap_or([0.0, 0.0]);

        let mut taken = 0;
        for segment in &store[innermost].complicated {
            for &id in segment.hits() {
                let wire = chamber.wire(id);
                if wire.state().contains(WireState::SALVAGED) {
                    continue;
                }
                let [x, y] = wire.position();
                if circle.residual(x, y).abs() >= chamber.layer_of(id).cell_size() {
                    continue;
                }
                if wedge_cos(pivot, anchor, [x, y]) < thresholds.salvage_min_cos {
                    continue;
                }
                chamber.wire_mut(id).state.insert(WireState::SALVAGED);
                self.salvaged.push(id);
                taken += 1;
            }
        }
        taken
    }

    /// Refit with drift-corrected hit positions and, if given, the event
    /// vertex as an extra point of weight `vertex_weight`.
    ///
    /// # Errors
    /// Fails if the fit is degenerate or outside the configured limits; the
    /// previous circle is kept in that case.
    pub fn refit_transverse(
        &mut self,
        chamber: &DriftChamber,
        store: &[SuperLayerHits],
        vertex: Option<[f64; 2]>,
        thresholds: &TrackThresholds,
    ) -> Result<Circle, FitFailure> {
        let Some(previous) = self.circle else {
            return self.fit_transverse(chamber, store, thresholds);
        };
        let mut fit = CircleFit::new();
        for id in self.hits(store) {
            let wire = chamber.wire(id);
            let [x, y] = wire.position();
            let side = previous.residual(x, y).signum();
            let [nx, ny] = previous.left_normal(x, y);
            let d = wire.distance();
            fit.add(x - side * d * nx, y - side * d * ny, hit_weight(chamber, id));
        }
        if let Some([vx, vy]) = vertex {
            fit.add(vx, vy, thresholds.vertex_weight);
        }
        let circle = within_limits(fit.fit()?, thresholds)?;
        self.circle = Some(circle);
        Ok(circle)
    }

    /// Running s-z line of the linked stereo segments with a weak prior at
    /// the origin; `None` before the first link.
    #[must_use]
    pub fn trend(&self) -> Option<Line> {
        if self.stereo.is_empty() {
            return None;
        }
        let mut fit = LineFit::new();
        fit.add(0.0, 0.0, ORIGIN_PRIOR);
        for link in &self.stereo {
            fit.add(link.s, link.z, 1.0);
        }
        fit.fit().ok()
    }
}

/// Applies the curvature and impact-parameter limits.
///
/// # Errors
/// [`FitFailure::CurvatureOutOfRange`] or [`FitFailure::ImpactOutOfRange`].
pub fn within_limits(circle: Circle, thresholds: &TrackThresholds) -> Result<Circle, FitFailure> {
    if circle.curvature.abs() > thresholds.max_curvature() {
        return Err(FitFailure::CurvatureOutOfRange);
    }
    if circle.impact.abs() > thresholds.max_impact {
        return Err(FitFailure::ImpactOutOfRange);
    }
    Ok(circle)
}

/// Hits far from their wire count less: `exp(-(d / cell)^2)`.
pub(crate) fn hit_weight(chamber: &DriftChamber, id: WireId) -> f64 {
    let ratio = chamber.wire(id).distance() / chamber.layer_of(id).cell_size();
    (-ratio * ratio).exp()
}

fn wedge_cos(pivot: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let (ax, ay) = (a[0] - pivot[0], a[1] - pivot[1]);
    let (bx, by) = (b[0] - pivot[0], b[1] - pivot[1]);
    let norm = ax.hypot(ay) * bx.hypot(by);
    if norm == 0.0 {
        return 1.0;
    }
    (ax * bx + ay * by) / norm
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(curvature: f64, impact: f64) -> Circle {
        Circle {
            curvature,
            phi: 1.0,
            impact,
            chi2: 0.0,
            n_points: 10,
        }
    }

    #[test]
    fn test_limits() {
        let thresholds = TrackThresholds::default().with_max_impact(5.0);
        assert!(within_limits(circle(0.001, 1.0), &thresholds).is_ok());
        assert_eq!(
            within_limits(circle(0.1, 1.0), &thresholds),
            Err(FitFailure::CurvatureOutOfRange)
        );
        assert_eq!(
            within_limits(circle(0.001, -6.0), &thresholds),
            Err(FitFailure::ImpactOutOfRange)
        );
    }

    #[test]
    fn test_wedge_cos() {
        assert!((wedge_cos([0.0, 0.0], [1.0, 0.0], [0.0, 2.0])).abs() < 1e-12);
        assert!((wedge_cos([1.0, 1.0], [2.0, 1.0], [3.0, 1.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_trend_needs_a_link() {
        let mut track = Track::new(Chain::default());
        assert!(track.trend().is_none());

        track.stereo.push(StereoLink {
            segment: SegmentRef {
                superlayer: 1,
                index: 0,
            },
            s: 40.0,
            z: 20.0,
        });
        let trend = track.trend().unwrap();
        assert!((trend.z_at(40.0) - 20.0).abs() < 1e-9);
        assert!(trend.dz.abs() < 1e-9);
    }
}
