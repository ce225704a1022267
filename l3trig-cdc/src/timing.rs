//! Event-timing correction.
//!
//! Hits close to a fitted track predict their own drift time from the
//! distance to the circle. The per-track mean difference to the measured
//! times, weighted by how consistent it is, gives a common time offset that
//! is then applied to every hit of the event.
#![allow(clippy::cast_precision_loss)]

use crate::geometry::DriftChamber;
use crate::superlayer::SuperLayerHits;
use crate::track::Track;
use l3trig_core::{Arena, DriftConfig};

/// Fraction of the cell size below which a hit enters the estimate.
const MAX_RESIDUAL: f64 = 0.45;
/// Variance scale of the per-track weight (ns^2).
const VARIANCE_SCALE: f64 = 1600.0;

/// Common drift-time offset of the event in ns; zero if no hit qualifies.
#[must_use]
pub fn event_timing(
    chamber: &DriftChamber,
    store: &[SuperLayerHits],
    tracks: &Arena<Track>,
    drift: &DriftConfig,
) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for track in tracks {
        let Some(circle) = track.circle() else {
            continue;
        };
        let mut n = 0usize;
        let mut sum = 0.0;
        let mut sum2 = 0.0;
        for id in track.hits(store) {
            let wire = chamber.wire(id);
            let [x, y] = wire.position();
            let d0 = circle.residual(x, y).abs();
            if d0 >= MAX_RESIDUAL * chamber.layer_of(id).cell_size() {
                continue;
            }
            let dt = drift.time(d0) - wire.time();
            n += 1;
            sum += dt;
            sum2 += dt * dt;
        }
        if n == 0 {
            continue;
        }
        let count = n as f64;
        let variance = sum2 - sum * sum / count;
        let weight = (-variance / (count * VARIANCE_SCALE)).exp();
        numerator += sum * weight;
        denominator += count * weight;
    }
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Recomputes every hit's drift distance with the time shifted by `timing`.
pub fn apply_timing(
    chamber: &mut DriftChamber,
    store: &[SuperLayerHits],
    drift: &DriftConfig,
    timing: f64,
) {
    for superlayer in store {
        for &id in superlayer.hits() {
            let cell = chamber.layer_of(id).cell_size();
            let wire = chamber.wire_mut(id);
            wire.distance = drift.distance(wire.time + timing, cell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use l3trig_core::ChamberConfig;

    #[test]
    fn test_no_tracks_gives_zero() {
        let chamber = DriftChamber::new(&ChamberConfig::standard()).unwrap();
        let store = vec![SuperLayerHits::default(); chamber.superlayers().len()];
        let timing = event_timing(&chamber, &store, &Arena::new(), &DriftConfig::default());
        assert!(timing.abs() < f64::EPSILON);
    }

    #[test]
    fn test_apply_timing_shifts_distance() {
        let mut chamber = DriftChamber::new(&ChamberConfig::standard()).unwrap();
        let drift = DriftConfig::default();
        let id = chamber.wire_id(20, 5).unwrap();
        let cell = chamber.layer_of(id).cell_size();
        {
            let wire = chamber.wire_mut(id);
            wire.time = 100.0;
            wire.distance = drift.distance(100.0, cell);
        }
        let mut store = vec![SuperLayerHits::default(); chamber.superlayers().len()];
        let superlayer = chamber.superlayer_of(id);
        store[superlayer].hits.push(id);

        apply_timing(&mut chamber, &store, &drift, -20.0);
        assert_relative_eq!(chamber.wire(id).distance(), drift.distance(80.0, cell));
        assert_relative_eq!(chamber.wire(id).time(), 100.0);
    }
}
