//! Stereo segment matching and the longitudinal fit.
//!
//! A stereo wire crosses a track's circle at one point along its length;
//! the crossing gives the arclength `s` and, through the wire's position
//! between the endplates, the `z` of the track there. Stereo superlayers are
//! walked from the inside out. A segment that fits exactly one track is
//! linked at once; segments fitting several tracks wait until the end of
//! their superlayer and go to the track whose s-z trend they follow best.
#![allow(clippy::cast_precision_loss)]

use crate::circle::Circle;
use crate::geometry::DriftChamber;
use crate::line::{fit_with_rejection, Line, SzPoint};
use crate::segment::{Segment, SegmentRef};
use crate::superlayer::SuperLayerHits;
use crate::track::{hit_weight, StereoLink, Track};
use crate::wire::WireId;
use l3trig_core::{Arena, Longitudinal, TrackThresholds};
use std::f64::consts::PI;

/// Allowed overshoot of the wire parameter beyond the endplates.
const WIRE_MARGIN: f64 = 0.02;
/// Most side-resolution passes of the s-z fit.
const SIDE_PASSES: usize = 4;
/// Change of the s-z line below which the side choice is final.
const SETTLED_DZ: f64 = 0.01;
const SETTLED_TAN: f64 = 1e-4;

/// Position where a wire, displaced sideways by `offset`, meets the circle.
///
/// Returns `(s, z)` for the crossing on the first half-turn, preferring the
/// smallest arclength.
#[must_use]
pub fn wire_crossing(
    chamber: &DriftChamber,
    id: WireId,
    circle: &Circle,
    offset: f64,
) -> Option<(f64, f64)> {
    let wire = chamber.wire(id);
    let (backward_z, forward_z) = chamber.layer_of(id).z_range();
    let base = wire.backward();
    let dir = wire.direction();
    let roots = circle.intersect_line(base, dir, offset)?;
    let half_turn = PI * circle.radius();

    let mut best: Option<(f64, f64)> = None;
    for t in roots {
        if !(-WIRE_MARGIN..=1.0 + WIRE_MARGIN).contains(&t) {
            continue;
        }
        let x = base[0] + t * dir[0];
        let y = base[1] + t * dir[1];
        let s = circle.arclength(x, y);
        if s > half_turn {
            continue;
        }
        if best.is_none_or(|(s_best, _)| s < s_best) {
            best = Some((s, backward_z + t * (forward_z - backward_z)));
        }
    }
    best
}

fn bound_sz(chamber: &DriftChamber, hits: &Arena<WireId>, circle: &Circle) -> Option<(f64, f64)> {
    let mut sum = (0.0, 0.0);
    let mut n = 0usize;
    for &id in hits {
        if let Some((s, z)) = wire_crossing(chamber, id, circle, 0.0) {
            sum.0 += s;
            sum.1 += z;
            n += 1;
        }
    }
    (n > 0).then(|| (sum.0 / n as f64, sum.1 / n as f64))
}

/// (s, z) estimate of a stereo segment on a track, if it is compatible.
///
/// The inner and outer boundaries are projected onto the circle and their
/// crossings averaged. The result must be reachable by a line starting within
/// `max_z0` of the origin with |tan λ| at most `max_tan_lambda`.
#[must_use]
pub fn match_segment(
    chamber: &DriftChamber,
    segment: &Segment,
    reference: SegmentRef,
    circle: &Circle,
    thresholds: &TrackThresholds,
) -> Option<StereoLink> {
    let (s_in, z_in) = bound_sz(chamber, segment.inner_bound(), circle)?;
    let (s_out, z_out) = bound_sz(chamber, segment.outer_bound(), circle)?;
    let s = 0.5 * (s_in + s_out);
    let z = 0.5 * (z_in + z_out);
    if z.abs() > thresholds.max_z0 + thresholds.max_tan_lambda * s {
        return None;
    }
    Some(StereoLink {
        segment: reference,
        s,
        z,
    })
}

/// Distance of a link from a track's s-z trend; the origin when the track
/// has no links yet.
fn trend_deviation(trend: Option<Line>, link: &StereoLink) -> f64 {
    match trend {
        Some(line) => (link.z - line.z_at(link.s)).abs(),
        None => link.z.abs(),
    }
}

/// Counters of the stereo matching stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StereoCounts {
    pub unique: usize,
    pub ambiguous: usize,
    pub resolved: usize,
}

/// Attaches stereo segments to the tracks.
///
/// `stereo` lists the stereo superlayer indices, innermost first; tracks
/// without a circle are skipped.
pub fn link_stereo(
    chamber: &DriftChamber,
    store: &mut [SuperLayerHits],
    tracks: &mut Arena<Track>,
    stereo: &[usize],
    thresholds: &TrackThresholds,
) -> StereoCounts {
    let mut counts = StereoCounts::default();
    let mut candidates: Arena<(usize, StereoLink)> = Arena::new();
    let mut deferred: Arena<(usize, Arena<(usize, StereoLink)>)> = Arena::new();

    for &superlayer in stereo {
        deferred.clear();
        for index in 0..store[superlayer].segments.len() {
            let segment = &store[superlayer].segments[index];
            if segment.owner.is_some() {
                continue;
            }
            let reference = SegmentRef { superlayer, index };
            candidates.clear();
            for (t, track) in tracks.iter().enumerate() {
                let Some(circle) = track.circle else {
                    continue;
                };
                if let Some(link) = match_segment(chamber, segment, reference, &circle, thresholds)
                {
                    candidates.push((t, link));
                }
            }
            match candidates.len() {
                0 => {}
                1 => {
                    let (t, link) = candidates[0];
                    tracks[t].stereo.push(link);
                    store[superlayer].segments[index].owner = Some(t);
                    counts.unique += 1;
                }
                _ => {
                    deferred.push((index, candidates.clone()));
                    counts.ambiguous += 1;
                }
            }
        }

        for (index, options) in &deferred {
            let mut best: Option<(usize, StereoLink, f64)> = None;
            for &(t, link) in options {
                let deviation = trend_deviation(tracks[t].trend(), &link);
                if deviation > thresholds.stereo_trend_window {
                    continue;
                }
                if best.is_none_or(|(_, _, d)| deviation < d) {
                    best = Some((t, link, deviation));
                }
            }
            if let Some((t, link, _)) = best {
                tracks[t].stereo.push(link);
                store[superlayer].segments[*index].owner = Some(t);
                counts.resolved += 1;
            }
        }
    }
    counts
}

/// s-z point of one stereo hit on the side of its wire nearer `expected`,
/// weighted by drift distance.
fn resolve_side(
    chamber: &DriftChamber,
    id: WireId,
    circle: &Circle,
    expected: impl Fn(f64) -> f64,
) -> Option<SzPoint> {
    let distance = chamber.wire(id).distance();
    let mut best: Option<(f64, f64, f64)> = None;
    for offset in [distance, -distance] {
        let Some((s, z)) = wire_crossing(chamber, id, circle, offset) else {
            continue;
        };
        let deviation = (z - expected(s)).abs();
        if best.is_none_or(|(_, _, d)| deviation < d) {
            best = Some((s, z, deviation));
        }
    }
    best.map(|(s, z, _)| SzPoint {
        s,
        z,
        weight: hit_weight(chamber, id),
    })
}

/// Fits z against s for one track from its linked stereo hits.
///
/// Each hit gives two candidate crossings, one per side of the wire at the
/// drift distance; the one closer to the current s-z estimate is used. The
/// first estimate is the link trend; the side choice is then repeated
/// against the latest fit until the line settles.
pub fn fit_sz(
    chamber: &DriftChamber,
    store: &[SuperLayerHits],
    track: &Track,
    cuts: &[f64],
    points: &mut Arena<SzPoint>,
) -> Longitudinal {
    let Some(circle) = track.circle else {
        return Longitudinal::default();
    };

    let mut guide = track.trend();
    let mut fitted = Longitudinal::default();
    for _ in 0..SIDE_PASSES {
        points.clear();
        for link in &track.stereo {
            let segment = &store[link.segment.superlayer].segments[link.segment.index];
            for &id in segment.hits() {
                let expected = |s: f64| guide.map_or(link.z, |line| line.z_at(s));
                if let Some(point) = resolve_side(chamber, id, &circle, expected) {
                    points.push(point);
                }
            }
        }

        fitted = fit_with_rejection(points.as_slice(), cuts);
        let Longitudinal::Fitted {
            dz,
            tan_lambda,
            chi2,
            n_points,
        } = fitted
        else {
            break;
        };
        let settled = guide.is_some_and(|line| {
            (line.dz - dz).abs() < SETTLED_DZ && (line.tan_lambda - tan_lambda).abs() < SETTLED_TAN
        });
        if settled {
            break;
        }
        guide = Some(Line {
            dz,
            tan_lambda,
            chi2,
            n_points,
        });
    }
    fitted
}
