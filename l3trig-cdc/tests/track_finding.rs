#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
use l3trig_cdc::stereo::wire_crossing;
use l3trig_cdc::{Circle, DriftChamber, Stage, TrackFinder, WireId};
use l3trig_core::{ChamberConfig, DriftConfig, TrackThresholds, WireHit, ALPHA};

const Z0: f64 = 2.0;
const TAN_LAMBDA: f64 = 0.3;

/// Longitudinal truth of a generated helix.
#[derive(Clone, Copy)]
struct Dip {
    z0: f64,
    tan_lambda: f64,
}

const FORWARD: Dip = Dip {
    z0: Z0,
    tan_lambda: TAN_LAMBDA,
};

fn truth(pt: f64, phi: f64) -> Circle {
    Circle {
        curvature: 1.0 / (ALPHA * pt),
        phi,
        impact: 0.0,
        chi2: 0.0,
        n_points: 0,
    }
}

/// Arclength at which a circle through the origin reaches radius `r`.
fn arclength_at(circle: &Circle, r: f64) -> f64 {
    let radius = circle.radius();
    2.0 * radius * (r / (2.0 * radius)).asin()
}

fn hit(chamber: &DriftChamber, id: WireId, distance: f64, drift: &DriftConfig) -> WireHit {
    let wire = chamber.wire(id);
    WireHit::new(wire.layer(), wire.local(), drift.time(distance))
}

/// Wire of `layer` closest to `point` at z = 0.
fn nearest_wire(chamber: &DriftChamber, layer: u16, point: [f64; 2]) -> WireId {
    let n = chamber.layer(layer).unwrap().n_wires();
    (0..n)
        .map(|local| chamber.wire_id(layer, local).unwrap())
        .min_by(|&a, &b| {
            let da = distance(chamber.wire(a).position(), point);
            let db = distance(chamber.wire(b).position(), point);
            da.total_cmp(&db)
        })
        .unwrap()
}

fn distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

/// One hit per layer along the helix, drift times from the distance of
/// each wire to the trajectory.
fn helix_hits(chamber: &DriftChamber, circle: &Circle, drift: &DriftConfig) -> Vec<WireHit> {
    dipped_helix_hits(chamber, circle, FORWARD, drift)
}

fn dipped_helix_hits(
    chamber: &DriftChamber,
    circle: &Circle,
    dip: Dip,
    drift: &DriftConfig,
) -> Vec<WireHit> {
    let Dip { z0, tan_lambda } = dip;
    let mut hits = Vec::new();
    for layer in chamber.layers() {
        let s = arclength_at(circle, layer.radius());
        if layer.is_axial() {
            let id = nearest_wire(chamber, layer.id(), circle.point_at(s));
            let [x, y] = chamber.wire(id).position();
            hits.push(hit(chamber, id, circle.residual(x, y).abs(), drift));
            continue;
        }
        let (backward_z, forward_z) = layer.z_range();
        let best = (0..layer.n_wires())
            .map(|local| chamber.wire_id(layer.id(), local).unwrap())
            .filter_map(|id| {
                let (sc, zc) = wire_crossing(chamber, id, circle, 0.0)?;
                ((sc - s).abs() < 5.0).then(|| (id, sc, (zc - z0 - tan_lambda * sc).abs()))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2));
        let Some((id, sc, _)) = best else {
            continue;
        };
        let wire = chamber.wire(id);
        let t = (z0 + tan_lambda * sc - backward_z) / (forward_z - backward_z);
        let base = wire.backward();
        let dir = wire.direction();
        let d = circle
            .residual(base[0] + t * dir[0], base[1] + t * dir[1])
            .abs();
        hits.push(hit(chamber, id, d, drift));
    }
    hits
}

/// Six hits of superlayer 4 rotated by `offset` radians away from the helix.
fn rotated_segment(
    chamber: &DriftChamber,
    circle: &Circle,
    offset: f64,
    drift: &DriftConfig,
) -> Vec<WireHit> {
    let superlayer = &chamber.superlayers()[4];
    superlayer
        .layers()
        .map(|layer| {
            let layer = chamber.layer(layer as u16).unwrap();
            let [x, y] = circle.point_at(arclength_at(circle, layer.radius()));
            let (sin, cos) = offset.sin_cos();
            let rotated = [x * cos - y * sin, x * sin + y * cos];
            let id = nearest_wire(chamber, layer.id(), rotated);
            hit(chamber, id, 0.2, drift)
        })
        .collect()
}

fn finder() -> TrackFinder {
    TrackFinder::new(
        &ChamberConfig::standard(),
        DriftConfig::default(),
        TrackThresholds::default(),
    )
    .unwrap()
}

#[test]
fn test_single_helix_is_found() {
    let mut finder = finder();
    let drift = DriftConfig::default();
    let circle = truth(1.0, 1.0);
    let hits = helix_hits(finder.chamber(), &circle, &drift);
    assert_eq!(hits.len(), 56);

    let output = finder.process(&hits);
    assert_eq!(output.stage, Stage::Done);
    assert_eq!(output.tracks.len(), 1, "tracks: {:?}", output.tracks);

    let track = output.tracks[0];
    assert_eq!(track.charge(), 1);
    assert!((track.pt() - 1.0).abs() < 0.05, "pt {}", track.pt());
    assert!(track.impact.abs() < 0.2, "impact {}", track.impact);
    assert!((track.phi - 1.0).abs() < 0.01, "phi {}", track.phi);

    let found = &finder.tracks()[0];
    assert_eq!(found.axial_segments().len(), 5);
    assert!(found.stereo_links().len() >= 3);
    assert!(
        found.chain_chi2() < TrackThresholds::default().link_chi2_window,
        "chain chi2 {}",
        found.chain_chi2()
    );
}

#[test]
fn test_helix_longitudinal_fit() {
    let mut finder = finder();
    let drift = DriftConfig::default();
    let circle = truth(1.0, 1.0);
    let hits = helix_hits(finder.chamber(), &circle, &drift);

    let output = finder.process(&hits);
    assert_eq!(output.tracks.len(), 1);
    let longitudinal = output.tracks[0].longitudinal;
    let dz = longitudinal.dz().unwrap();
    let tan_lambda = longitudinal.tan_lambda().unwrap();
    assert!((dz - Z0).abs() < 1.0, "dz {dz}");
    assert!((tan_lambda - TAN_LAMBDA).abs() < 0.1, "tan lambda {tan_lambda}");
}

#[test]
fn test_backward_helix_longitudinal_fit() {
    let mut finder = finder();
    let drift = DriftConfig::default();
    let circle = truth(1.0, 1.0);
    let dip = Dip {
        z0: -2.0,
        tan_lambda: TAN_LAMBDA,
    };
    let hits = dipped_helix_hits(finder.chamber(), &circle, dip, &drift);

    let output = finder.process(&hits);
    assert_eq!(output.tracks.len(), 1);
    let longitudinal = output.tracks[0].longitudinal;
    let dz = longitudinal.dz().unwrap();
    let tan_lambda = longitudinal.tan_lambda().unwrap();
    assert!(dz < 0.0, "dz {dz}");
    assert!((dz - dip.z0).abs() < 1.0, "dz {dz}");
    assert!((tan_lambda - dip.tan_lambda).abs() < 0.1, "tan lambda {tan_lambda}");
}

#[test]
fn test_off_circle_segment_is_not_chained() {
    let mut finder = finder();
    let drift = DriftConfig::default();
    let circle = truth(1.0, 1.0);
    let mut hits = helix_hits(finder.chamber(), &circle, &drift);
    hits.extend(rotated_segment(finder.chamber(), &circle, 0.15, &drift));

    let output = finder.process(&hits);
    assert_eq!(output.tracks.len(), 1);

    let store = finder.superlayer_hits(4).unwrap();
    assert_eq!(store.segments().len(), 2);
    let owned = store
        .segments()
        .iter()
        .filter(|segment| segment.owner().is_some())
        .count();
    assert_eq!(owned, 1);
    assert_eq!(finder.tracks()[0].axial_segments().len(), 5);
}

#[test]
fn test_segment_outside_phi_window_is_not_chained() {
    let mut finder = finder();
    let drift = DriftConfig::default();
    let circle = truth(1.0, 1.0);
    let window = TrackThresholds::default().link_phi_window;
    let mut hits = helix_hits(finder.chamber(), &circle, &drift);
    hits.extend(rotated_segment(finder.chamber(), &circle, 10.0 * window, &drift));

    let output = finder.process(&hits);
    assert_eq!(output.tracks.len(), 1);

    let store = finder.superlayer_hits(4).unwrap();
    assert_eq!(store.segments().len(), 2);
    let free: Vec<_> = store
        .segments()
        .iter()
        .filter(|segment| segment.owner().is_none())
        .collect();
    assert_eq!(free.len(), 1);

    let track = &finder.tracks()[0];
    assert_eq!(track.axial_segments().len(), 5);
    assert!(track.chain_chi2() < TrackThresholds::default().link_chi2_window);
}

#[test]
fn test_repeated_event_is_identical() {
    let mut finder = finder();
    let drift = DriftConfig::default();
    let circle = truth(1.5, 4.0);
    let hits = helix_hits(finder.chamber(), &circle, &drift);

    let first = finder.process(&hits);
    let first_chain = finder.tracks()[0].chain_chi2();
    let second = finder.process(&hits);
    assert_eq!(first, second);
    assert_eq!(first_chain.to_bits(), finder.tracks()[0].chain_chi2().to_bits());
}

#[test]
fn test_mask_removes_hits_for_one_event() {
    let mut finder = finder();
    let drift = DriftConfig::default();
    let circle = truth(1.0, 1.0);
    let hits = helix_hits(finder.chamber(), &circle, &drift);

    let masked: Vec<(u16, u16)> = hits.iter().take(8).map(|h| (h.layer, h.wire)).collect();
    finder.mask_wires_for_event(&masked).unwrap();
    finder.process(&hits);
    assert_eq!(finder.statistics().blocked, 8);
    assert!(finder.superlayer_hits(0).unwrap().hits().is_empty());

    finder.process(&hits);
    assert_eq!(finder.statistics().blocked, 0);
    assert_eq!(finder.superlayer_hits(0).unwrap().hits().len(), 8);
}

#[test]
fn test_exhausted_budget_stops_early() {
    let thresholds = TrackThresholds::default().with_time_budget_us(0);
    let mut finder = TrackFinder::new(&ChamberConfig::standard(), DriftConfig::default(), thresholds)
        .unwrap();
    let drift = DriftConfig::default();
    let hits = helix_hits(finder.chamber(), &truth(1.0, 1.0), &drift);

    let output = finder.process(&hits);
    assert!(finder.statistics().timed_out);
    assert_ne!(output.stage, Stage::Done);
}
