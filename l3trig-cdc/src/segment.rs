//! Track segments: connected hit clusters inside one superlayer.
#![allow(clippy::cast_precision_loss)]

use crate::geometry::DriftChamber;
use crate::wire::{wrap_phi, WireId};
use l3trig_core::{Arena, ALPHA};

/// Classification of a hit cluster (see [`Segment::kind`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Narrow cluster crossing (nearly) the whole superlayer.
    Simple,
    /// Narrow cluster starting at the inner edge, ending early.
    InnerShort,
    /// Narrow cluster ending at the outer edge, starting late.
    OuterShort,
    /// Some row is wider than two cells.
    Complicated,
    /// Narrow, too short and touching neither edge.
    Residual,
}

/// Handle of a segment: superlayer plus index in that superlayer's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentRef {
    pub superlayer: usize,
    pub index: usize,
}

/// A cluster of hits with its boundary hits and derived quantities.
///
/// The derived quantities are recomputed by every operation that changes the
/// member hits, so they always describe the current hit set.
#[derive(Debug, Clone)]
pub struct Segment {
    superlayer: usize,
    hits: Arena<WireId>,
    inner_bound: Arena<WireId>,
    outer_bound: Arena<WireId>,
    inner_row: usize,
    outer_row: usize,
    max_span: usize,
    kind: SegmentKind,
    incoming: [f64; 2],
    outgoing: [f64; 2],
    r_in: f64,
    r_out: f64,
    kappa: f64,
    pub(crate) owner: Option<usize>,
}

impl Segment {
    /// Builds a segment of superlayer `superlayer` from a non-empty hit set.
    #[must_use]
    pub fn new(chamber: &DriftChamber, superlayer: usize, hits: Arena<WireId>) -> Self {
        let mut segment = Self {
            superlayer,
            hits,
            inner_bound: Arena::new(),
            outer_bound: Arena::new(),
            inner_row: 0,
            outer_row: 0,
            max_span: 0,
            kind: SegmentKind::Residual,
            incoming: [0.0; 2],
            outgoing: [0.0; 2],
            r_in: 0.0,
            r_out: 0.0,
            kappa: 0.0,
            owner: None,
        };
        segment.refresh(chamber);
        segment
    }

    /// Takes over all hits of `other`.
    pub fn merge(&mut self, other: &Segment, chamber: &DriftChamber) {
        for &hit in &other.hits {
            self.hits.push_unique(hit);
        }
        self.refresh(chamber);
    }

    /// Adds a single hit.
    pub fn absorb(&mut self, hit: WireId, chamber: &DriftChamber) {
        self.hits.push_unique(hit);
        self.refresh(chamber);
    }

    fn refresh(&mut self, chamber: &DriftChamber) {
        self.hits.as_mut_slice().sort_unstable();
        self.inner_bound.clear();
        self.outer_bound.clear();

        let Some(&first) = self.hits.first() else {
            self.kind = SegmentKind::Residual;
            return;
        };
        let last = self.hits.last().copied().unwrap_or(first);
        self.inner_row = chamber.layer_of(first).row();
        self.outer_row = chamber.layer_of(last).row();

        // Hits are sorted layer-major, so each row is a contiguous run.
        self.max_span = 0;
        let mut start = 0;
        let hits = self.hits.as_slice();
        while start < hits.len() {
            let layer = chamber.wire(hits[start]).layer();
            let mut end = start + 1;
            while end < hits.len() && chamber.wire(hits[end]).layer() == layer {
                end += 1;
            }
            let n_wires = usize::from(chamber.layer_of(hits[start]).n_wires());
            self.max_span = self.max_span.max(row_span(chamber, &hits[start..end], n_wires));
            start = end;
        }

        for &hit in hits {
            let row = chamber.layer_of(hit).row();
            if row == self.inner_row {
                self.inner_bound.push(hit);
            }
            if row == self.outer_row {
                self.outer_bound.push(hit);
            }
        }

        let n_rows = chamber.superlayers()[self.superlayer].n_layers();
        self.kind = classify(self.inner_row, self.outer_row, self.max_span, n_rows);

        self.incoming = mean_position(chamber, &self.inner_bound);
        self.outgoing = mean_position(chamber, &self.outer_bound);
        self.r_in = self.incoming[0].hypot(self.incoming[1]);
        self.r_out = self.outgoing[0].hypot(self.outgoing[1]);
        self.kappa = chord_kappa(self.outgoing, self.incoming);
    }

    /// Superlayer index.
    #[must_use]
    pub fn superlayer(&self) -> usize {
        self.superlayer
    }

    /// Member hits, sorted by wire handle.
    #[must_use]
    pub fn hits(&self) -> &Arena<WireId> {
        &self.hits
    }

    /// Hits on the innermost occupied row.
    #[must_use]
    pub fn inner_bound(&self) -> &Arena<WireId> {
        &self.inner_bound
    }

    /// Hits on the outermost occupied row.
    #[must_use]
    pub fn outer_bound(&self) -> &Arena<WireId> {
        &self.outer_bound
    }

    /// Innermost occupied row.
    #[must_use]
    pub fn inner_row(&self) -> usize {
        self.inner_row
    }

    /// Outermost occupied row.
    #[must_use]
    pub fn outer_row(&self) -> usize {
        self.outer_row
    }

    /// Widest per-row span in cells.
    #[must_use]
    pub fn max_span(&self) -> usize {
        self.max_span
    }

    /// Current classification.
    #[must_use]
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Mean inner boundary position.
    #[must_use]
    pub fn incoming(&self) -> [f64; 2] {
        self.incoming
    }

    /// Mean outer boundary position.
    #[must_use]
    pub fn outgoing(&self) -> [f64; 2] {
        self.outgoing
    }

    /// Azimuth of the inner boundary.
    #[must_use]
    pub fn incoming_phi(&self) -> f64 {
        wrap_phi(self.incoming[1].atan2(self.incoming[0]))
    }

    /// Azimuth of the outer boundary.
    #[must_use]
    pub fn outgoing_phi(&self) -> f64 {
        wrap_phi(self.outgoing[1].atan2(self.outgoing[0]))
    }

    /// Radius of the inner boundary.
    #[must_use]
    pub fn r_in(&self) -> f64 {
        self.r_in
    }

    /// Radius of the outer boundary.
    #[must_use]
    pub fn r_out(&self) -> f64 {
        self.r_out
    }

    /// Mean radius of the segment.
    #[must_use]
    pub fn radius(&self) -> f64 {
        0.5 * (self.r_in + self.r_out)
    }

    /// Signed inverse momentum of the circle through the origin and both
    /// boundaries: `2α (out × in) / (|in| |out| |in − out|)`.
    #[must_use]
    pub fn kappa(&self) -> f64 {
        self.kappa
    }

    /// Number of occupied rows between the boundaries, inclusive.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.outer_row - self.inner_row + 1
    }

    /// Track currently holding this segment.
    #[must_use]
    pub fn owner(&self) -> Option<usize> {
        self.owner
    }
}

/// Classification rule shared by construction and re-evaluation after merges.
#[must_use]
pub fn classify(inner_row: usize, outer_row: usize, max_span: usize, n_rows: usize) -> SegmentKind {
    if max_span > 2 {
        return SegmentKind::Complicated;
    }
    let separation = outer_row - inner_row;
    let full = n_rows.saturating_sub(3);
    if separation >= full {
        SegmentKind::Simple
    } else if inner_row == 0 {
        SegmentKind::InnerShort
    } else if outer_row + 1 == n_rows {
        SegmentKind::OuterShort
    } else {
        SegmentKind::Residual
    }
}

/// Signed inverse momentum of the circle through the origin, `outer` and
/// `inner`; positive for clockwise bending when walking outwards.
#[must_use]
pub fn chord_kappa(outer: [f64; 2], inner: [f64; 2]) -> f64 {
    let r_outer = outer[0].hypot(outer[1]);
    let r_inner = inner[0].hypot(inner[1]);
    let chord = (outer[0] - inner[0]).hypot(outer[1] - inner[1]);
    let denominator = r_outer * r_inner * chord;
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    2.0 * ALPHA * (outer[0] * inner[1] - outer[1] * inner[0]) / denominator
}

/// Width in cells of one row's hits, taking the azimuthal wrap into account.
fn row_span(chamber: &DriftChamber, row: &[WireId], n_wires: usize) -> usize {
    if row.len() <= 1 {
        return row.len();
    }
    let first = usize::from(chamber.wire(row[0]).local());
    let last = usize::from(chamber.wire(row[row.len() - 1]).local());
    let mut max_gap = first + n_wires - last;
    for pair in row.windows(2) {
        let a = usize::from(chamber.wire(pair[0]).local());
        let b = usize::from(chamber.wire(pair[1]).local());
        max_gap = max_gap.max(b - a);
    }
    n_wires - max_gap + 1
}

fn mean_position(chamber: &DriftChamber, hits: &Arena<WireId>) -> [f64; 2] {
    if hits.is_empty() {
        return [0.0; 2];
    }
    let mut sum = [0.0; 2];
    for &hit in hits {
        let [x, y] = chamber.wire(hit).position();
        sum[0] += x;
        sum[1] += y;
    }
    let n = hits.len() as f64;
    [sum[0] / n, sum[1] / n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use l3trig_core::ChamberConfig;

    fn chamber() -> DriftChamber {
        DriftChamber::new(&ChamberConfig::standard()).unwrap()
    }

    fn hits(chamber: &DriftChamber, cells: &[(u16, u16)]) -> Arena<WireId> {
        cells
            .iter()
            .map(|&(layer, wire)| chamber.wire_id(layer, wire).unwrap())
            .collect()
    }

    #[test]
    fn test_classify_rules() {
        assert_eq!(classify(0, 5, 1, 6), SegmentKind::Simple);
        assert_eq!(classify(1, 4, 2, 6), SegmentKind::Simple);
        assert_eq!(classify(0, 1, 1, 6), SegmentKind::InnerShort);
        assert_eq!(classify(4, 5, 1, 6), SegmentKind::OuterShort);
        assert_eq!(classify(2, 3, 1, 6), SegmentKind::Residual);
        assert_eq!(classify(0, 5, 3, 6), SegmentKind::Complicated);
    }

    #[test]
    fn test_segment_across_superlayer() {
        let chamber = chamber();
        // Superlayer 2 spans layers 14..20 with 192 wires.
        let cells: Vec<(u16, u16)> = (14..20).map(|layer| (layer, 40)).collect();
        let segment = Segment::new(&chamber, 2, hits(&chamber, &cells));

        assert_eq!(segment.kind(), SegmentKind::Simple);
        assert_eq!(segment.inner_row(), 0);
        assert_eq!(segment.outer_row(), 5);
        assert_eq!(segment.max_span(), 1);
        assert_eq!(segment.inner_bound().len(), 1);
        assert!(segment.r_in() < segment.r_out());
        assert!(segment.kappa().abs() < 1.0);
    }

    #[test]
    fn test_row_span_wraps_around() {
        let chamber = chamber();
        let segment = Segment::new(&chamber, 2, hits(&chamber, &[(14, 191), (14, 0), (15, 0)]));
        assert_eq!(segment.max_span(), 2);

        let wide = Segment::new(&chamber, 2, hits(&chamber, &[(14, 190), (14, 0), (15, 0)]));
        assert_eq!(wide.max_span(), 3);
        assert_eq!(wide.kind(), SegmentKind::Complicated);
    }

    #[test]
    fn test_merge_reclassifies() {
        let chamber = chamber();
        let mut inner = Segment::new(&chamber, 2, hits(&chamber, &[(14, 40), (15, 40)]));
        let outer = Segment::new(&chamber, 2, hits(&chamber, &[(18, 41), (19, 41)]));
        assert_eq!(inner.kind(), SegmentKind::InnerShort);
        assert_eq!(outer.kind(), SegmentKind::OuterShort);

        inner.merge(&outer, &chamber);
        assert_eq!(inner.kind(), SegmentKind::Simple);
        assert_eq!(inner.hits().len(), 4);
        assert_eq!(inner.n_rows(), 6);

        inner.absorb(chamber.wire_id(16, 40).unwrap(), &chamber);
        assert_eq!(inner.hits().len(), 5);
    }

    #[test]
    fn test_chord_kappa_sign_and_degenerate() {
        // Clockwise bending: the outer point lies at smaller azimuth.
        let inner = [30.0, 0.0];
        let outer = [60.0 * (-0.05_f64).cos(), 60.0 * (-0.05_f64).sin()];
        assert!(chord_kappa(outer, inner) > 0.0);
        assert!(chord_kappa(inner, inner).abs() < f64::EPSILON);
    }
}
