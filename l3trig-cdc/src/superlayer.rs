//! Per-superlayer segment finding.
//!
//! For each superlayer the hits go through the double-hit veto, a flood fill
//! over the six-neighbor relation, classification of the resulting clusters,
//! and finally merging of short segments.
#![allow(clippy::cast_precision_loss)]

use crate::geometry::DriftChamber;
use crate::segment::{Segment, SegmentKind};
use crate::wire::{delta_phi, Neighbor, WireId, WireState};
use l3trig_core::Arena;

/// Per-event working set of one superlayer.
#[derive(Debug, Clone, Default)]
pub struct SuperLayerHits {
    pub(crate) hits: Arena<WireId>,
    pub(crate) segments: Arena<Segment>,
    pub(crate) complicated: Arena<Segment>,
    pub(crate) leftover: Arena<WireId>,
}

impl SuperLayerHits {
    /// Accepted hits of the superlayer in ingestion order.
    #[must_use]
    pub fn hits(&self) -> &Arena<WireId> {
        &self.hits
    }

    /// Segments available to linking.
    #[must_use]
    pub fn segments(&self) -> &Arena<Segment> {
        &self.segments
    }

    /// Complicated segments kept for salvage.
    #[must_use]
    pub fn complicated(&self) -> &Arena<Segment> {
        &self.complicated
    }

    /// Hits that ended up in no segment.
    #[must_use]
    pub fn leftover(&self) -> &Arena<WireId> {
        &self.leftover
    }

    /// Drops the previous event's contents, keeping the allocations.
    pub fn clear(&mut self) {
        self.hits.clear();
        self.segments.clear();
        self.complicated.clear();
        self.leftover.clear();
    }
}

/// Marks every hit whose left and right neighbors are both hit as invalid.
///
/// Only the hit flag is read, so running the veto twice gives the same
/// result. Returns the number of newly vetoed hits.
pub fn apply_double_hit_veto(chamber: &mut DriftChamber, hits: &Arena<WireId>) -> usize {
    let mut vetoed = 0;
    for &id in hits {
        let wire = chamber.wire(id);
        if !wire.state().is_hit() {
            continue;
        }
        let left = chamber.wire(wire.neighbor(Neighbor::Left)).state();
        let right = chamber.wire(wire.neighbor(Neighbor::Right)).state();
        if left.is_hit() && right.is_hit() {
            let state = &mut chamber.wire_mut(id).state;
            if !state.contains(WireState::INVALID) {
                state.insert(WireState::INVALID);
                vetoed += 1;
            }
        }
    }
    vetoed
}

/// Groups the free hits into connected clusters.
///
/// Every hit joins at most one cluster; every neighbor relation is examined
/// once thanks to the per-slot checked bits, which are set on both ends.
/// The fill is iterative, with `stack` as its work list.
pub fn flood_fill(
    chamber: &mut DriftChamber,
    hits: &Arena<WireId>,
    stack: &mut Arena<WireId>,
) -> Arena<Arena<WireId>> {
    let sentinel = chamber.sentinel();
    let mut clusters = Arena::new();

    for &seed in hits {
        if !chamber.wire(seed).state().is_free() {
            continue;
        }
        let mut cluster = Arena::new();
        chamber.wire_mut(seed).state.insert(WireState::CLUSTERED);
        cluster.push(seed);
        stack.clear();
        stack.push(seed);

        while let Some(current) = stack.pop() {
            for slot in Neighbor::ALL {
                let state = chamber.wire(current).state();
                if state.is_checked(slot.slot()) {
                    continue;
                }
                chamber.wire_mut(current).state.set_checked(slot.slot());

                let neighbor = chamber.wire(current).neighbor(slot);
                if neighbor == sentinel || !chamber.wire(neighbor).state().is_hit() {
                    continue;
                }
                mark_reciprocal(chamber, current, neighbor, slot);

                if chamber.wire(neighbor).state().is_free() {
                    chamber.wire_mut(neighbor).state.insert(WireState::CLUSTERED);
                    cluster.push(neighbor);
                    stack.push(neighbor);
                }
            }
        }
        clusters.push(cluster);
    }
    clusters
}

/// Sets the checked bit of the slot(s) of `neighbor` that point back at `current`.
fn mark_reciprocal(chamber: &mut DriftChamber, current: WireId, neighbor: WireId, slot: Neighbor) {
    let opposite: &[Neighbor] = match slot {
        Neighbor::InnerLeft | Neighbor::InnerRight => &[Neighbor::OuterLeft, Neighbor::OuterRight],
        Neighbor::Left => &[Neighbor::Right],
        Neighbor::Right => &[Neighbor::Left],
        Neighbor::OuterLeft | Neighbor::OuterRight => &[Neighbor::InnerLeft, Neighbor::InnerRight],
    };
    let wire = chamber.wire_mut(neighbor);
    for &back in opposite {
        if wire.neighbors[back.slot()] == current {
            wire.state.set_checked(back.slot());
        }
    }
}

/// Counters of one superlayer's segment finding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentCounts {
    pub vetoed: usize,
    pub clusters: usize,
    pub segments: usize,
    pub complicated: usize,
    pub merged: usize,
    pub absorbed: usize,
}

/// Runs veto, flood fill, classification and short merging for superlayer
/// `superlayer`, filling `store`.
pub fn find_segments(
    chamber: &mut DriftChamber,
    superlayer: usize,
    store: &mut SuperLayerHits,
    stack: &mut Arena<WireId>,
    merge_pitch: f64,
) -> SegmentCounts {
    let mut counts = SegmentCounts {
        vetoed: apply_double_hit_veto(chamber, &store.hits),
        ..SegmentCounts::default()
    };

    let clusters = flood_fill(chamber, &store.hits, stack);
    counts.clusters = clusters.len();

    let mut inner_shorts: Arena<Segment> = Arena::new();
    let mut outer_shorts: Arena<Segment> = Arena::new();
    for cluster in clusters {
        let segment = Segment::new(chamber, superlayer, cluster);
        match segment.kind() {
            SegmentKind::Simple => {
                store.segments.push(segment);
            }
            SegmentKind::Complicated => {
                store.complicated.push(segment);
            }
            SegmentKind::InnerShort => {
                inner_shorts.push(segment);
            }
            SegmentKind::OuterShort => {
                outer_shorts.push(segment);
            }
            SegmentKind::Residual => store.leftover.append(segment.hits()),
        }
    }

    let pitch = chamber.superlayers()[superlayer].n_wires();
    let tolerance = merge_pitch * std::f64::consts::TAU / f64::from(pitch);
    let n_rows = chamber.superlayers()[superlayer].n_layers();

    // Pair each inner short with the closest outer short above it.
    let mut outer_used = vec![false; outer_shorts.len()];
    let mut inner_matched = vec![false; inner_shorts.len()];
    for (i, inner) in inner_shorts.iter_mut().enumerate() {
        let mut best: Option<(usize, f64)> = None;
        for (j, outer) in outer_shorts.iter().enumerate() {
            if outer_used[j] || outer.inner_row() <= inner.outer_row() {
                continue;
            }
            let rows = outer.inner_row() - inner.outer_row();
            if rows > 2 {
                continue;
            }
            let dphi = delta_phi(inner.outgoing_phi(), outer.incoming_phi());
            if dphi <= tolerance * rows as f64 && best.is_none_or(|(_, b)| dphi < b) {
                best = Some((j, dphi));
            }
        }
        if let Some((j, _)) = best {
            inner.merge(&outer_shorts[j], chamber);
            outer_used[j] = true;
            inner_matched[i] = true;
            counts.merged += 1;
        }
    }

    // Unmatched shorts may extend by one leftover hit at their open edge.
    for (i, inner) in inner_shorts.iter_mut().enumerate() {
        if !inner_matched[i] && inner.outer_row() + 1 < n_rows {
            let (row, phi) = (inner.outer_row() + 1, inner.outgoing_phi());
            if absorb_leftover(chamber, inner, &mut store.leftover, row, phi, tolerance) {
                counts.absorbed += 1;
            }
        }
    }
    for (j, outer) in outer_shorts.iter_mut().enumerate() {
        if !outer_used[j] && outer.inner_row() > 0 {
            let (row, phi) = (outer.inner_row() - 1, outer.incoming_phi());
            if absorb_leftover(chamber, outer, &mut store.leftover, row, phi, tolerance) {
                counts.absorbed += 1;
            }
        }
    }

    let survivors = inner_shorts.into_iter().chain(
        outer_shorts
            .into_iter()
            .enumerate()
            .filter(|(j, _)| !outer_used[*j])
            .map(|(_, segment)| segment),
    );
    for segment in survivors {
        if segment.kind() == SegmentKind::Complicated {
            store.complicated.push(segment);
        } else if segment.n_rows() >= 2 {
            store.segments.push(segment);
        } else {
            store.leftover.append(segment.hits());
        }
    }

    counts.segments = store.segments.len();
    counts.complicated = store.complicated.len();
    counts
}

fn absorb_leftover(
    chamber: &DriftChamber,
    segment: &mut Segment,
    leftover: &mut Arena<WireId>,
    row: usize,
    phi: f64,
    tolerance: f64,
) -> bool {
    let mut best: Option<(usize, f64)> = None;
    for (i, &hit) in leftover.iter().enumerate() {
        if chamber.layer_of(hit).row() != row {
            continue;
        }
        let dphi = delta_phi(chamber.wire(hit).phi(), phi);
        if dphi <= tolerance && best.is_none_or(|(_, b)| dphi < b) {
            best = Some((i, dphi));
        }
    }
    match best {
        Some((i, _)) => {
            let hit = leftover.swap_remove(i);
            segment.absorb(hit, chamber);
            true
        }
        None => false,
    }
}
