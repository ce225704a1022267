//! Axial segment chaining and conflict resolution.
//!
//! Chains are grown inward from a seed segment, one axial superlayer at a
//! time, by picking the segment that keeps the curvature chi-square lowest.
//! Each step mixes the segment's own curvature with a "gap" curvature
//! computed across the space between the two segments. A finished chain is
//! committed against the tracks found so far by a pure comparison; tracks
//! are never edited while a chain is being built.
#![allow(clippy::cast_precision_loss)]

use crate::segment::{chord_kappa, SegmentRef};
use crate::superlayer::SuperLayerHits;
use crate::track::Track;
use crate::wire::delta_phi;
use crate::DriftChamber;
use l3trig_core::{Arena, TrackThresholds};

/// A candidate chain of axial segments, outermost first.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    pub segments: Arena<SegmentRef>,
    pub kappa: f64,
    pub chi2: f64,
}

impl Chain {
    /// Number of linked segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for an empty chain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Minimum number of axial segments in a track.
pub const MIN_CHAIN: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
struct Sums {
    k: f64,
    rr: f64,
    krr: f64,
    kkrr: f64,
}

impl Sums {
    fn with(self, k: f64, rr: f64) -> Self {
        Self {
            k: self.k + k,
            rr: self.rr + rr,
            krr: self.krr + k * rr,
            kkrr: self.kkrr + k * k * rr,
        }
    }

    /// Weighted spread of the curvature terms around their mean.
    fn chi2(&self, terms: f64) -> f64 {
        let mu = self.k / terms;
        (mu * mu * self.rr - 2.0 * mu * self.krr + self.kkrr) / terms
    }
}

/// Grows a chain inward from `seed`.
///
/// `axial` lists the axial superlayer indices, innermost first. The seed
/// must lie at axial position 2 or above. While the chain has a single
/// segment the walk may skip superlayers, but not down to position 0.
/// Returns `None` for chains shorter than [`MIN_CHAIN`].
#[must_use]
pub fn link_axial(
    chamber: &DriftChamber,
    seed: SegmentRef,
    store: &[SuperLayerHits],
    axial: &[usize],
    thresholds: &TrackThresholds,
) -> Option<Chain> {
    let mut current = axial.iter().position(|&sl| sl == seed.superlayer)?;
    if current < 2 {
        return None;
    }

    let initial = &store[seed.superlayer].segments[seed.index];
    let mut segments = Arena::with_capacity(axial.len());
    segments.push(seed);
    let radius = initial.radius();
    let mut sums = Sums::default().with(initial.kappa(), radius * radius);
    let mut running = thresholds.initial_chain_chi2;

    loop {
        let Some(&last) = segments.last() else {
            break;
        };
        let outer = &store[last.superlayer].segments[last.index];
        let Some(&inner_hit) = outer.inner_bound().first() else {
            break;
        };
        let incoming = outer.incoming();
        let in_r = chamber.layer_of(inner_hit).radius();
        let incoming_phi = chamber.wire(inner_hit).phi();

        let n = segments.len() as f64;
        let limit = usize::from(segments.len() == 1);
        let mut best: Option<(SegmentRef, Sums)> = None;
        let mut min_chi2 = thresholds.link_chi2_window;
        let mut j = current;
        loop {
            j -= 1;
            let superlayer = axial[j];
            for (index, next) in store[superlayer].segments.iter().enumerate() {
                let Some(&outer_hit) = next.outer_bound().first() else {
                    continue;
                };
                if delta_phi(incoming_phi, chamber.wire(outer_hit).phi())
                    > thresholds.link_phi_window
                {
                    continue;
                }
                let out_r = chamber.layer_of(outer_hit).radius();
                let gap_k = chord_kappa(incoming, next.outgoing());
                let gap = if current == j + 1 {
                    0.5 * (in_r + out_r)
                } else {
                    in_r + out_r
                };
                let seg_rr = next.radius() * next.radius();
                let trial = sums.with(next.kappa(), seg_rr).with(gap_k, gap * gap);
                let chi2 = trial.chi2(2.0 * n + 1.0);
                if chi2 - running < min_chi2 {
                    min_chi2 = chi2;
                    best = Some((SegmentRef { superlayer, index }, trial));
                }
            }
            if best.is_some() || j == limit {
                break;
            }
        }

        let Some((next, trial)) = best else {
            break;
        };
        segments.push(next);
        sums = trial;
        running = min_chi2;
        current = j;
        if current == 0 {
            break;
        }
    }

    let n = segments.len();
    if n < MIN_CHAIN {
        return None;
    }
    Some(Chain {
        segments,
        kappa: sums.k / (2 * n - 1) as f64,
        chi2: running,
    })
}

/// Returns true if a candidate should replace a committed track: the longer
/// chain wins; on equal length the lower chi-square wins.
#[must_use]
pub fn prefer_candidate(
    candidate_len: usize,
    candidate_chi2: f64,
    committed_len: usize,
    committed_chi2: f64,
) -> bool {
    match candidate_len.cmp(&committed_len) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => candidate_chi2 < committed_chi2,
    }
}

/// What happened to a candidate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// New track at this index.
    Appended(usize),
    /// Committed track at this index was replaced.
    Replaced(usize),
    /// The candidate lost against a committed track.
    Discarded,
}

/// Resolves a candidate against the committed tracks.
///
/// Without a majority of already-owned segments the candidate is appended
/// and takes over the shared segments. When more than half of its segments
/// are owned, and more than half of those belong to one track, the two are
/// compared with [`prefer_candidate`] and the loser is dropped. Any other
/// majority overlap discards the candidate.
pub fn commit(chain: Chain, tracks: &mut Arena<Track>, store: &mut [SuperLayerHits]) -> Commit {
    let n = chain.len();
    let mut owners: Arena<(usize, usize)> = Arena::new();
    let mut n_owned = 0;
    for r in &chain.segments {
        let Some(owner) = store[r.superlayer].segments[r.index].owner else {
            continue;
        };
        n_owned += 1;
        match owners.iter_mut().find(|(track, _)| *track == owner) {
            Some((_, count)) => *count += 1,
            None => {
                owners.push((owner, 1));
            }
        }
    }

    if 2 * n_owned <= n {
        let index = tracks.len();
        set_owner(store, &chain.segments, Some(index));
        tracks.push(Track::new(chain));
        return Commit::Appended(index);
    }

    // First owner with the highest count.
    let mut dominant: Option<(usize, usize)> = None;
    for &(track, count) in &owners {
        if dominant.is_none_or(|(_, best)| count > best) {
            dominant = Some((track, count));
        }
    }
    let Some((index, count)) = dominant else {
        return Commit::Discarded;
    };
    if 2 * count <= n_owned {
        return Commit::Discarded;
    }

    let committed = &tracks[index];
    if !prefer_candidate(n, chain.chi2, committed.axial.len(), committed.chain_chi2) {
        return Commit::Discarded;
    }
    set_owner(store, &tracks[index].axial, None);
    set_owner(store, &chain.segments, Some(index));
    tracks.replace(index, Track::new(chain));
    Commit::Replaced(index)
}

fn set_owner(store: &mut [SuperLayerHits], segments: &Arena<SegmentRef>, owner: Option<usize>) {
    for r in segments {
        store[r.superlayer].segments[r.index].owner = owner;
    }
}
