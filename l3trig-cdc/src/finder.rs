//! Per-event track-finder state machine.
//!
//! [`TrackFinder`] owns the chamber geometry and every per-event working
//! set. [`TrackFinder::process`] runs the stages of [`Stage`] strictly in
//! order; a failing candidate only shrinks the track list, and the event
//! always reaches [`Stage::Done`] unless the optional time budget runs out.

use crate::geometry::DriftChamber;
use crate::line::SzPoint;
use crate::linker::{commit, link_axial, Commit};
use crate::segment::SegmentRef;
use crate::stereo::{fit_sz, link_stereo};
use crate::superlayer::{find_segments, SuperLayerHits};
use crate::timing::{apply_timing, event_timing};
use crate::track::Track;
use crate::vertex::{vertex_2d, vertex_3d};
use crate::wire::{WireId, WireState};
use l3trig_core::{
    Arena, ChamberConfig, DriftConfig, Result, TrackRecord, TrackThresholds, TriggerConfig,
    WireHit,
};
use std::time::{Duration, Instant};

/// Stages of one event, in execution order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    Clear,
    Ingest,
    Segments,
    AxialChaining,
    Fit2d,
    Vertex2d,
    TimingCorrection,
    Refit2d,
    StereoMatching,
    FitSz,
    Vertex3d,
    #[default]
    Done,
}

impl Stage {
    /// The stage after this one; `Done` is terminal.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Clear => Self::Ingest,
            Self::Ingest => Self::Segments,
            Self::Segments => Self::AxialChaining,
            Self::AxialChaining => Self::Fit2d,
            Self::Fit2d => Self::Vertex2d,
            Self::Vertex2d => Self::TimingCorrection,
            Self::TimingCorrection => Self::Refit2d,
            Self::Refit2d => Self::StereoMatching,
            Self::StereoMatching => Self::FitSz,
            Self::FitSz => Self::Vertex3d,
            Self::Vertex3d | Self::Done => Self::Done,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Clear => "clear",
            Self::Ingest => "ingest",
            Self::Segments => "segments",
            Self::AxialChaining => "axial chaining",
            Self::Fit2d => "2d fit",
            Self::Vertex2d => "2d vertex",
            Self::TimingCorrection => "timing correction",
            Self::Refit2d => "2d refit",
            Self::StereoMatching => "stereo matching",
            Self::FitSz => "s-z fit",
            Self::Vertex3d => "3d vertex",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Counters of one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinderStatistics {
    pub hits_received: usize,
    pub hits_accepted: usize,
    pub out_of_range: usize,
    pub blocked: usize,
    pub out_of_window: usize,
    pub duplicates: usize,
    pub vetoed: usize,
    pub clusters: usize,
    pub segments: usize,
    pub complicated: usize,
    pub merged_shorts: usize,
    pub chains: usize,
    pub replaced: usize,
    pub discarded: usize,
    pub fit_failures: usize,
    pub salvaged: usize,
    pub refit_failures: usize,
    pub stereo_links: usize,
    pub stereo_deferred: usize,
    pub sz_fitted: usize,
    pub timed_out: bool,
}

/// Result of one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinderOutput {
    /// Tracks that survived every fit.
    pub tracks: Vec<TrackRecord>,
    /// Transverse vertex used in the refit.
    pub vertex_2d: Option<[f64; 2]>,
    /// Three-dimensional vertex, when enabled and computable.
    pub vertex: Option<[f64; 3]>,
    /// Drift-time correction (ns).
    pub event_timing: f64,
    /// `Done`, or the first stage skipped when the time budget ran out.
    pub stage: Stage,
}

/// Drift-chamber track finder.
#[derive(Debug, Clone)]
pub struct TrackFinder {
    chamber: DriftChamber,
    drift: DriftConfig,
    thresholds: TrackThresholds,
    superlayers: Vec<SuperLayerHits>,
    tracks: Arena<Track>,
    masked: Arena<WireId>,
    stack: Arena<WireId>,
    points: Arena<SzPoint>,
    records: Vec<TrackRecord>,
    stage: Stage,
    statistics: FinderStatistics,
    vertex_2d: Option<[f64; 2]>,
    vertex: Option<[f64; 3]>,
    event_timing: f64,
}

impl TrackFinder {
    /// Builds the geometry and empty working sets.
    ///
    /// # Errors
    /// Fails on an invalid chamber configuration.
    pub fn new(
        chamber: &ChamberConfig,
        drift: DriftConfig,
        thresholds: TrackThresholds,
    ) -> Result<Self> {
        let chamber = DriftChamber::new(chamber)?;
        let n_superlayers = chamber.superlayers().len();
        Ok(Self {
            chamber,
            drift,
            thresholds,
            superlayers: vec![SuperLayerHits::default(); n_superlayers],
            tracks: Arena::new(),
            masked: Arena::new(),
            stack: Arena::new(),
            points: Arena::new(),
            records: Vec::new(),
            stage: Stage::Done,
            statistics: FinderStatistics::default(),
            vertex_2d: None,
            vertex: None,
            event_timing: 0.0,
        })
    }

    /// Builds the finder from the tracking sections of a full configuration.
    ///
    /// # Errors
    /// Fails if the configuration does not validate.
    pub fn from_config(config: &TriggerConfig) -> Result<Self> {
        config.validate()?;
        Self::new(&config.chamber, config.drift, config.tracking.clone())
    }

    /// Chamber geometry and current wire states.
    #[must_use]
    pub fn chamber(&self) -> &DriftChamber {
        &self.chamber
    }

    /// Tracks of the last event.
    #[must_use]
    pub fn tracks(&self) -> &Arena<Track> {
        &self.tracks
    }

    /// Working set of one superlayer.
    #[must_use]
    pub fn superlayer_hits(&self, superlayer: usize) -> Option<&SuperLayerHits> {
        self.superlayers.get(superlayer)
    }

    /// Counters of the last event.
    #[must_use]
    pub fn statistics(&self) -> &FinderStatistics {
        &self.statistics
    }

    /// Stage the finder is in; `Done` between events.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Masks wires for the next event only.
    ///
    /// # Errors
    /// Fails without masking anything if a wire does not exist.
    pub fn mask_wires_for_event(&mut self, wires: &[(u16, u16)]) -> Result<()> {
        for &(layer, wire) in wires {
            self.chamber.wire_id(layer, wire)?;
        }
        for &(layer, wire) in wires {
            let id = self.chamber.wire_id(layer, wire)?;
            self.masked.push(id);
        }
        Ok(())
    }

    /// Runs one event through every stage.
    pub fn process(&mut self, hits: &[WireHit]) -> FinderOutput {
        let started = Instant::now();
        let budget = self.thresholds.time_budget_us.map(Duration::from_micros);

        self.stage = Stage::Clear;
        while self.stage != Stage::Done {
            let next = self.run_stage(hits);
            if next != Stage::Done && budget.is_some_and(|budget| started.elapsed() > budget) {
                log::warn!(
                    "track finder: time budget exhausted, stopping before {next} with {} tracks",
                    self.tracks.len()
                );
                self.statistics.timed_out = true;
                self.stage = next;
                break;
            }
            self.stage = next;
        }

        log::debug!("track finder: {:?}", self.statistics);
        let stage = std::mem::replace(&mut self.stage, Stage::Done);
        FinderOutput {
            tracks: self.tracks.iter().filter_map(Track::record).collect(),
            vertex_2d: self.vertex_2d,
            vertex: self.vertex,
            event_timing: self.event_timing,
            stage,
        }
    }

    /// Runs the current stage and returns the next one.
    fn run_stage(&mut self, hits: &[WireHit]) -> Stage {
        match self.stage {
            Stage::Clear => self.clear(),
            Stage::Ingest => self.ingest(hits),
            Stage::Segments => self.find_segments(),
            Stage::AxialChaining => self.chain_axial(),
            Stage::Fit2d => {
                self.fit_2d();
                if self.tracks.is_empty() {
                    return Stage::Done;
                }
            }
            Stage::Vertex2d => {
                self.collect_records();
                self.vertex_2d = vertex_2d(&self.records);
            }
            Stage::TimingCorrection => {
                self.event_timing =
                    event_timing(&self.chamber, &self.superlayers, &self.tracks, &self.drift);
                apply_timing(
                    &mut self.chamber,
                    &self.superlayers,
                    &self.drift,
                    self.event_timing,
                );
            }
            Stage::Refit2d => {
                self.refit_2d();
                if self.tracks.is_empty() {
                    return Stage::Done;
                }
            }
            Stage::StereoMatching => {
                let counts = link_stereo(
                    &self.chamber,
                    &mut self.superlayers,
                    &mut self.tracks,
                    self.chamber.stereo_superlayers(),
                    &self.thresholds,
                );
                self.statistics.stereo_links = counts.unique + counts.resolved;
                self.statistics.stereo_deferred = counts.ambiguous;
            }
            Stage::FitSz => self.fit_sz(),
            Stage::Vertex3d => {
                if self.thresholds.find_event_vertex {
                    self.collect_records();
                    self.vertex = vertex_3d(&self.records);
                }
            }
            Stage::Done => {}
        }
        self.stage.next()
    }

    fn clear(&mut self) {
        self.chamber.reset();
        for superlayer in &mut self.superlayers {
            superlayer.clear();
        }
        self.tracks.clear();
        for &id in &self.masked {
            self.chamber.wire_mut(id).state.insert(WireState::MASKED);
        }
        self.masked.clear();
        self.statistics = FinderStatistics::default();
        self.vertex_2d = None;
        self.vertex = None;
        self.event_timing = 0.0;
    }

    fn ingest(&mut self, hits: &[WireHit]) {
        self.statistics.hits_received = hits.len();
        for hit in hits {
            let id = match self.chamber.wire_id(hit.layer, hit.wire) {
                Ok(id) => id,
                Err(err) => {
                    log::warn!("skipping wire hit: {err}");
                    self.statistics.out_of_range += 1;
                    continue;
                }
            };
            let state = self.chamber.wire(id).state();
            if state.is_blocked() {
                self.statistics.blocked += 1;
                continue;
            }
            if state.is_hit() {
                self.statistics.duplicates += 1;
                continue;
            }
            if !self.drift.accepts(hit.drift_time) {
                self.statistics.out_of_window += 1;
                continue;
            }
            let cell = self.chamber.layer_of(id).cell_size();
            let superlayer = self.chamber.superlayer_of(id);
            let wire = self.chamber.wire_mut(id);
            wire.state.insert(WireState::HIT);
            wire.time = hit.drift_time;
            wire.distance = self.drift.distance(hit.drift_time, cell);
            self.superlayers[superlayer].hits.push(id);
            self.statistics.hits_accepted += 1;
        }
    }

    fn find_segments(&mut self) {
        for (superlayer, store) in self.superlayers.iter_mut().enumerate() {
            if store.hits.is_empty() {
                continue;
            }
            let counts = find_segments(
                &mut self.chamber,
                superlayer,
                store,
                &mut self.stack,
                self.thresholds.short_merge_pitch,
            );
            self.statistics.vetoed += counts.vetoed;
            self.statistics.clusters += counts.clusters;
            self.statistics.segments += counts.segments;
            self.statistics.complicated += counts.complicated;
            self.statistics.merged_shorts += counts.merged;
        }
    }

    fn chain_axial(&mut self) {
        let axial = self.chamber.axial_superlayers();
        for position in (2..axial.len()).rev() {
            let superlayer = axial[position];
            for index in 0..self.superlayers[superlayer].segments.len() {
                if self.superlayers[superlayer].segments[index].owner.is_some() {
                    continue;
                }
                let seed = SegmentRef { superlayer, index };
                let Some(chain) =
                    link_axial(&self.chamber, seed, &self.superlayers, axial, &self.thresholds)
                else {
                    continue;
                };
                log::trace!(
                    "chain from {superlayer}/{index}: {} segments, chi2 {:.1}",
                    chain.len(),
                    chain.chi2
                );
                match commit(chain, &mut self.tracks, &mut self.superlayers) {
                    Commit::Appended(_) => self.statistics.chains += 1,
                    Commit::Replaced(_) => self.statistics.replaced += 1,
                    Commit::Discarded => self.statistics.discarded += 1,
                }
            }
        }
    }

    fn fit_2d(&mut self) {
        let mut i = 0;
        while i < self.tracks.len() {
            match self.tracks[i].fit_transverse(&self.chamber, &self.superlayers, &self.thresholds)
            {
                Ok(_) => i += 1,
                Err(failure) => {
                    log::trace!("track {i} dropped in 2d fit: {failure}");
                    self.tracks.swap_remove(i);
                    self.statistics.fit_failures += 1;
                }
            }
        }
        self.restamp_owners();
    }

    fn refit_2d(&mut self) {
        let Some(&innermost) = self.chamber.axial_superlayers().first() else {
            return;
        };
        let mut i = 0;
        while i < self.tracks.len() {
            self.statistics.salvaged += self.tracks[i].salvage(
                &mut self.chamber,
                &self.superlayers,
                innermost,
                &self.thresholds,
            );
            match self.tracks[i].refit_transverse(
                &self.chamber,
                &self.superlayers,
                self.vertex_2d,
                &self.thresholds,
            ) {
                Ok(_) => i += 1,
                Err(failure) => {
                    log::trace!("track {i} dropped in 2d refit: {failure}");
                    self.tracks.swap_remove(i);
                    self.statistics.refit_failures += 1;
                }
            }
        }
        self.restamp_owners();
    }

    fn fit_sz(&mut self) {
        for i in 0..self.tracks.len() {
            let fitted = fit_sz(
                &self.chamber,
                &self.superlayers,
                &self.tracks[i],
                &self.thresholds.sz_outlier_cuts,
                &mut self.points,
            );
            if fitted.is_fitted() {
                self.statistics.sz_fitted += 1;
            }
            self.tracks[i].longitudinal = fitted;
        }
    }

    /// Points axial segment owners at the current track indices.
    fn restamp_owners(&mut self) {
        for &superlayer in self.chamber.axial_superlayers() {
            for segment in self.superlayers[superlayer].segments.iter_mut() {
                segment.owner = None;
            }
        }
        for (t, track) in self.tracks.iter().enumerate() {
            for r in &track.axial {
                self.superlayers[r.superlayer].segments[r.index].owner = Some(t);
            }
        }
    }

    fn collect_records(&mut self) {
        self.records.clear();
        self.records.extend(self.tracks.iter().filter_map(Track::record));
    }
}
