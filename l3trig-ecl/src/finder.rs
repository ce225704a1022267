//! Energy-seeded cluster finder.
//!
//! Hit crystals are visited from the most energetic down. Each unclustered
//! one seeds a region grown through the four lattice neighbors; the seed is
//! therefore always the most energetic member. Regions that miss the seed or
//! total threshold are dropped as a whole, but their crystals stay claimed
//! for the rest of the pass.
#![allow(clippy::cast_precision_loss)]

use crate::lattice::{CrystalId, CrystalLattice, CrystalState, Direction};
use l3trig_core::{
    Arena, CalorimeterConfig, ClusterRecord, ClusterThresholds, CrystalHit, Result, TriggerConfig,
};

/// One connected region of hit crystals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cluster {
    crystals: Arena<CrystalId>,
    seed: Option<CrystalId>,
    energy: f64,
}

impl Cluster {
    /// Member crystals in visiting order, seed first.
    #[must_use]
    pub fn crystals(&self) -> &Arena<CrystalId> {
        &self.crystals
    }

    #[must_use]
    pub fn seed(&self) -> Option<CrystalId> {
        self.seed
    }

    /// Summed energy (GeV).
    #[must_use]
    pub fn energy(&self) -> f64 {
        self.energy
    }

    fn record(&self, lattice: &CrystalLattice) -> Option<ClusterRecord> {
        let seed = lattice.crystal(self.seed?);
        let mut centroid = [0.0; 3];
        for &id in &self.crystals {
            let crystal = lattice.crystal(id);
            let [x, y, z] = crystal.position();
            centroid[0] += crystal.energy() * x;
            centroid[1] += crystal.energy() * y;
            centroid[2] += crystal.energy() * z;
        }
        if self.energy > 0.0 {
            for c in &mut centroid {
                *c /= self.energy;
            }
        }
        Some(ClusterRecord {
            energy: self.energy,
            seed_energy: seed.energy(),
            seed: seed.id().0,
            seed_position: seed.position(),
            centroid,
            n_crystals: self.crystals.len(),
        })
    }
}

/// Counters of one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStatistics {
    pub hits_received: usize,
    pub hits_accepted: usize,
    pub out_of_range: usize,
    pub below_threshold: usize,
    pub duplicates: usize,
    pub clusters: usize,
    pub discarded: usize,
}

/// Calorimeter cluster finder.
#[derive(Debug, Clone)]
pub struct ClusterFinder {
    lattice: CrystalLattice,
    thresholds: ClusterThresholds,
    hits: Arena<CrystalId>,
    stack: Arena<CrystalId>,
    clusters: Arena<Cluster>,
    statistics: ClusterStatistics,
}

impl ClusterFinder {
    /// Builds the lattice and empty working sets.
    ///
    /// # Errors
    /// Fails on an invalid calorimeter configuration or thresholds.
    pub fn new(config: &CalorimeterConfig, thresholds: ClusterThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self {
            lattice: CrystalLattice::new(config)?,
            thresholds,
            hits: Arena::new(),
            stack: Arena::new(),
            clusters: Arena::new(),
            statistics: ClusterStatistics::default(),
        })
    }

    /// Builds the finder from the calorimeter sections of a full
    /// configuration.
    ///
    /// # Errors
    /// Fails if the configuration does not validate.
    pub fn from_config(config: &TriggerConfig) -> Result<Self> {
        config.validate()?;
        Self::new(&config.calorimeter, config.clustering)
    }

    /// Lattice and current crystal states.
    #[must_use]
    pub fn lattice(&self) -> &CrystalLattice {
        &self.lattice
    }

    /// Accepted clusters of the last event.
    #[must_use]
    pub fn clusters(&self) -> &Arena<Cluster> {
        &self.clusters
    }

    /// Counters of the last event.
    #[must_use]
    pub fn statistics(&self) -> &ClusterStatistics {
        &self.statistics
    }

    /// Clusters one event.
    pub fn process(&mut self, hits: &[CrystalHit]) -> Vec<ClusterRecord> {
        self.clear();
        self.ingest(hits);
        self.grow_clusters();
        self.cleanup();
        log::debug!("cluster finder: {:?}", self.statistics);
        self.clusters
            .iter()
            .filter_map(|cluster| cluster.record(&self.lattice))
            .collect()
    }

    fn clear(&mut self) {
        for &id in &self.hits {
            self.lattice.crystal_mut(id).state.reset();
            self.lattice.crystal_mut(id).energy = 0.0;
        }
        self.hits.clear();
        self.stack.clear();
        self.clusters.clear();
        self.statistics = ClusterStatistics::default();
    }

    fn ingest(&mut self, hits: &[CrystalHit]) {
        self.statistics.hits_received = hits.len();
        for hit in hits {
            let id = match self.lattice.crystal_id(hit.cell) {
                Ok(id) => id,
                Err(err) => {
                    log::warn!("skipping crystal hit: {err}");
                    self.statistics.out_of_range += 1;
                    continue;
                }
            };
            let energy = hit.amplitude * self.thresholds.gain;
            if energy <= self.thresholds.hit_threshold {
                self.statistics.below_threshold += 1;
                continue;
            }
            let crystal = self.lattice.crystal_mut(id);
            if crystal.state.is_hit() {
                self.statistics.duplicates += 1;
                continue;
            }
            crystal.state.insert(CrystalState::HIT);
            crystal.energy = energy;
            self.hits.push(id);
            self.statistics.hits_accepted += 1;
        }

        let lattice = &self.lattice;
        self.hits.as_mut_slice().sort_by(|&a, &b| {
            let (ea, eb) = (lattice.crystal(a).energy(), lattice.crystal(b).energy());
            eb.total_cmp(&ea).then(a.cmp(&b))
        });
    }

    fn grow_clusters(&mut self) {
        for index in 0..self.hits.len() {
            let seed = self.hits[index];
            if !self.lattice.crystal(seed).state().is_free() {
                continue;
            }
            let cluster = self.flood_fill(seed);
            let seed_energy = self.lattice.crystal(seed).energy();
            if seed_energy < self.thresholds.seed_threshold
                || cluster.energy < self.thresholds.cluster_threshold
            {
                log::trace!(
                    "dropping cluster at crystal {}: seed {seed_energy:.3}, total {:.3}",
                    seed.0,
                    cluster.energy
                );
                self.statistics.discarded += 1;
                continue;
            }
            self.clusters.push(cluster);
            self.statistics.clusters += 1;
        }
    }

    fn flood_fill(&mut self, seed: CrystalId) -> Cluster {
        let sentinel = self.lattice.sentinel();
        let mut cluster = Cluster {
            seed: Some(seed),
            ..Cluster::default()
        };
        let crystal = self.lattice.crystal_mut(seed);
        crystal.state.insert(CrystalState::CLUSTERED);
        cluster.energy += crystal.energy;
        cluster.crystals.push(seed);
        self.stack.clear();
        self.stack.push(seed);

        while let Some(current) = self.stack.pop() {
            for direction in Direction::ALL {
                let slot = direction.slot();
                if self.lattice.crystal(current).state().is_checked(slot) {
                    continue;
                }
                self.lattice.crystal_mut(current).state.set_checked(slot);

                let neighbor = self.lattice.crystal(current).neighbor(direction);
                if neighbor == sentinel || !self.lattice.crystal(neighbor).state().is_hit() {
                    continue;
                }
                // Ring remapping is not always symmetric.
                let back = direction.opposite().slot();
                let other = self.lattice.crystal_mut(neighbor);
                if other.neighbors[back] == current {
                    other.state.set_checked(back);
                }
                if other.state.is_free() {
                    other.state.insert(CrystalState::CLUSTERED);
                    cluster.energy += other.energy;
                    cluster.crystals.push(neighbor);
                    self.stack.push(neighbor);
                }
            }
        }
        cluster
    }

    fn cleanup(&mut self) {
        for &id in &self.hits {
            self.lattice.crystal_mut(id).state.clear_visit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn finder() -> ClusterFinder {
        ClusterFinder::new(&CalorimeterConfig::standard(), ClusterThresholds::default()).unwrap()
    }

    #[test]
    fn test_empty_event() {
        let mut finder = finder();
        assert!(finder.process(&[]).is_empty());
        assert_eq!(finder.statistics(), &ClusterStatistics::default());
    }

    #[test]
    fn test_ingest_counters() {
        let mut finder = finder();
        let hits = [
            CrystalHit::new(100, 0.5),
            CrystalHit::new(100, 0.4),
            CrystalHit::new(9000, 1.0),
            CrystalHit::new(101, 0.0),
        ];
        finder.process(&hits);
        let stats = finder.statistics();
        assert_eq!(stats.hits_received, 4);
        assert_eq!(stats.hits_accepted, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.out_of_range, 1);
        assert_eq!(stats.below_threshold, 1);
    }

    #[test]
    fn test_gain_scales_energy() {
        let thresholds = ClusterThresholds {
            gain: 0.5,
            ..ClusterThresholds::default()
        };
        let mut finder = ClusterFinder::new(&CalorimeterConfig::standard(), thresholds).unwrap();
        let records = finder.process(&[CrystalHit::new(2000, 1.0)]);
        assert_eq!(records.len(), 1);
        assert_relative_eq!(records[0].energy, 0.5);
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let thresholds = ClusterThresholds::default().with_seed_threshold(-0.5);
        assert!(ClusterFinder::new(&CalorimeterConfig::standard(), thresholds).is_err());
    }

    #[test]
    fn test_separate_regions_give_separate_clusters() {
        let mut finder = finder();
        let a = finder.lattice().crystal_at(30, 10).unwrap();
        let b = finder.lattice().crystal_at(30, 80).unwrap();
        let records = finder.process(&[CrystalHit::new(a.0, 0.4), CrystalHit::new(b.0, 0.6)]);
        assert_eq!(records.len(), 2);
        // Most energetic seed first.
        assert_eq!(records[0].seed, b.0);
        assert_eq!(records[1].seed, a.0);
    }

    #[test]
    fn test_hits_reset_between_events() {
        let mut finder = finder();
        let id = finder.lattice().crystal_at(40, 3).unwrap();
        finder.process(&[CrystalHit::new(id.0, 0.5)]);
        assert!(finder.lattice().crystal(id).state().is_hit());
        assert!(finder.process(&[]).is_empty());
        assert!(!finder.lattice().crystal(id).state().is_hit());
        assert_relative_eq!(finder.lattice().crystal(id).energy(), 0.0);
    }
}
