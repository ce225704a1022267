//! l3trig-ecl: Calorimeter cluster finder for the Level-3 trigger.
//!
//! [`CrystalLattice`] lays the crystals out ring by ring with four neighbors
//! each. [`ClusterFinder`] ingests one event of crystal amplitudes and grows
//! clusters from the most energetic unclustered crystals, keeping those that
//! pass the seed and total energy thresholds.

pub mod finder;
pub mod lattice;

pub use finder::{Cluster, ClusterFinder, ClusterStatistics};
pub use lattice::{Crystal, CrystalId, CrystalLattice, CrystalState, Direction, Ring};
