//! Crystal lattice of the calorimeter.
//!
//! Crystals are stored ring by ring in one table addressed by [`CrystalId`],
//! followed by a sentinel crystal. Each crystal has four neighbor handles fixed
//! at construction: the two azimuthal neighbors of its own ring and the
//! nearest crystal of each adjacent ring. The first and last ring point at the
//! sentinel in their outward direction.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use l3trig_core::{CalorimeterConfig, CellKind, Error, Result};
use std::f64::consts::TAU;

/// Handle of a crystal inside a [`CrystalLattice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrystalId(pub u32);

impl CrystalId {
    /// Position of the crystal in the lattice table.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Neighbor slots of a crystal, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Previous crystal of the same ring.
    MinusPhi = 0,
    /// Next crystal of the same ring.
    PlusPhi = 1,
    /// Nearest crystal of the ring at lower polar angle.
    MinusTheta = 2,
    /// Nearest crystal of the ring at higher polar angle.
    PlusTheta = 3,
}

impl Direction {
    /// All slots in storage order.
    pub const ALL: [Direction; 4] = [
        Direction::MinusPhi,
        Direction::PlusPhi,
        Direction::MinusTheta,
        Direction::PlusTheta,
    ];

    /// Slot index.
    #[inline]
    #[must_use]
    pub fn slot(self) -> usize {
        self as usize
    }

    /// The slot pointing back the other way.
    #[inline]
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Direction::MinusPhi => Direction::PlusPhi,
            Direction::PlusPhi => Direction::MinusPhi,
            Direction::MinusTheta => Direction::PlusTheta,
            Direction::PlusTheta => Direction::MinusTheta,
        }
    }
}

/// Per-event flags of a crystal.
///
/// Bits 0-1 hold the hit flags, bits 4-7 one "checked" bit per neighbor slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrystalState(u8);

impl CrystalState {
    /// Crystal has a hit above threshold in the current event.
    pub const HIT: u8 = 1 << 0;
    /// Crystal already belongs to a cluster.
    pub const CLUSTERED: u8 = 1 << 1;

    const CHECKED_SHIFT: u8 = 4;
    const CHECKED_MASK: u8 = 0x0F << Self::CHECKED_SHIFT;

    /// Raw flag bits.
    #[inline]
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Sets `flags`.
    #[inline]
    pub fn insert(&mut self, flags: u8) {
        self.0 |= flags;
    }

    /// Clears `flags`.
    #[inline]
    pub fn remove(&mut self, flags: u8) {
        self.0 &= !flags;
    }

    #[inline]
    #[must_use]
    pub fn is_hit(self) -> bool {
        self.0 & Self::HIT != 0
    }

    #[inline]
    #[must_use]
    pub fn is_clustered(self) -> bool {
        self.0 & Self::CLUSTERED != 0
    }

    /// Hit and not yet part of a cluster.
    #[inline]
    #[must_use]
    pub fn is_free(self) -> bool {
        self.0 & (Self::HIT | Self::CLUSTERED) == Self::HIT
    }

    #[inline]
    #[must_use]
    pub fn is_checked(self, slot: usize) -> bool {
        self.0 & (1 << (Self::CHECKED_SHIFT + slot as u8)) != 0
    }

    #[inline]
    pub fn set_checked(&mut self, slot: usize) {
        self.0 |= 1 << (Self::CHECKED_SHIFT + slot as u8);
    }

    /// Any neighbor relation examined this pass.
    #[inline]
    #[must_use]
    pub fn any_checked(self) -> bool {
        self.0 & Self::CHECKED_MASK != 0
    }

    /// Clears the clustering bits, keeping the hit.
    #[inline]
    pub fn clear_visit(&mut self) {
        self.0 &= Self::HIT;
    }

    #[inline]
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

/// One crystal.
#[derive(Debug, Clone)]
pub struct Crystal {
    pub(crate) id: CrystalId,
    pub(crate) ring: u16,
    pub(crate) local: u16,
    pub(crate) position: [f64; 3],
    pub(crate) neighbors: [CrystalId; 4],
    pub(crate) state: CrystalState,
    pub(crate) energy: f64,
}

impl Crystal {
    /// Handle of this crystal.
    #[must_use]
    pub fn id(&self) -> CrystalId {
        self.id
    }

    /// Ring index, increasing with polar angle.
    #[must_use]
    pub fn ring(&self) -> u16 {
        self.ring
    }

    /// Index within the ring.
    #[must_use]
    pub fn local(&self) -> u16 {
        self.local
    }

    /// Centre of the front face (cm).
    #[must_use]
    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    #[must_use]
    pub fn neighbor(&self, direction: Direction) -> CrystalId {
        self.neighbors[direction.slot()]
    }

    #[must_use]
    pub fn neighbors(&self) -> &[CrystalId; 4] {
        &self.neighbors
    }

    #[must_use]
    pub fn state(&self) -> CrystalState {
        self.state
    }

    /// Energy of the current hit (GeV).
    #[must_use]
    pub fn energy(&self) -> f64 {
        self.energy
    }
}

/// Crystals of one ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ring {
    pub(crate) theta: f64,
    pub(crate) radius: f64,
    pub(crate) first: u32,
    pub(crate) n_crystals: u16,
}

impl Ring {
    /// Polar angle of the ring centre (rad).
    #[must_use]
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Distance of the front faces from the origin (cm).
    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[must_use]
    pub fn n_crystals(&self) -> u16 {
        self.n_crystals
    }

    /// Handle of crystal `local`, taken modulo the ring size.
    #[must_use]
    pub fn crystal(&self, local: i64) -> CrystalId {
        let local = local.rem_euclid(i64::from(self.n_crystals));
        CrystalId(self.first + local as u32)
    }
}

/// Index in a ring of `n_to` crystals nearest in azimuth to crystal `local`
/// of a ring of `n_from` crystals.
fn remap(local: u16, n_from: u16, n_to: u16) -> i64 {
    let position = (f64::from(local) + 0.5) * f64::from(n_to) / f64::from(n_from) - 0.5;
    position.round() as i64
}

/// Calorimeter geometry plus per-crystal event state.
#[derive(Debug, Clone)]
pub struct CrystalLattice {
    crystals: Vec<Crystal>,
    rings: Vec<Ring>,
}

impl CrystalLattice {
    /// Builds the crystal table and the neighbor relations.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or holds more
    /// crystals than a [`CrystalId`] can address.
    pub fn new(config: &CalorimeterConfig) -> Result<Self> {
        config.validate()?;
        let total = u32::try_from(config.n_crystals())
            .ok()
            .filter(|&n| n < u32::MAX)
            .ok_or_else(|| Error::Geometry("too many crystals".into()))?;
        let n_rings = u16::try_from(config.rings.len())
            .map_err(|_| Error::Geometry("too many calorimeter rings".into()))?;
        let sentinel = CrystalId(total);

        let mut rings = Vec::with_capacity(config.rings.len());
        let mut crystals = Vec::with_capacity(total as usize + 1);
        let mut first = 0u32;
        for (ring, cfg) in (0..n_rings).zip(&config.rings) {
            rings.push(Ring {
                theta: cfg.theta,
                radius: cfg.radius,
                first,
                n_crystals: cfg.n_crystals,
            });
            let (sin_theta, cos_theta) = cfg.theta.sin_cos();
            for local in 0..cfg.n_crystals {
                let phi = TAU * (f64::from(local) + 0.5) / f64::from(cfg.n_crystals);
                let (sin_phi, cos_phi) = phi.sin_cos();
                crystals.push(Crystal {
                    id: CrystalId(first + u32::from(local)),
                    ring,
                    local,
                    position: [
                        cfg.radius * sin_theta * cos_phi,
                        cfg.radius * sin_theta * sin_phi,
                        cfg.radius * cos_theta,
                    ],
                    neighbors: [sentinel; 4],
                    state: CrystalState::default(),
                    energy: 0.0,
                });
            }
            first += u32::from(cfg.n_crystals);
        }
        crystals.push(Crystal {
            id: sentinel,
            ring: u16::MAX,
            local: u16::MAX,
            position: [0.0; 3],
            neighbors: [sentinel; 4],
            state: CrystalState::default(),
            energy: 0.0,
        });

        let mut lattice = Self { crystals, rings };
        lattice.link_neighbors();
        log::debug!(
            "crystal lattice: {} rings, {} crystals",
            lattice.rings.len(),
            lattice.n_crystals()
        );
        Ok(lattice)
    }

    fn link_neighbors(&mut self) {
        for (index, ring) in self.rings.iter().enumerate() {
            let lower = index.checked_sub(1).map(|i| self.rings[i]);
            let upper = self.rings.get(index + 1).copied();
            for local in 0..ring.n_crystals {
                let i = i64::from(local);
                let id = ring.crystal(i);
                let crystal = &mut self.crystals[id.index()];
                crystal.neighbors[Direction::MinusPhi.slot()] = ring.crystal(i - 1);
                crystal.neighbors[Direction::PlusPhi.slot()] = ring.crystal(i + 1);
                if let Some(lower) = lower {
                    crystal.neighbors[Direction::MinusTheta.slot()] =
                        lower.crystal(remap(local, ring.n_crystals, lower.n_crystals));
                }
                if let Some(upper) = upper {
                    crystal.neighbors[Direction::PlusTheta.slot()] =
                        upper.crystal(remap(local, ring.n_crystals, upper.n_crystals));
                }
            }
        }
    }

    /// Rings ordered by increasing polar angle.
    #[must_use]
    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    /// Number of real crystals (the sentinel excluded).
    #[must_use]
    pub fn n_crystals(&self) -> usize {
        self.crystals.len() - 1
    }

    /// Handle of the boundary sentinel.
    #[must_use]
    pub fn sentinel(&self) -> CrystalId {
        CrystalId((self.crystals.len() - 1) as u32)
    }

    /// Bounds-checked lookup of a global crystal id.
    ///
    /// # Errors
    /// Returns [`Error::CellOutOfRange`] if `cell` does not exist.
    pub fn crystal_id(&self, cell: u32) -> Result<CrystalId> {
        if (cell as usize) < self.n_crystals() {
            Ok(CrystalId(cell))
        } else {
            Err(Error::CellOutOfRange {
                kind: CellKind::Crystal,
                id: cell as usize,
                size: self.n_crystals(),
            })
        }
    }

    /// Bounds-checked lookup of `(ring, index within the ring)`.
    ///
    /// # Errors
    /// Returns [`Error::CellOutOfRange`] for an unknown ring or crystal.
    pub fn crystal_at(&self, ring: u16, local: u16) -> Result<CrystalId> {
        let Some(ring_info) = self.rings.get(usize::from(ring)) else {
            return Err(Error::CellOutOfRange {
                kind: CellKind::Crystal,
                id: usize::from(ring),
                size: self.rings.len(),
            });
        };
        if local >= ring_info.n_crystals {
            return Err(Error::CellOutOfRange {
                kind: CellKind::Crystal,
                id: usize::from(local),
                size: usize::from(ring_info.n_crystals),
            });
        }
        Ok(CrystalId(ring_info.first + u32::from(local)))
    }

    /// Crystal behind a handle obtained from this lattice.
    ///
    /// # Panics
    /// Panics if `id` was not produced by this lattice.
    #[inline]
    #[must_use]
    pub fn crystal(&self, id: CrystalId) -> &Crystal {
        &self.crystals[id.index()]
    }

    #[inline]
    pub(crate) fn crystal_mut(&mut self, id: CrystalId) -> &mut Crystal {
        &mut self.crystals[id.index()]
    }

    /// All crystals including the trailing sentinel.
    #[must_use]
    pub fn crystals(&self) -> &[Crystal] {
        &self.crystals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use l3trig_core::RingConfig;

    fn small_config() -> CalorimeterConfig {
        CalorimeterConfig {
            rings: vec![
                RingConfig {
                    theta: 0.5,
                    n_crystals: 4,
                    radius: 100.0,
                },
                RingConfig {
                    theta: 1.0,
                    n_crystals: 8,
                    radius: 100.0,
                },
                RingConfig {
                    theta: 1.5,
                    n_crystals: 8,
                    radius: 100.0,
                },
            ],
        }
    }

    #[test]
    fn test_standard_lattice_size() {
        let lattice = CrystalLattice::new(&CalorimeterConfig::standard()).unwrap();
        assert_eq!(lattice.rings().len(), 69);
        assert_eq!(lattice.n_crystals(), 8736);
        assert_eq!(lattice.sentinel(), CrystalId(8736));
    }

    #[test]
    fn test_azimuth_and_position() {
        let lattice = CrystalLattice::new(&small_config()).unwrap();
        let id = lattice.crystal_at(1, 0).unwrap();
        let [x, y, z] = lattice.crystal(id).position();
        assert_relative_eq!(y.atan2(x), TAU * 0.5 / 8.0, epsilon = 1e-12);
        assert_relative_eq!(x.hypot(y).hypot(z), 100.0, epsilon = 1e-9);
        assert_relative_eq!(z, 100.0 * 1.0_f64.cos(), epsilon = 1e-9);
    }

    #[test]
    fn test_phi_neighbors_wrap() {
        let lattice = CrystalLattice::new(&small_config()).unwrap();
        let first = lattice.crystal(lattice.crystal_at(1, 0).unwrap());
        assert_eq!(
            first.neighbor(Direction::MinusPhi),
            lattice.crystal_at(1, 7).unwrap()
        );
        assert_eq!(
            first.neighbor(Direction::PlusPhi),
            lattice.crystal_at(1, 1).unwrap()
        );
    }

    #[test]
    fn test_theta_neighbors_remap() {
        let lattice = CrystalLattice::new(&small_config()).unwrap();
        // Ring 0 with 4 crystals against ring 1 with 8: (1 + 0.5) * 2 - 0.5 = 2.5.
        let coarse = lattice.crystal(lattice.crystal_at(0, 1).unwrap());
        assert_eq!(
            coarse.neighbor(Direction::PlusTheta),
            lattice.crystal_at(1, 3).unwrap()
        );
        // (5 + 0.5) / 2 - 0.5 = 2.25.
        let fine = lattice.crystal(lattice.crystal_at(1, 5).unwrap());
        assert_eq!(
            fine.neighbor(Direction::MinusTheta),
            lattice.crystal_at(0, 2).unwrap()
        );
        // Equal ring sizes map straight across.
        assert_eq!(
            fine.neighbor(Direction::PlusTheta),
            lattice.crystal_at(2, 5).unwrap()
        );
    }

    #[test]
    fn test_edge_rings_link_to_sentinel() {
        let lattice = CrystalLattice::new(&small_config()).unwrap();
        let sentinel = lattice.sentinel();
        let front = lattice.crystal(lattice.crystal_at(0, 2).unwrap());
        let back = lattice.crystal(lattice.crystal_at(2, 2).unwrap());
        assert_eq!(front.neighbor(Direction::MinusTheta), sentinel);
        assert_eq!(back.neighbor(Direction::PlusTheta), sentinel);
        assert!(!lattice.crystal(sentinel).state().is_hit());
    }

    #[test]
    fn test_lookup_out_of_range() {
        let lattice = CrystalLattice::new(&small_config()).unwrap();
        assert!(lattice.crystal_id(19).is_ok());
        assert!(matches!(
            lattice.crystal_id(20),
            Err(Error::CellOutOfRange {
                kind: CellKind::Crystal,
                id: 20,
                size: 20
            })
        ));
        assert!(lattice.crystal_at(3, 0).is_err());
        assert!(lattice.crystal_at(0, 4).is_err());
    }

    #[test]
    fn test_state_flags() {
        let mut state = CrystalState::default();
        state.insert(CrystalState::HIT);
        assert!(state.is_free());
        state.insert(CrystalState::CLUSTERED);
        state.set_checked(3);
        assert!(!state.is_free());
        assert!(state.is_checked(3));
        assert!(state.any_checked());
        state.clear_visit();
        assert_eq!(state.bits(), CrystalState::HIT);
        state.reset();
        assert_eq!(state.bits(), 0);
    }
}
