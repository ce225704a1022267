//! Drift-chamber wire cells.
//!
//! A wire carries static geometry (position, stereo direction, six neighbor
//! handles fixed at construction) and a per-event [`WireState`] together with
//! the measured drift time and distance.

/// Handle of a wire inside a [`crate::DriftChamber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WireId(pub u32);

impl WireId {
    /// Position of the wire in the chamber's wire table.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Neighbor slots of a wire, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Neighbor {
    /// Lower-azimuth wire of the next inner row.
    InnerLeft = 0,
    /// Higher-azimuth wire of the next inner row.
    InnerRight = 1,
    /// Previous wire of the same row.
    Left = 2,
    /// Next wire of the same row.
    Right = 3,
    /// Lower-azimuth wire of the next outer row.
    OuterLeft = 4,
    /// Higher-azimuth wire of the next outer row.
    OuterRight = 5,
}

impl Neighbor {
    /// All slots in storage order.
    pub const ALL: [Neighbor; 6] = [
        Neighbor::InnerLeft,
        Neighbor::InnerRight,
        Neighbor::Left,
        Neighbor::Right,
        Neighbor::OuterLeft,
        Neighbor::OuterRight,
    ];

    /// Slot index.
    #[inline]
    #[must_use]
    pub fn slot(self) -> usize {
        self as usize
    }
}

/// Per-event flags of a wire.
///
/// The low byte holds the hit flags, the high byte one "checked" bit per
/// neighbor slot used by the flood fill. [`WireState::reset`] clears
/// everything except the static dead mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireState(u16);

impl WireState {
    /// Wire has a hit in the current event.
    pub const HIT: u16 = 1 << 0;
    /// Hit suppressed by the double-hit veto.
    pub const INVALID: u16 = 1 << 1;
    /// Hit already assigned to a cluster.
    pub const CLUSTERED: u16 = 1 << 2;
    /// Hit recovered from the salvage pool by a track.
    pub const SALVAGED: u16 = 1 << 3;
    /// Wire masked for the current event only.
    pub const MASKED: u16 = 1 << 4;
    /// Wire permanently dead; survives [`WireState::reset`].
    pub const DEAD: u16 = 1 << 7;

    const CHECKED_SHIFT: u16 = 8;
    const CHECKED_MASK: u16 = 0x3F << Self::CHECKED_SHIFT;

    /// State with the given raw flags.
    #[inline]
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw flag bits.
    #[inline]
    #[must_use]
    pub fn bits(self) -> u16 {
        self.0
    }

    /// Returns true if all bits of `flags` are set.
    #[inline]
    #[must_use]
    pub fn contains(self, flags: u16) -> bool {
        self.0 & flags == flags
    }

    /// Sets `flags`.
    #[inline]
    pub fn insert(&mut self, flags: u16) {
        self.0 |= flags;
    }

    /// Clears `flags`.
    #[inline]
    pub fn remove(&mut self, flags: u16) {
        self.0 &= !flags;
    }

    /// Returns to the start-of-event value.
    #[inline]
    pub fn reset(&mut self) {
        self.0 &= Self::DEAD;
    }

    /// Wire was hit this event.
    #[inline]
    #[must_use]
    pub fn is_hit(self) -> bool {
        self.contains(Self::HIT)
    }

    /// Hit is available for clustering: hit, not vetoed, not yet clustered.
    #[inline]
    #[must_use]
    pub fn is_free(self) -> bool {
        self.0 & (Self::HIT | Self::INVALID | Self::CLUSTERED) == Self::HIT
    }

    /// Wire cannot take a hit this event.
    #[inline]
    #[must_use]
    pub fn is_blocked(self) -> bool {
        self.0 & (Self::DEAD | Self::MASKED) != 0
    }

    /// Neighbor relation in `slot` has already been examined.
    #[inline]
    #[must_use]
    pub fn is_checked(self, slot: usize) -> bool {
        self.0 & (1 << (Self::CHECKED_SHIFT + slot as u16)) != 0
    }

    /// Marks the neighbor relation in `slot` as examined.
    #[inline]
    pub fn set_checked(&mut self, slot: usize) {
        self.0 |= 1 << (Self::CHECKED_SHIFT + slot as u16);
    }

    /// Clears every checked bit.
    #[inline]
    pub fn clear_checked(&mut self) {
        self.0 &= !Self::CHECKED_MASK;
    }
}

/// One sense wire.
#[derive(Debug, Clone)]
pub struct Wire {
    pub(crate) id: WireId,
    pub(crate) layer: u16,
    pub(crate) local: u16,
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) phi: f64,
    pub(crate) backward: [f64; 2],
    pub(crate) direction: [f64; 2],
    pub(crate) neighbors: [WireId; 6],
    pub(crate) state: WireState,
    pub(crate) distance: f64,
    pub(crate) time: f64,
}

impl Wire {
    pub(crate) fn new(
        id: WireId,
        layer: u16,
        local: u16,
        backward: [f64; 2],
        forward: [f64; 2],
        z_fraction: f64,
    ) -> Self {
        let direction = [forward[0] - backward[0], forward[1] - backward[1]];
        let x = backward[0] + z_fraction * direction[0];
        let y = backward[1] + z_fraction * direction[1];
        Self {
            id,
            layer,
            local,
            x,
            y,
            phi: wrap_phi(y.atan2(x)),
            backward,
            direction,
            neighbors: [id; 6],
            state: WireState::default(),
            distance: 0.0,
            time: 0.0,
        }
    }

    /// Boundary stand-in: never hit, its own neighbor in every slot.
    pub(crate) fn sentinel(id: WireId) -> Self {
        Self {
            id,
            layer: u16::MAX,
            local: u16::MAX,
            x: 0.0,
            y: 0.0,
            phi: 0.0,
            backward: [0.0; 2],
            direction: [0.0; 2],
            neighbors: [id; 6],
            state: WireState::from_bits(WireState::DEAD),
            distance: 0.0,
            time: 0.0,
        }
    }

    /// Handle of this wire.
    #[must_use]
    pub fn id(&self) -> WireId {
        self.id
    }

    /// Global layer id.
    #[must_use]
    pub fn layer(&self) -> u16 {
        self.layer
    }

    /// Wire id local to its layer.
    #[must_use]
    pub fn local(&self) -> u16 {
        self.local
    }

    /// Position at z = 0.
    #[must_use]
    pub fn position(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    /// Azimuth at z = 0, in [0, 2π).
    #[must_use]
    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Backward end point (x, y).
    #[must_use]
    pub fn backward(&self) -> [f64; 2] {
        self.backward
    }

    /// Forward minus backward end point (x, y); zero for axial wires.
    #[must_use]
    pub fn direction(&self) -> [f64; 2] {
        self.direction
    }

    /// Handle of the neighbor in `slot`.
    #[must_use]
    pub fn neighbor(&self, slot: Neighbor) -> WireId {
        self.neighbors[slot.slot()]
    }

    /// All six neighbor handles.
    #[must_use]
    pub fn neighbors(&self) -> &[WireId; 6] {
        &self.neighbors
    }

    /// Current per-event state.
    #[must_use]
    pub fn state(&self) -> WireState {
        self.state
    }

    /// Drift distance of the current hit (cm).
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Drift time of the current hit (ns).
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    pub(crate) fn reset(&mut self) {
        self.state.reset();
        self.distance = 0.0;
        self.time = 0.0;
    }
}

/// Wraps an azimuth into [0, 2π).
#[inline]
#[must_use]
pub fn wrap_phi(phi: f64) -> f64 {
    let wrapped = phi.rem_euclid(std::f64::consts::TAU);
    if wrapped >= std::f64::consts::TAU {
        0.0
    } else {
        wrapped
    }
}

/// Absolute azimuth difference folded into [0, π].
#[inline]
#[must_use]
pub fn delta_phi(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(std::f64::consts::TAU);
    d.min(std::f64::consts::TAU - d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_state_flags() {
        let mut state = WireState::default();
        assert!(!state.is_hit());
        assert!(!state.is_free());

        state.insert(WireState::HIT);
        assert!(state.is_free());

        state.insert(WireState::INVALID);
        assert!(state.is_hit());
        assert!(!state.is_free());

        state.remove(WireState::INVALID);
        state.insert(WireState::CLUSTERED);
        assert!(!state.is_free());
    }

    #[test]
    fn test_state_reset_keeps_dead() {
        let mut state = WireState::from_bits(WireState::DEAD);
        state.insert(WireState::HIT | WireState::MASKED);
        state.set_checked(4);
        state.reset();
        assert_eq!(state.bits(), WireState::DEAD);
        assert!(state.is_blocked());
    }

    #[test]
    fn test_checked_bits() {
        let mut state = WireState::default();
        for slot in 0..6 {
            assert!(!state.is_checked(slot));
        }
        state.set_checked(0);
        state.set_checked(5);
        assert!(state.is_checked(0));
        assert!(state.is_checked(5));
        assert!(!state.is_checked(3));
        state.clear_checked();
        assert_eq!(state.bits(), 0);
    }

    #[test]
    fn test_delta_phi_wraps() {
        assert!((delta_phi(0.1, 2.0 * PI - 0.1) - 0.2).abs() < 1e-12);
        assert!((delta_phi(PI, 0.0) - PI).abs() < 1e-12);
        assert!((wrap_phi(-0.5 * PI) - 1.5 * PI).abs() < 1e-12);
    }
}
