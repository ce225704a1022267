//! Plain hit records handed over by the ingestion stage.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One drift-chamber hit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WireHit {
    /// Global layer id (0 = innermost).
    pub layer: u16,
    /// Wire id local to the layer.
    pub wire: u16,
    /// Drift time in nanoseconds, already corrected for the trigger T0.
    pub drift_time: f64,
}

impl WireHit {
    /// Creates a new wire hit.
    #[inline]
    #[must_use]
    pub fn new(layer: u16, wire: u16, drift_time: f64) -> Self {
        Self {
            layer,
            wire,
            drift_time,
        }
    }
}

/// One calorimeter crystal hit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrystalHit {
    /// Global crystal id.
    pub cell: u32,
    /// Digitised amplitude; scaled by the configured gain into energy.
    pub amplitude: f64,
}

impl CrystalHit {
    /// Creates a new crystal hit.
    #[inline]
    #[must_use]
    pub fn new(cell: u32, amplitude: f64) -> Self {
        Self { cell, amplitude }
    }
}

/// All hits of one readout event.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EventHits {
    /// Event number assigned by the host pipeline.
    pub event: u64,
    /// Drift-chamber hits in readout order.
    pub wire_hits: Vec<WireHit>,
    /// Calorimeter hits in readout order.
    pub crystal_hits: Vec<CrystalHit>,
}

impl EventHits {
    /// Creates an empty event.
    #[must_use]
    pub fn new(event: u64) -> Self {
        Self {
            event,
            ..Self::default()
        }
    }

    /// Total number of hit records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.wire_hits.len() + self.crystal_hits.len()
    }

    /// Returns true if the event has no hits at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wire_hits.is_empty() && self.crystal_hits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_hits_len() {
        let mut event = EventHits::new(7);
        assert!(event.is_empty());

        event.wire_hits.push(WireHit::new(3, 12, 120.0));
        event.crystal_hits.push(CrystalHit::new(100, 0.4));
        event.crystal_hits.push(CrystalHit::new(101, 0.1));

        assert_eq!(event.event, 7);
        assert_eq!(event.len(), 3);
        assert!(!event.is_empty());
    }
}
