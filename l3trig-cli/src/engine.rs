//! Both finders behind one per-event call.

use l3trig_cdc::TrackFinder;
use l3trig_core::{EventHits, EventRecord, Result, TriggerConfig};
use l3trig_ecl::ClusterFinder;

/// Track and cluster finder for one worker thread.
#[derive(Debug, Clone)]
pub struct Trigger {
    tracks: TrackFinder,
    clusters: ClusterFinder,
}

impl Trigger {
    /// Builds both geometries from `config`.
    pub fn new(config: &TriggerConfig) -> Result<Self> {
        Ok(Self {
            tracks: TrackFinder::from_config(config)?,
            clusters: ClusterFinder::from_config(config)?,
        })
    }

    pub fn tracks(&self) -> &TrackFinder {
        &self.tracks
    }

    pub fn clusters(&self) -> &ClusterFinder {
        &self.clusters
    }

    /// Runs one event through both finders.
    pub fn process(&mut self, event: &EventHits) -> EventRecord {
        let found = self.tracks.process(&event.wire_hits);
        let clusters = self.clusters.process(&event.crystal_hits);
        log::debug!(
            "event {}: {} tracks, {} clusters, stopped at {}",
            event.event,
            found.tracks.len(),
            clusters.len(),
            found.stage
        );
        EventRecord {
            event: event.event,
            tracks: found.tracks,
            clusters,
            vertex: found.vertex,
            event_timing: found.event_timing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use l3trig_core::CrystalHit;

    #[test]
    fn test_calorimeter_only_event() {
        let mut trigger = Trigger::new(&TriggerConfig::default()).unwrap();
        let mut event = EventHits::new(42);
        event.crystal_hits.push(CrystalHit::new(3000, 0.9));

        let record = trigger.process(&event);
        assert_eq!(record.event, 42);
        assert!(record.tracks.is_empty());
        assert_eq!(record.clusters.len(), 1);
        assert_eq!(record.clusters[0].seed, 3000);
        assert!(record.vertex.is_none());
    }

    #[test]
    fn test_clones_are_independent() {
        let prototype = Trigger::new(&TriggerConfig::default()).unwrap();
        let mut first = prototype.clone();
        let mut second = prototype;

        let mut event = EventHits::new(1);
        event.crystal_hits.push(CrystalHit::new(10, 0.5));
        first.process(&event);
        second.process(&EventHits::new(2));

        assert_eq!(first.clusters().statistics().hits_accepted, 1);
        assert_eq!(second.clusters().statistics().hits_accepted, 0);
    }
}
