//! l3trig-core: Core types for the Level-3 trigger engine.
//!
//! This crate provides the pieces shared by the drift-chamber track finder
//! and the calorimeter cluster finder: the per-event arena container, the
//! plain hit and output records exchanged with the host pipeline, the
//! configuration tree, and the error and fit-status types.
//!

pub mod arena;
pub mod config;
pub mod error;
pub mod fit;
pub mod hit;
pub mod record;

pub use arena::Arena;
pub use config::{
    CalorimeterConfig, ChamberConfig, ClusterThresholds, DriftConfig, LayerConfig, RingConfig,
    TrackThresholds, TriggerConfig, ALPHA,
};
pub use error::{CellKind, Error, Result};
pub use fit::{FitFailure, Longitudinal};
pub use hit::{CrystalHit, EventHits, WireHit};
pub use record::{ClusterRecord, EventRecord, TrackRecord};
