//! l3trig-cdc: Drift-chamber track finder for the Level-3 trigger.
//!
//! The chamber geometry is built once from a [`ChamberConfig`] and owns every
//! wire together with its per-event state. Each event then runs through the
//! stages of [`TrackFinder`]:
//!
//! - **Segments**: hits of each superlayer are vetoed, flood-filled over the
//!   six-neighbor relation and classified into segments
//! - **Axial chaining**: segments are linked inward by a curvature chi-square
//!   and committed against earlier chains
//! - **Fits**: a circle per track, a vertex and event-timing estimate, then a
//!   drift-corrected refit
//! - **Stereo**: stereo segments are attached to the circles and a line fit
//!   of z against arclength completes the helix
//!
//! [`ChamberConfig`]: l3trig_core::ChamberConfig

pub mod circle;
pub mod finder;
pub mod geometry;
pub mod layer;
pub mod line;
pub mod linker;
pub mod segment;
pub mod stereo;
pub mod superlayer;
pub mod timing;
pub mod track;
pub mod vertex;
pub mod wire;

pub use circle::{Circle, CircleFit};
pub use finder::{FinderOutput, FinderStatistics, Stage, TrackFinder};
pub use geometry::DriftChamber;
pub use layer::{Layer, SuperLayer};
pub use line::{fit_with_rejection, Line, LineFit, SzPoint};
pub use linker::{commit, link_axial, prefer_candidate, Chain, Commit, MIN_CHAIN};
pub use segment::{Segment, SegmentKind, SegmentRef};
pub use stereo::{link_stereo, StereoCounts};
pub use superlayer::{find_segments, SegmentCounts, SuperLayerHits};
pub use track::{StereoLink, Track};
pub use vertex::{vertex_2d, vertex_3d};
pub use wire::{Neighbor, Wire, WireId, WireState};
