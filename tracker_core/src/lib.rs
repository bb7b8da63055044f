//! `tracker_core`: Core bee tracking algorithms.
//!
//! # Module layout
//! - [`types`]       : Fundamental types (IDs, state vectors, detections)
//! - [`error`]       : Error taxonomy
//! - [`kf`]          : Constant-velocity Kalman filter (predict / update)
//! - [`gating`]      : Euclidean / Mahalanobis gating
//! - [`association`] : Bipartite graph, connected components, Hungarian solver
//! - [`track`]       : Track struct and status
//! - [`track_manager`]: Birth / confirmation / loss / termination logic
//! - [`pipeline`]    : Per-frame tracking cycle orchestrator
//! - [`sequencer`]   : Detection stream → frames → track history
//! - [`history`]     : Append-only output table
//! - [`metrics`]     : Run diagnostics, identity metrics
//! - [`traffic`]     : Track summaries and hive entrance counting

pub mod association;
pub mod error;
pub mod gating;
pub mod history;
pub mod kf;
pub mod metrics;
pub mod pipeline;
pub mod sequencer;
pub mod track;
pub mod track_manager;
pub mod traffic;
pub mod types;

pub use error::{Result, TrackerError};
pub use history::{HistoryEntry, TrackHistory};
pub use pipeline::{FrameOutput, Pipeline, PipelineConfig};
pub use sequencer::{run_sequence, track_detections, Frame, FrameSequencer, TrackingRun};
pub use track::{Track, TrackStatus};
pub use types::{BoundingBox, Detection, FrameIndex, PositionEstimate, StateCov, StateVec, TrackId};
