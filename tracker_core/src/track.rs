//! Track: owned motion filter, lifecycle status, hit/miss counters and the
//! matched observations needed for per-track summaries.

use crate::{
    kf::{CvKalmanFilter, MotionFilter},
    types::{FrameIndex, ObsVec, PositionEstimate, TrackId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackStatus {
    /// Not yet confirmed: may be a spurious detection
    Tentative,
    /// Matched in enough consecutive frames
    Confirmed,
    /// Missed at least the latest frame; coasting on prediction
    Lost,
    /// Missed too many frames; removed from the live set
    Terminated,
}

impl TrackStatus {
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Terminated)
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tentative => "TENTATIVE",
            Self::Confirmed => "CONFIRMED",
            Self::Lost => "LOST",
            Self::Terminated => "TERMINATED",
        };
        f.write_str(s)
    }
}

/// A single bee track.
#[derive(Clone, Debug)]
pub struct Track {
    /// Unique identifier
    pub id: TrackId,
    /// Motion filter, owned by this track for its whole life
    pub filter: CvKalmanFilter,
    /// Lifecycle status
    pub status: TrackStatus,
    /// Consecutive matched frames (birth counts as the first)
    pub hits: u32,
    /// Consecutive frames without a matched detection
    pub misses: u32,
    /// Whether the track has ever reached `Confirmed`
    pub ever_confirmed: bool,
    /// Frame the filter was last advanced to
    pub last_frame: FrameIndex,
    /// Frame of the last matched detection
    pub last_matched_frame: FrameIndex,
    /// Frame of birth
    pub born_frame: FrameIndex,
    /// Matched detection centroids, in frame order
    pub observations: Vec<(FrameIndex, ObsVec)>,
    /// Summed distance between prediction and matched detection
    pub distance: f64,
}

impl Track {
    /// Create a new tentative track from its first detection.
    pub fn new(id: TrackId, filter: CvKalmanFilter, frame: FrameIndex, first: ObsVec) -> Self {
        Self {
            id,
            filter,
            status: TrackStatus::Tentative,
            hits: 1,
            misses: 0,
            ever_confirmed: false,
            last_frame: frame,
            last_matched_frame: frame,
            born_frame: frame,
            observations: vec![(frame, first)],
            distance: 0.0,
        }
    }

    /// Advance the filter to `frame`; Δt is the number of frames elapsed.
    pub fn predict_to(&mut self, frame: FrameIndex) {
        if frame > self.last_frame {
            self.filter.predict((frame - self.last_frame) as f64);
            self.last_frame = frame;
        }
    }

    pub fn position_estimate(&self) -> PositionEstimate {
        self.filter.position_estimate()
    }

    /// Frames the track has existed for, including the current one.
    pub fn age(&self) -> u64 {
        self.last_frame - self.born_frame + 1
    }
}
