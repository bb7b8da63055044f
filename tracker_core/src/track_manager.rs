//! Track lifecycle management: birth, confirmation, loss, termination.
//!
//! # Track Management Policy
//! - **Birth**: each unmatched valid detection spawns a tentative track with a
//!   freshly minted identity. Identities are never reused.
//! - **Confirmation**: a tentative track is confirmed once it has been matched
//!   in `confirm_hits` consecutive frames (birth counts as the first).
//! - **Loss**: any miss moves a tentative or confirmed track to `Lost`.
//!   A lost track that is matched again returns to `Confirmed` if it was ever
//!   confirmed, otherwise to `Tentative`.
//! - **Termination**: once `misses > max_misses`.

use crate::{
    error::{Result, TrackerError},
    kf::CvKalmanFilter,
    kf::CvKfConfig,
    track::{Track, TrackStatus},
    types::{FrameIndex, ObsVec, TrackId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for track management policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackManagerConfig {
    /// Consecutive matched frames required for confirmation
    pub confirm_hits: u32,
    /// Consecutive misses tolerated before termination
    pub max_misses: u32,
}

impl Default for TrackManagerConfig {
    fn default() -> Self {
        Self {
            confirm_hits: 3,
            max_misses: 20,
        }
    }
}

impl TrackManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.confirm_hits == 0 {
            return Err(TrackerError::Configuration(
                "confirm_hits must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Mints identities and applies the lifecycle rules to individual tracks.
#[derive(Clone, Debug)]
pub struct TrackManager {
    pub config: TrackManagerConfig,
    filter_config: CvKfConfig,
    next_id: u64,
}

impl TrackManager {
    pub fn new(config: TrackManagerConfig, filter_config: CvKfConfig) -> Self {
        Self {
            config,
            filter_config,
            next_id: 0,
        }
    }

    fn next_track_id(&mut self) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Number of identities handed out so far.
    pub fn minted(&self) -> u64 {
        self.next_id
    }

    /// Create a new track from an unmatched detection: position = detection,
    /// velocity = 0, wide initial covariance.
    pub fn birth_track(&mut self, z: &ObsVec, frame: FrameIndex) -> Track {
        let id = self.next_track_id();
        let filter = CvKalmanFilter::new(self.filter_config.clone(), z);
        let mut track = Track::new(id, filter, frame, *z);
        if track.hits >= self.config.confirm_hits {
            track.status = TrackStatus::Confirmed;
            track.ever_confirmed = true;
        }
        track
    }

    /// Call after a track received an update (hit).
    /// Returns true if this hit confirmed the track for the first time.
    pub fn register_hit(
        &self,
        track: &mut Track,
        frame: FrameIndex,
        z: ObsVec,
        cost: f64,
    ) -> bool {
        track.misses = 0;
        track.hits = track.hits.saturating_add(1);
        track.last_matched_frame = frame;
        track.observations.push((frame, z));
        track.distance += cost;

        let newly_confirmed = !track.ever_confirmed && track.hits >= self.config.confirm_hits;
        if newly_confirmed {
            track.ever_confirmed = true;
        }
        track.status = if track.ever_confirmed {
            TrackStatus::Confirmed
        } else {
            TrackStatus::Tentative
        };
        newly_confirmed
    }

    /// Call after a track received no update (miss).
    /// Returns true if this miss terminated the track.
    pub fn register_miss(&self, track: &mut Track) -> bool {
        track.misses = track.misses.saturating_add(1);
        track.hits = 0;
        if track.misses > self.config.max_misses {
            track.status = TrackStatus::Terminated;
            return true;
        }
        track.status = TrackStatus::Lost;
        false
    }

    /// Remove all terminated tracks. Returns the removed tracks in identity order.
    pub fn prune_terminated(tracks: &mut BTreeMap<TrackId, Track>) -> Vec<Track> {
        let dead: Vec<TrackId> = tracks
            .values()
            .filter(|t| t.status == TrackStatus::Terminated)
            .map(|t| t.id)
            .collect();
        dead.iter().filter_map(|id| tracks.remove(id)).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
