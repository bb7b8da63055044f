//! Run diagnostics and identity metrics against ground truth.
//!
//! [`Diagnostics`] is the counter channel every dropped detection, rejected
//! update and terminated track is attributed to. [`IdentityMetrics`] scores a
//! run against labelled (synthetic) detections.

use crate::types::TrackId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Counters accumulated over one tracking run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Frames processed (including empty ones)
    pub frames: u64,
    /// Detections handed to the pipeline
    pub detections: u64,
    /// Detections rejected as invalid observations before association
    pub dropped_detections: u64,
    /// Matches whose filter update was rejected (track coasted instead)
    pub rejected_updates: u64,
    /// Successful (track, detection) matches
    pub matches: u64,
    pub births: u64,
    pub confirmations: u64,
    pub terminations: u64,
}

impl Diagnostics {
    /// Fraction of valid detections that continued an existing track.
    pub fn match_rate(&self) -> f64 {
        let valid = self.detections - self.dropped_detections;
        if valid == 0 {
            0.0
        } else {
            self.matches as f64 / valid as f64
        }
    }
}

/// Identity-consistency statistics against ground-truth labels.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentityMetrics {
    /// Labelled detections evaluated
    pub n_labelled: u64,
    /// Times a target's detection went to a different track than its previous one
    pub id_switches: u64,
    /// Per target: every track identity that claimed one of its detections
    #[serde(skip)]
    tracks_per_target: BTreeMap<u64, BTreeSet<TrackId>>,
    #[serde(skip)]
    last_track: BTreeMap<u64, TrackId>,
    /// Per track: every target it claimed a detection from
    #[serde(skip)]
    targets_per_track: BTreeMap<TrackId, BTreeSet<u64>>,
}

impl IdentityMetrics {
    /// Accumulate one frame of (ground-truth target, track that took the detection).
    pub fn accumulate(&mut self, labelled: &[(u64, TrackId)]) {
        for &(target, track) in labelled {
            self.n_labelled += 1;
            if let Some(prev) = self.last_track.insert(target, track) {
                if prev != track {
                    self.id_switches += 1;
                }
            }
            self.tracks_per_target.entry(target).or_default().insert(track);
            self.targets_per_track.entry(track).or_default().insert(target);
        }
    }

    /// Number of distinct ground-truth targets seen.
    pub fn targets(&self) -> usize {
        self.tracks_per_target.len()
    }

    /// Mean number of track identities per target (1.0 = no fragmentation).
    pub fn fragmentation(&self) -> f64 {
        if self.tracks_per_target.is_empty() {
            return 0.0;
        }
        let total: usize = self.tracks_per_target.values().map(|s| s.len()).sum();
        total as f64 / self.tracks_per_target.len() as f64
    }

    /// Tracks that claimed detections of more than one target.
    pub fn impure_tracks(&self) -> usize {
        self.targets_per_track.values().filter(|s| s.len() > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn counts_switches_and_fragmentation() {
        let mut m = IdentityMetrics::default();
        m.accumulate(&[(0, TrackId(0)), (1, TrackId(1))]);
        m.accumulate(&[(0, TrackId(0)), (1, TrackId(1))]);
        // Target 1 re-born as track 2, then target 0 hijacks track 2
        m.accumulate(&[(0, TrackId(0)), (1, TrackId(2))]);
        m.accumulate(&[(0, TrackId(2))]);

        assert_eq!(m.n_labelled, 7);
        assert_eq!(m.id_switches, 2);
        assert_eq!(m.targets(), 2);
        assert_abs_diff_eq!(m.fragmentation(), 2.0, epsilon = 1e-12);
        assert_eq!(m.impure_tracks(), 1);
    }

    #[test]
    fn match_rate_ignores_dropped() {
        let d = Diagnostics {
            detections: 10,
            dropped_detections: 2,
            matches: 6,
            ..Default::default()
        };
        assert_abs_diff_eq!(d.match_rate(), 0.75, epsilon = 1e-12);
        assert_eq!(Diagnostics::default().match_rate(), 0.0);
    }
}
