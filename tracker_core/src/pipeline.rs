//! Pipeline orchestrator: the full tracking cycle for one video frame.
//!
//! # Processing steps per frame
//! 1. Reject frames that do not come strictly after the previous one
//! 2. Drop invalid detections (non-finite centroid, bad box extent)
//! 3. Predict all live tracks to the frame (Δt = frames elapsed per track)
//! 4. For each track × detection: gate check (Euclidean or Mahalanobis)
//! 5. Build sparse bipartite graph from gate-passing pairs
//! 6. Partition into connected components and solve each with Hungarian
//! 7. Update matched tracks (KF update) and register hits
//! 8. Register misses for unmatched tracks (loss / termination)
//! 9. Birth tentative tracks for unmatched detections
//! 10. Prune terminated tracks
//! 11. Emit the frame's history entries

use crate::{
    association::{associate, BipartiteGraph},
    error::{Result, TrackerError},
    gating::{gate, DistanceMetric},
    history::HistoryEntry,
    kf::{CvKfConfig, MotionFilter},
    metrics::Diagnostics,
    track::{Track, TrackStatus},
    track_manager::{TrackManager, TrackManagerConfig},
    traffic::TrackSummary,
    types::{Detection, FrameIndex, TrackId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the tracking pipeline. Fixed for the life of a [`Pipeline`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gate: pairs costing more than this are never matched.
    pub max_match_distance: f64,
    /// Association cost metric
    pub metric: DistanceMetric,
    /// KF noise config
    pub filter: CvKfConfig,
    /// Track management config
    pub lifecycle: TrackManagerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_match_distance: 50.0,
            metric: DistanceMetric::Euclidean,
            filter: CvKfConfig::default(),
            lifecycle: TrackManagerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_match_distance.is_finite() && self.max_match_distance > 0.0) {
            return Err(TrackerError::Configuration(format!(
                "max_match_distance must be a positive finite number, got {}",
                self.max_match_distance
            )));
        }
        self.filter.validate()?;
        self.lifecycle.validate()
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Outputs of one pipeline step.
#[derive(Clone, Debug, Default)]
pub struct FrameOutput {
    pub frame: FrameIndex,
    /// Every live track after this frame, in identity order
    pub entries: Vec<HistoryEntry>,
    /// (detection index, track) for every detection that was matched or
    /// spawned a track, ascending by detection index
    pub assignments: Vec<(usize, TrackId)>,
    /// Tracks born this frame
    pub births: Vec<TrackId>,
    /// Tracks confirmed for the first time this frame
    pub confirmations: Vec<TrackId>,
    /// Tracks terminated this frame
    pub terminations: Vec<TrackId>,
    /// Detections dropped as invalid observations, in input order
    pub dropped: Vec<TrackerError>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// The tracking engine for one video. Owns every live track.
pub struct Pipeline {
    config: PipelineConfig,
    /// Live tracks keyed (and therefore iterated) by identity
    tracks: BTreeMap<TrackId, Track>,
    track_manager: TrackManager,
    last_frame: Option<FrameIndex>,
    diagnostics: Diagnostics,
    /// Summaries of terminated tracks
    retired: Vec<TrackSummary>,
}

impl Pipeline {
    /// Create a new pipeline, validating the configuration first.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let track_manager = TrackManager::new(config.lifecycle.clone(), config.filter.clone());
        Ok(Self {
            config,
            tracks: BTreeMap::new(),
            track_manager,
            last_frame: None,
            diagnostics: Diagnostics::default(),
            retired: Vec::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn last_frame(&self) -> Option<FrameIndex> {
        self.last_frame
    }

    /// Live tracks in identity order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.tracks.values()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Summaries of every track ever created (terminated and live), by identity.
    pub fn summaries(&self) -> Vec<TrackSummary> {
        let mut all = self.retired.clone();
        all.extend(self.tracks.values().map(TrackSummary::from_track));
        all.sort_by_key(|s| s.track_id);
        all
    }

    /// Process all detections of one frame. `Detection::frame` is not
    /// consulted; the caller decides which frame a detection belongs to.
    pub fn process_frame(
        &mut self,
        frame: FrameIndex,
        detections: &[Detection],
    ) -> Result<FrameOutput> {
        // ----------------------------------------------------------------
        // Step 1: Ordering
        // ----------------------------------------------------------------
        if let Some(previous) = self.last_frame {
            if frame <= previous {
                return Err(TrackerError::Sequence {
                    previous,
                    got: frame,
                });
            }
        }
        let mut out = FrameOutput {
            frame,
            ..Default::default()
        };

        // ----------------------------------------------------------------
        // Step 2: Validate detections
        // ----------------------------------------------------------------
        let mut valid: Vec<usize> = Vec::with_capacity(detections.len());
        for (di, det) in detections.iter().enumerate() {
            match det.defect() {
                None => valid.push(di),
                Some(reason) => {
                    let err = TrackerError::InvalidObservation {
                        frame: Some(frame),
                        x: det.x,
                        y: det.y,
                        reason,
                    };
                    warn!(frame, detection = di, "dropping detection: {err}");
                    out.dropped.push(err);
                }
            }
        }

        // ----------------------------------------------------------------
        // Step 3: Predict all tracks to this frame
        // ----------------------------------------------------------------
        for track in self.tracks.values_mut() {
            track.predict_to(frame);
        }

        // ----------------------------------------------------------------
        // Step 4-5: Gating + build bipartite graph
        // ----------------------------------------------------------------
        let rows: Vec<TrackId> = self.tracks.keys().copied().collect();
        let mut graph = BipartiteGraph::new(rows.len(), valid.len());
        for (ti, track) in self.tracks.values().enumerate() {
            for (vj, &di) in valid.iter().enumerate() {
                let res = gate(
                    self.config.metric,
                    &track.filter,
                    &detections[di].position(),
                    self.config.max_match_distance,
                );
                if res.passes {
                    graph.add_edge(ti, vj, res.cost);
                }
            }
        }

        // ----------------------------------------------------------------
        // Step 6: Partition + Hungarian per component
        // ----------------------------------------------------------------
        let association = associate(&graph);

        // ----------------------------------------------------------------
        // Step 7: KF update for matched pairs
        // ----------------------------------------------------------------
        let mut missed: Vec<usize> = association.unmatched_tracks.clone();
        let mut unclaimed: Vec<usize> = association.unmatched_detections.clone();
        for &(ti, vj) in &association.matches {
            let di = valid[vj];
            let z = detections[di].position();
            let Some(track) = self.tracks.get_mut(&rows[ti]) else {
                continue;
            };
            match track.filter.update(&z) {
                Ok(res) => {
                    let step = res.innovation.norm();
                    if self.track_manager.register_hit(track, frame, z, step) {
                        out.confirmations.push(track.id);
                    }
                    out.assignments.push((di, track.id));
                    self.diagnostics.matches += 1;
                }
                Err(err) => {
                    let err = err.in_frame(frame);
                    warn!(frame, track = %track.id, detection = di, "rejected update: {err}");
                    self.diagnostics.rejected_updates += 1;
                    missed.push(ti);
                    unclaimed.push(vj);
                }
            }
        }
        missed.sort_unstable();
        unclaimed.sort_unstable();

        // ----------------------------------------------------------------
        // Step 8: Register misses for unmatched tracks
        // ----------------------------------------------------------------
        for &ti in &missed {
            if let Some(track) = self.tracks.get_mut(&rows[ti]) {
                if self.track_manager.register_miss(track) {
                    out.terminations.push(track.id);
                }
            }
        }

        // ----------------------------------------------------------------
        // Step 9: Birth tentative tracks for unmatched detections
        // ----------------------------------------------------------------
        for &vj in &unclaimed {
            let di = valid[vj];
            let track = self
                .track_manager
                .birth_track(&detections[di].position(), frame);
            if track.status == TrackStatus::Confirmed {
                out.confirmations.push(track.id);
            }
            debug!(frame, track = %track.id, x = detections[di].x, y = detections[di].y, "track born");
            out.births.push(track.id);
            out.assignments.push((di, track.id));
            self.tracks.insert(track.id, track);
        }
        out.assignments.sort_unstable();

        // ----------------------------------------------------------------
        // Step 10: Prune terminated tracks
        // ----------------------------------------------------------------
        for track in TrackManager::prune_terminated(&mut self.tracks) {
            debug!(
                frame,
                track = %track.id,
                misses = track.misses,
                matched = track.observations.len(),
                last_matched = track.last_matched_frame,
                "track terminated"
            );
            self.retired.push(TrackSummary::from_track(&track));
        }

        // ----------------------------------------------------------------
        // Step 11: History entries
        // ----------------------------------------------------------------
        out.entries = self
            .tracks
            .values()
            .map(|t| {
                let est = t.filter.position_estimate();
                HistoryEntry {
                    frame,
                    track_id: t.id,
                    x: est.x,
                    y: est.y,
                    status: t.status,
                }
            })
            .collect();

        self.diagnostics.frames += 1;
        self.diagnostics.detections += detections.len() as u64;
        self.diagnostics.dropped_detections += out.dropped.len() as u64;
        self.diagnostics.births += out.births.len() as u64;
        self.diagnostics.confirmations += out.confirmations.len() as u64;
        self.diagnostics.terminations += out.terminations.len() as u64;
        self.last_frame = Some(frame);

        debug!(
            frame,
            detections = detections.len(),
            matched = association.matches.len(),
            births = out.births.len(),
            terminations = out.terminations.len(),
            live = self.tracks.len(),
            "frame processed"
        );

        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
