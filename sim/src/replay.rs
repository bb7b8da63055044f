//! Replay: serialize/deserialize simulated detection logs for offline runs.

use crate::detector::LabelledDetection;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracker_core::{
    metrics::{Diagnostics, IdentityMetrics},
    traffic::TrackSummary,
    Detection, FrameIndex, Pipeline, PipelineConfig, TrackHistory, TrackId,
};

/// A full recorded simulation log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    /// Number of simulated frames
    pub frames: u64,
    /// All detections in frame order, each with its ground-truth bee
    pub detections: Vec<LabelledDetection>,
    /// Ground-truth bee positions, one entry per frame
    pub ground_truth: Vec<GroundTruthFrame>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroundTruthFrame {
    pub frame: FrameIndex,
    pub bees: Vec<BeeState>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BeeState {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub visible: bool,
}

/// Tracker output for a replay, scored against its ground truth.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub history: TrackHistory,
    pub summaries: Vec<TrackSummary>,
    pub diagnostics: Diagnostics,
    pub identity: IdentityMetrics,
}

impl ReplayLog {
    /// Labelled detections of one frame. Relies on the log being in frame order.
    pub fn frame(&self, frame: FrameIndex) -> &[LabelledDetection] {
        let start = self.detections.partition_point(|d| d.detection.frame < frame);
        let end = self.detections.partition_point(|d| d.detection.frame <= frame);
        &self.detections[start..end]
    }

    /// Track every frame of the log and score identities against the labels.
    pub fn evaluate(&self, config: PipelineConfig) -> tracker_core::Result<Evaluation> {
        let mut pipeline = Pipeline::new(config)?;
        let mut history = TrackHistory::new();
        let mut identity = IdentityMetrics::default();

        for frame in 0..self.frames {
            let batch = self.frame(frame);
            let dets: Vec<Detection> = batch.iter().map(|d| d.detection).collect();
            let out = pipeline.process_frame(frame, &dets)?;
            let labelled: Vec<(u64, TrackId)> = out
                .assignments
                .iter()
                .filter_map(|&(di, id)| batch[di].label.map(|bee| (bee, id)))
                .collect();
            identity.accumulate(&labelled);
            history.extend_frame(&out.entries);
        }

        Ok(Evaluation {
            history,
            summaries: pipeline.summaries(),
            diagnostics: pipeline.diagnostics().clone(),
            identity,
        })
    }
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    Ok(log)
}
