//! Frame sequencer: turns an ordered detection stream into per-frame batches
//! and drives a [`Pipeline`] through them.
//!
//! Detections must arrive grouped by frame with frame indices never going
//! backwards. A frame index lower than the current group's (out-of-order
//! input, or a frame that reappears after a later one) is a fatal
//! [`TrackerError::Sequence`].
//!
//! Frame indices missing from the stream between the first and last frame
//! are emitted as empty frames, so that tracks accumulate one miss per video
//! frame in which their bee was not detected. [`run_sequence`] processes such
//! frames only while some track is live; once every track has terminated it
//! jumps straight to the next frame with detections.

use crate::{
    error::{Result, TrackerError},
    history::TrackHistory,
    metrics::Diagnostics,
    pipeline::{Pipeline, PipelineConfig},
    traffic::TrackSummary,
    types::{Detection, FrameIndex},
};
use std::iter::Peekable;

/// All detections of one video frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub index: FrameIndex,
    pub detections: Vec<Detection>,
}

/// Iterator adapter grouping detections into [`Frame`]s.
pub struct FrameSequencer<I: Iterator<Item = Detection>> {
    input: Peekable<I>,
    last: Option<FrameIndex>,
    fill_gaps: bool,
    failed: bool,
}

impl<I: Iterator<Item = Detection>> FrameSequencer<I> {
    pub fn new(detections: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            input: detections.into_iter().peekable(),
            last: None,
            fill_gaps: true,
            failed: false,
        }
    }

    /// Emit only frames that carry detections (no empty gap frames).
    pub fn without_gap_fill(mut self) -> Self {
        self.fill_gaps = false;
        self
    }
}

impl<I: Iterator<Item = Detection>> Iterator for FrameSequencer<I> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let head = self.input.peek()?.frame;

        if let Some(previous) = self.last {
            if head <= previous {
                self.failed = true;
                return Some(Err(TrackerError::Sequence {
                    previous,
                    got: head,
                }));
            }
            let expected = previous + 1;
            if self.fill_gaps && head > expected {
                self.last = Some(expected);
                return Some(Ok(Frame {
                    index: expected,
                    detections: Vec::new(),
                }));
            }
        }

        let mut detections = Vec::new();
        while let Some(det) = self.input.next_if(|d| d.frame == head) {
            detections.push(det);
        }
        self.last = Some(head);
        Some(Ok(Frame {
            index: head,
            detections,
        }))
    }
}

/// Feed every frame of `detections` through `pipeline`, appending to `history`.
///
/// On a sequence error the history keeps every frame processed before it.
/// Returns the number of frames processed, skipped trackless frames excluded.
pub fn run_sequence(
    pipeline: &mut Pipeline,
    detections: impl IntoIterator<Item = Detection>,
    history: &mut TrackHistory,
) -> Result<u64> {
    let mut frames = 0;
    for frame in FrameSequencer::new(detections).without_gap_fill() {
        let frame = frame?;
        if let Some(last) = pipeline.last_frame() {
            let mut empty = last + 1;
            while empty < frame.index && pipeline.tracks().next().is_some() {
                let out = pipeline.process_frame(empty, &[])?;
                history.extend_frame(&out.entries);
                frames += 1;
                empty += 1;
            }
        }
        let out = pipeline.process_frame(frame.index, &frame.detections)?;
        history.extend_frame(&out.entries);
        frames += 1;
    }
    Ok(frames)
}

/// Everything a complete tracking run produces.
#[derive(Clone, Debug, Default)]
pub struct TrackingRun {
    pub history: TrackHistory,
    pub summaries: Vec<TrackSummary>,
    pub diagnostics: Diagnostics,
}

/// Build a pipeline from `config` and track a whole detection stream.
pub fn track_detections(
    config: PipelineConfig,
    detections: impl IntoIterator<Item = Detection>,
) -> Result<TrackingRun> {
    let mut pipeline = Pipeline::new(config)?;
    let mut history = TrackHistory::new();
    run_sequence(&mut pipeline, detections, &mut history)?;
    Ok(TrackingRun {
        history,
        summaries: pipeline.summaries(),
        diagnostics: pipeline.diagnostics().clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(frame: FrameIndex) -> Detection {
        Detection::new(frame, frame as f64, 0.0)
    }

    #[test]
    fn groups_and_fills_gaps() {
        let frames: Vec<Frame> = FrameSequencer::new(vec![det(2), det(2), det(3), det(6)])
            .collect::<Result<_>>()
            .unwrap();
        let shape: Vec<(FrameIndex, usize)> =
            frames.iter().map(|f| (f.index, f.detections.len())).collect();
        assert_eq!(shape, vec![(2, 2), (3, 1), (4, 0), (5, 0), (6, 1)]);
    }

    #[test]
    fn without_gap_fill_skips_empty_frames() {
        let indices: Vec<FrameIndex> = FrameSequencer::new(vec![det(0), det(4)])
            .without_gap_fill()
            .map(|f| f.unwrap().index)
            .collect();
        assert_eq!(indices, vec![0, 4]);
    }

    #[test]
    fn decreasing_frame_is_fatal() {
        let mut seq = FrameSequencer::new(vec![det(1), det(3), det(2), det(4)]);
        assert_eq!(seq.next().unwrap().unwrap().index, 1);
        assert_eq!(seq.next().unwrap().unwrap().index, 2); // gap fill
        assert_eq!(seq.next().unwrap().unwrap().index, 3);
        assert_eq!(
            seq.next().unwrap(),
            Err(TrackerError::Sequence {
                previous: 3,
                got: 2
            })
        );
        assert!(seq.next().is_none(), "sequencer stops after a sequence error");
    }

    #[test]
    fn repeated_frame_after_later_one_is_fatal() {
        let err = FrameSequencer::new(vec![det(1), det(2), det(1)])
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert_eq!(err, TrackerError::Sequence { previous: 2, got: 1 });
    }

    #[test]
    fn empty_stream_yields_nothing() {
        assert!(FrameSequencer::new(Vec::<Detection>::new()).next().is_none());
    }

    #[test]
    fn run_fills_gaps_only_while_tracks_are_live() {
        let mut config = PipelineConfig::default();
        config.lifecycle.max_misses = 2;
        let mut pipeline = Pipeline::new(config).unwrap();
        let mut history = TrackHistory::new();
        let frames = run_sequence(
            &mut pipeline,
            vec![det(0), det(5_000_000)],
            &mut history,
        )
        .unwrap();

        // Birth, two misses, the terminating miss, then the far detection
        assert_eq!(frames, 5);
        let seen: Vec<FrameIndex> = history.entries().iter().map(|e| e.frame).collect();
        assert_eq!(seen, vec![0, 1, 2, 5_000_000]);
        assert_eq!(pipeline.diagnostics().terminations, 1);
        assert_eq!(pipeline.diagnostics().births, 2);
        assert_eq!(pipeline.last_frame(), Some(5_000_000));
    }

    #[test]
    fn run_keeps_history_of_frames_before_error() {
        let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let mut history = TrackHistory::new();
        let err = run_sequence(
            &mut pipeline,
            vec![det(0), det(1), det(0)],
            &mut history,
        )
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(history.len(), 2);
        assert_eq!(history.last_frame(), Some(1));
    }
}
