//! End-to-end behaviour of the tracking engine on small hand-built and
//! seeded random detection streams.

use approx::assert_abs_diff_eq;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracker_core::{
    gating::DistanceMetric, run_sequence, track_detections, track_manager::TrackManagerConfig,
    Detection, FrameIndex, Pipeline, PipelineConfig, TrackHistory, TrackId, TrackStatus,
};

fn config(max_misses: u32) -> PipelineConfig {
    PipelineConfig {
        lifecycle: TrackManagerConfig {
            max_misses,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn stream(frames: &[(FrameIndex, &[(f64, f64)])]) -> Vec<Detection> {
    frames
        .iter()
        .flat_map(|&(f, pts)| pts.iter().map(move |&(x, y)| Detection::new(f, x, y)))
        .collect()
}

/// Random bees wandering in a 640×480 frame with dropouts and clutter.
fn random_stream(seed: u64, n_frames: u64) -> Vec<Detection> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut bees: Vec<(f64, f64, f64, f64)> = (0..6)
        .map(|_| {
            (
                rng.gen_range(0.0..640.0),
                rng.gen_range(0.0..480.0),
                rng.gen_range(-4.0..4.0),
                rng.gen_range(-4.0..4.0),
            )
        })
        .collect();
    let mut out = Vec::new();
    for f in 0..n_frames {
        for bee in &mut bees {
            bee.0 += bee.2 + rng.gen_range(-1.0..1.0);
            bee.1 += bee.3 + rng.gen_range(-1.0..1.0);
            if rng.gen_bool(0.85) {
                out.push(Detection::new(f, bee.0, bee.1));
            }
        }
        if rng.gen_bool(0.2) {
            out.push(Detection::new(
                f,
                rng.gen_range(0.0..640.0),
                rng.gen_range(0.0..480.0),
            ));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn single_bee_is_one_confirmed_track() {
    let cfg = config(2);
    let confirm_hits = cfg.lifecycle.confirm_hits as u64;
    let dets = stream(&[
        (0, &[(0.0, 0.0)]),
        (1, &[(1.0, 0.0)]),
        (2, &[(2.0, 0.0)]),
        (3, &[(3.0, 0.0)]),
    ]);
    let run = track_detections(cfg, dets).unwrap();

    let entries = run.history.entries();
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.track_id == TrackId(0)));
    let first_confirmed = entries
        .iter()
        .find(|e| e.status == TrackStatus::Confirmed)
        .map(|e| e.frame)
        .unwrap();
    assert!(first_confirmed <= confirm_hits);
    assert_eq!(entries[3].status, TrackStatus::Confirmed);
    assert_abs_diff_eq!(entries[3].x, 3.0, epsilon = 1e-2);
}

#[test]
fn occluded_bee_is_rematched_within_miss_budget() {
    let dets = stream(&[
        (0, &[(0.0, 0.0)]),
        (1, &[(1.0, 0.0)]),
        (2, &[(2.0, 0.0)]),
        (5, &[(5.0, 0.0)]),
    ]);
    let mut pipeline = Pipeline::new(config(2)).unwrap();
    let mut history = TrackHistory::new();
    run_sequence(&mut pipeline, dets, &mut history).unwrap();

    assert_eq!(history.track_ids(), BTreeSet::from([TrackId(0)]));
    let statuses: Vec<(FrameIndex, TrackStatus)> = history
        .for_track(TrackId(0))
        .map(|e| (e.frame, e.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (0, TrackStatus::Tentative),
            (1, TrackStatus::Tentative),
            (2, TrackStatus::Confirmed),
            (3, TrackStatus::Lost),
            (4, TrackStatus::Lost),
            (5, TrackStatus::Confirmed),
        ]
    );
    let track = pipeline.track(TrackId(0)).unwrap();
    assert_eq!(track.misses, 0);
    assert_eq!(pipeline.diagnostics().terminations, 0);
}

#[test]
fn bee_absent_too_long_is_terminated_and_not_reidentified() {
    let mut pipeline = Pipeline::new(config(2)).unwrap();
    for f in 0..3u64 {
        pipeline
            .process_frame(f, &[Detection::new(f, f as f64, 0.0)])
            .unwrap();
    }
    let out3 = pipeline.process_frame(3, &[]).unwrap();
    let out4 = pipeline.process_frame(4, &[]).unwrap();
    assert!(out3.terminations.is_empty() && out4.terminations.is_empty());
    assert_eq!(pipeline.track(TrackId(0)).unwrap().misses, 2);

    let out5 = pipeline.process_frame(5, &[]).unwrap();
    assert_eq!(out5.terminations, vec![TrackId(0)]);
    assert!(out5.entries.is_empty(), "terminated tracks leave the live table");
    assert!(pipeline.track(TrackId(0)).is_none());

    let out6 = pipeline
        .process_frame(6, &[Detection::new(6, 6.0, 0.0)])
        .unwrap();
    assert_eq!(out6.births, vec![TrackId(1)]);
    assert_eq!(out6.entries[0].status, TrackStatus::Tentative);
}

#[test]
fn crossing_bees_keep_their_identities() {
    // A flies (10t, 3t), B flies (10t, 13 − 3t); their vertical order swaps
    // between frames 2 and 3. Detections are listed top to bottom each frame.
    let mut dets = Vec::new();
    for t in 0..8u64 {
        let tf = t as f64;
        let mut frame = [(10.0 * tf, 3.0 * tf), (10.0 * tf, 13.0 - 3.0 * tf)];
        frame.sort_by(|a, b| a.1.total_cmp(&b.1));
        dets.extend(frame.iter().map(|&(x, y)| Detection::new(t, x, y)));
    }
    let run = track_detections(PipelineConfig::default(), dets).unwrap();

    assert_eq!(run.history.track_ids().len(), 2);
    for e in run.history.entries() {
        let t = e.frame as f64;
        let expected_y = match e.track_id {
            TrackId(0) => 3.0 * t,
            TrackId(1) => 13.0 - 3.0 * t,
            other => panic!("unexpected track {other}"),
        };
        assert_abs_diff_eq!(e.y, expected_y, epsilon = 0.5);
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn misses_reset_on_match_and_count_up_otherwise() {
    for seed in 0..5 {
        let dets = random_stream(seed, 60);
        let mut by_frame: BTreeMap<FrameIndex, Vec<Detection>> = BTreeMap::new();
        for d in dets {
            by_frame.entry(d.frame).or_default().push(d);
        }
        let mut pipeline = Pipeline::new(config(3)).unwrap();
        for f in 0..60u64 {
            let frame = by_frame.remove(&f).unwrap_or_default();
            let before: BTreeMap<TrackId, u32> =
                pipeline.tracks().map(|t| (t.id, t.misses)).collect();
            let out = pipeline.process_frame(f, &frame).unwrap();
            let matched: BTreeSet<TrackId> = out
                .assignments
                .iter()
                .map(|&(_, id)| id)
                .filter(|id| !out.births.contains(id))
                .collect();
            for track in pipeline.tracks() {
                let Some(&prev) = before.get(&track.id) else {
                    assert_eq!(track.misses, 0, "newborn track starts clean");
                    continue;
                };
                if matched.contains(&track.id) {
                    assert_eq!(track.misses, 0);
                } else {
                    assert_eq!(track.misses, prev + 1);
                }
            }
            for id in &out.terminations {
                assert_eq!(before[id], 3, "terminated exactly when exceeding max_misses");
            }
        }
    }
}

#[test]
fn identities_are_unique_and_never_reused() {
    for seed in 10..15 {
        let mut pipeline = Pipeline::new(config(2)).unwrap();
        let mut seen: BTreeSet<TrackId> = BTreeSet::new();
        let mut by_frame: BTreeMap<FrameIndex, Vec<Detection>> = BTreeMap::new();
        for d in random_stream(seed, 80) {
            by_frame.entry(d.frame).or_default().push(d);
        }
        for (f, frame) in by_frame {
            let out = pipeline.process_frame(f, &frame).unwrap();
            for id in &out.births {
                assert!(seen.insert(*id), "identity {id} minted twice");
            }
            let live: BTreeSet<TrackId> = out.entries.iter().map(|e| e.track_id).collect();
            assert_eq!(live.len(), out.entries.len(), "duplicate live identity");

            let dets_used: BTreeSet<usize> = out.assignments.iter().map(|&(d, _)| d).collect();
            let tracks_used: BTreeSet<TrackId> = out.assignments.iter().map(|&(_, t)| t).collect();
            assert_eq!(dets_used.len(), out.assignments.len());
            assert_eq!(tracks_used.len(), out.assignments.len());
        }
    }
}

#[test]
fn identical_runs_produce_identical_history() {
    let dets = random_stream(99, 120);
    let a = track_detections(PipelineConfig::default(), dets.clone()).unwrap();
    let b = track_detections(PipelineConfig::default(), dets).unwrap();
    assert_eq!(
        serde_json::to_string(&a.history).unwrap(),
        serde_json::to_string(&b.history).unwrap()
    );
    assert_eq!(a.diagnostics, b.diagnostics);
}

#[test]
fn far_detection_is_never_matched() {
    let cfg = PipelineConfig {
        max_match_distance: 20.0,
        ..Default::default()
    };
    let mut pipeline = Pipeline::new(cfg).unwrap();
    pipeline
        .process_frame(0, &[Detection::new(0, 100.0, 100.0), Detection::new(0, 300.0, 100.0)])
        .unwrap();
    // 20.5 px from the nearest prediction
    let out = pipeline
        .process_frame(1, &[Detection::new(1, 120.5, 100.0)])
        .unwrap();
    assert_eq!(out.births, vec![TrackId(2)]);
    let born = out.entries.iter().find(|e| e.track_id == TrackId(2)).unwrap();
    assert_eq!(born.status, TrackStatus::Tentative);
    assert_eq!(pipeline.track(TrackId(0)).unwrap().misses, 1);
    assert_eq!(pipeline.track(TrackId(1)).unwrap().misses, 1);
}

#[test]
fn mahalanobis_metric_tracks_a_steady_bee() {
    let cfg = PipelineConfig {
        metric: DistanceMetric::Mahalanobis,
        max_match_distance: 5.0,
        ..Default::default()
    };
    let dets: Vec<Detection> = (0..20u64)
        .map(|f| Detection::new(f, 3.0 * f as f64, 2.0 * f as f64))
        .collect();
    let run = track_detections(cfg, dets).unwrap();
    assert_eq!(run.history.track_ids().len(), 1);
    assert_eq!(run.summaries.len(), 1);
    assert_eq!(run.summaries[0].matched_positions, 20);
}

#[test]
fn sequence_error_surfaces_from_a_full_run() {
    let dets = stream(&[(0, &[(0.0, 0.0)]), (2, &[(2.0, 0.0)]), (1, &[(1.0, 0.0)])]);
    let err = track_detections(PipelineConfig::default(), dets).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn reading_estimates_does_not_change_state() {
    let mut pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    for f in 0..4u64 {
        pipeline
            .process_frame(f, &[Detection::new(f, 2.0 * f as f64, 5.0)])
            .unwrap();
    }
    let track = pipeline.track(TrackId(0)).unwrap();
    let state = *track.filter.state();
    let cov = *track.filter.covariance();
    let first = track.position_estimate();
    let second = track.position_estimate();
    assert_eq!(first, second);
    assert_eq!(*track.filter.state(), state);
    assert_eq!(*track.filter.covariance(), cov);
}
