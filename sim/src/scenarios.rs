//! Scenario definitions.
//!
//! Each scenario is a named set of bees filmed by one simulated camera.
//! All scenarios are deterministic given the same seed.

use crate::{
    detector::{CameraParams, DetectorSimulator},
    replay::{BeeState, GroundTruthFrame, ReplayLog},
    target::{Bee, MotionSpec},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// One bee flying straight across the entrance, perfect detector
    SingleBee,
    /// Two bees; one briefly occluded, one gone long enough to lose its track
    Occlusion,
    /// Two bees whose paths cross at a shallow angle
    Crossing,
    /// 25 wandering bees coming and going, missed detections and clutter
    Swarm,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    /// Number of video frames to simulate
    pub frames: u64,
    pub bees: Vec<Bee>,
    pub camera: CameraParams,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::SingleBee => Self::single_bee(seed),
            ScenarioKind::Occlusion => Self::occlusion(seed),
            ScenarioKind::Crossing => Self::crossing(seed),
            ScenarioKind::Swarm => Self::swarm(seed),
        }
    }

    /// Film every frame and record detections plus ground truth.
    pub fn run(&self) -> ReplayLog {
        let mut bees = self.bees.clone();
        let mut detector = DetectorSimulator::new(self.camera.clone(), self.seed);
        let mut motion_rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(100));
        let mut detections = Vec::new();
        let mut ground_truth = Vec::with_capacity(self.frames as usize);

        for frame in 0..self.frames {
            ground_truth.push(GroundTruthFrame {
                frame,
                bees: bees
                    .iter()
                    .filter(|b| b.is_present(frame))
                    .map(|b| BeeState {
                        id: b.id,
                        x: b.state[0],
                        y: b.state[1],
                        visible: b.is_visible(frame),
                    })
                    .collect(),
            });
            detections.extend(detector.detect(&bees, frame));
            for bee in &mut bees {
                bee.step(&mut motion_rng);
            }
        }

        ReplayLog {
            scenario_name: self.name.clone(),
            seed: self.seed,
            frames: self.frames,
            detections,
            ground_truth,
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 1: Single bee
    // -----------------------------------------------------------------------
    fn single_bee(seed: u64) -> Self {
        Scenario {
            name: "single_bee".into(),
            seed,
            frames: 100,
            bees: vec![Bee::new(
                0,
                (100.0, 600.0),
                (9.0, -4.0),
                MotionSpec::ConstantVelocity,
            )],
            camera: CameraParams::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 2: Occlusion
    // -----------------------------------------------------------------------
    fn occlusion(seed: u64) -> Self {
        let bees = vec![
            // Behind a flower for 3 frames; the track should survive
            Bee::new(0, (50.0, 200.0), (8.0, 1.0), MotionSpec::ConstantVelocity).hidden_during(30, 33),
            // Walks into the hive and comes back out 30 frames later
            Bee::new(1, (1200.0, 500.0), (-6.0, 0.5), MotionSpec::ConstantVelocity).hidden_during(40, 70),
        ];
        Scenario {
            name: "occlusion".into(),
            seed,
            frames: 120,
            bees,
            camera: CameraParams {
                noise: 0.5,
                ..Default::default()
            },
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 3: Crossing
    // -----------------------------------------------------------------------
    fn crossing(seed: u64) -> Self {
        // Paths meet at frame 20.25, so no frame has the two bees on top of
        // each other.
        let bees = vec![
            Bee::new(0, (100.0, 200.0), (8.0, 4.0), MotionSpec::ConstantVelocity),
            Bee::new(1, (100.0, 362.0), (8.0, -4.0), MotionSpec::ConstantVelocity),
        ];
        Scenario {
            name: "crossing".into(),
            seed,
            frames: 60,
            bees,
            camera: CameraParams {
                noise: 0.25,
                ..Default::default()
            },
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 4: Swarm
    // -----------------------------------------------------------------------
    fn swarm(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(4));
        let frames = 300;
        let camera = CameraParams {
            p_detection: 0.9,
            lambda_clutter: 0.5,
            noise: 1.0,
            ..Default::default()
        };

        let bees = (0..25)
            .map(|i| {
                let px = rng.gen::<f64>() * camera.width;
                let py = rng.gen::<f64>() * camera.height;
                let speed = 2.0 + rng.gen::<f64>() * 8.0;
                let heading = rng.gen::<f64>() * std::f64::consts::TAU;
                let motion = if rng.gen::<f64>() < 0.3 {
                    MotionSpec::ConstantTurn {
                        omega: (rng.gen::<f64>() - 0.5) * 0.1,
                    }
                } else {
                    MotionSpec::Wander { jitter: 0.3 }
                };
                let appear = rng.gen_range(0..frames / 2);
                let stay = rng.gen_range(30..frames);
                Bee::new(i, (px, py), (speed * heading.cos(), speed * heading.sin()), motion)
                    .present_between(Some(appear), Some(appear + stay))
            })
            .collect();

        Scenario {
            name: "swarm".into(),
            seed,
            frames,
            bees,
            camera,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_core::PipelineConfig;

    #[test]
    fn same_seed_same_log() {
        for kind in [ScenarioKind::Swarm, ScenarioKind::Occlusion] {
            let a = Scenario::build(kind, 3).run();
            let b = Scenario::build(kind, 3).run();
            assert_eq!(
                serde_json::to_string(&a).unwrap(),
                serde_json::to_string(&b).unwrap()
            );
        }
    }

    #[test]
    fn single_bee_is_one_track() {
        let log = Scenario::build(ScenarioKind::SingleBee, 1).run();
        assert_eq!(log.ground_truth.len(), 100);
        assert_eq!(log.frame(10).len(), 1);
        let eval = log.evaluate(PipelineConfig::default()).unwrap();
        assert_eq!(eval.identity.id_switches, 0);
        assert_eq!(eval.identity.targets(), 1);
        assert_eq!(eval.summaries.len(), 1);
        assert_eq!(eval.summaries[0].matched_positions, 100);
    }

    #[test]
    fn crossing_bees_do_not_swap() {
        let log = Scenario::build(ScenarioKind::Crossing, 5).run();
        let eval = log.evaluate(PipelineConfig::default()).unwrap();
        assert_eq!(eval.identity.id_switches, 0);
        assert_eq!(eval.identity.impure_tracks(), 0);
        assert_eq!(eval.history.track_ids().len(), 2);
    }

    #[test]
    fn long_occlusion_fragments_only_the_hidden_bee() {
        let log = Scenario::build(ScenarioKind::Occlusion, 2).run();
        let eval = log.evaluate(PipelineConfig::default()).unwrap();
        // Bee 0 keeps its track through a short gap; bee 1 is re-born
        assert_eq!(eval.identity.id_switches, 1);
        assert_eq!(eval.identity.impure_tracks(), 0);
        assert_eq!(eval.diagnostics.terminations, 1);
    }

    #[test]
    fn swarm_runs_end_to_end() {
        let log = Scenario::build(ScenarioKind::Swarm, 11).run();
        let eval = log.evaluate(PipelineConfig::default()).unwrap();
        assert_eq!(eval.diagnostics.frames, 300);
        assert!(eval.identity.targets() > 0);
        assert!(eval.diagnostics.match_rate() > 0.5);
    }
}
