//! Bee detector simulator.
//!
//! Generates per-frame centroid detections with:
//! - uniform position noise of ±`noise` px per axis
//! - miss probability (1 - P_D)
//! - Poisson clutter (false detections) uniformly over the image

use crate::target::Bee;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracker_core::{Detection, FrameIndex};

/// Camera and detector characteristics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// Image width (px)
    pub width: f64,
    /// Image height (px)
    pub height: f64,
    /// Probability a visible bee is detected
    pub p_detection: f64,
    /// Mean number of false detections per frame
    pub lambda_clutter: f64,
    /// Half-width of the uniform centroid noise (px)
    pub noise: f64,
    /// Reported bounding-box side (px)
    pub bee_size: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
            p_detection: 1.0,
            lambda_clutter: 0.0,
            noise: 0.5,
            bee_size: 24.0,
        }
    }
}

/// One simulated detection and the bee it came from (`None` for clutter).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelledDetection {
    pub detection: Detection,
    pub label: Option<u64>,
}

/// Generates detection frames from a set of bees.
pub struct DetectorSimulator {
    pub camera: CameraParams,
    rng: ChaCha8Rng,
}

impl DetectorSimulator {
    pub fn new(camera: CameraParams, seed: u64) -> Self {
        Self {
            camera,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// All detections of `frame`, sorted top to bottom like a blob detector
    /// scanning rows.
    pub fn detect(&mut self, bees: &[Bee], frame: FrameIndex) -> Vec<LabelledDetection> {
        let cam = &self.camera;
        let mut out = Vec::new();

        for bee in bees {
            if !bee.is_visible(frame) {
                continue;
            }
            let (x, y) = bee.pos();
            if !(0.0..cam.width).contains(&x) || !(0.0..cam.height).contains(&y) {
                continue;
            }
            if self.rng.gen::<f64>() > cam.p_detection {
                continue;
            }
            let nx = x + self.rng.gen::<f64>() * cam.noise * 2.0 - cam.noise;
            let ny = y + self.rng.gen::<f64>() * cam.noise * 2.0 - cam.noise;
            out.push(LabelledDetection {
                detection: Detection::new(frame, nx, ny).with_bbox(cam.bee_size, cam.bee_size),
                label: Some(bee.id),
            });
        }

        // Poisson sample by multiplying uniforms until below e^{-lambda}
        let n_clutter = if cam.lambda_clutter <= 0.0 {
            0usize
        } else {
            let threshold = (-cam.lambda_clutter).exp();
            let mut n = 0usize;
            let mut prod = self.rng.gen::<f64>();
            while prod > threshold && n < 50 {
                prod *= self.rng.gen::<f64>();
                n += 1;
            }
            n
        };
        for _ in 0..n_clutter {
            let x = self.rng.gen::<f64>() * cam.width;
            let y = self.rng.gen::<f64>() * cam.height;
            out.push(LabelledDetection {
                detection: Detection::new(frame, x, y).with_bbox(cam.bee_size, cam.bee_size),
                label: None,
            });
        }

        out.sort_by(|a, b| {
            a.detection
                .y
                .total_cmp(&b.detection.y)
                .then(a.detection.x.total_cmp(&b.detection.x))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MotionSpec;

    fn bees() -> Vec<Bee> {
        vec![
            Bee::new(0, (100.0, 300.0), (1.0, 0.0), MotionSpec::ConstantVelocity),
            Bee::new(1, (200.0, 100.0), (0.0, 1.0), MotionSpec::ConstantVelocity).hidden_during(1, 2),
            Bee::new(2, (-50.0, 100.0), (0.0, 0.0), MotionSpec::ConstantVelocity),
        ]
    }

    #[test]
    fn perfect_detector_sees_visible_bees_in_frame() {
        let mut sim = DetectorSimulator::new(CameraParams::default(), 1);
        let f0 = sim.detect(&bees(), 0);
        let labels: Vec<Option<u64>> = f0.iter().map(|d| d.label).collect();
        // Sorted by y; bee 2 is off-image
        assert_eq!(labels, vec![Some(1), Some(0)]);
        let d0 = f0[1].detection;
        assert!((d0.x - 100.0).abs() <= 0.5 && (d0.y - 300.0).abs() <= 0.5);

        let f1 = sim.detect(&bees(), 1);
        assert_eq!(f1.len(), 1, "occluded bee is not detected");
    }

    #[test]
    fn clutter_is_unlabelled_and_seeded() {
        let camera = CameraParams {
            lambda_clutter: 3.0,
            ..Default::default()
        };
        let mut a = DetectorSimulator::new(camera.clone(), 7);
        let mut b = DetectorSimulator::new(camera, 7);
        let mut clutter = 0;
        for f in 0..20 {
            let da = a.detect(&[], f);
            assert_eq!(da, b.detect(&[], f));
            assert!(da.iter().all(|d| d.label.is_none()));
            clutter += da.len();
        }
        assert!(clutter > 0);
    }
}
