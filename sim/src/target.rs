//! Bee trajectory models and per-frame state propagation.
//!
//! Each bee has a true state [px, py, vx, vy] in image pixels (velocity in
//! px/frame) and a `MotionSpec` describing how it moves. The simulator steps
//! every bee forward by one video frame.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracker_core::FrameIndex;

/// Describes bee motion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Straight flight at constant velocity.
    ConstantVelocity,
    /// Circling at constant speed. `omega` = heading change (rad/frame).
    ConstantTurn { omega: f64 },
    /// Constant velocity plus a random velocity kick of up to `jitter`
    /// px/frame per axis every frame.
    Wander { jitter: f64 },
}

/// A simulated bee with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bee {
    /// Ground-truth identity (used for metrics)
    pub id: u64,
    /// True state [px, py, vx, vy]
    pub state: [f64; 4],
    pub motion: MotionSpec,
    /// Bee is not in the picture before this frame
    pub appear_at: Option<FrameIndex>,
    /// Bee has left the picture from this frame on
    pub disappear_at: Option<FrameIndex>,
    /// Half-open frame ranges during which the bee is occluded
    pub hidden: Vec<(FrameIndex, FrameIndex)>,
}

impl Bee {
    pub fn new(id: u64, pos: (f64, f64), vel: (f64, f64), motion: MotionSpec) -> Self {
        Self {
            id,
            state: [pos.0, pos.1, vel.0, vel.1],
            motion,
            appear_at: None,
            disappear_at: None,
            hidden: Vec::new(),
        }
    }

    pub fn hidden_during(mut self, from: FrameIndex, until: FrameIndex) -> Self {
        self.hidden.push((from, until));
        self
    }

    pub fn present_between(mut self, appear: Option<FrameIndex>, disappear: Option<FrameIndex>) -> Self {
        self.appear_at = appear;
        self.disappear_at = disappear;
        self
    }

    /// Propagate the true state by one frame.
    pub fn step<R: Rng>(&mut self, rng: &mut R) {
        let s = &mut self.state;
        match self.motion {
            MotionSpec::ConstantVelocity => {}
            MotionSpec::ConstantTurn { omega } => {
                let v = (s[2] * s[2] + s[3] * s[3]).sqrt();
                let heading = s[3].atan2(s[2]) + omega;
                s[2] = v * heading.cos();
                s[3] = v * heading.sin();
            }
            MotionSpec::Wander { jitter } => {
                if jitter > 0.0 {
                    s[2] += rng.gen_range(-jitter..=jitter);
                    s[3] += rng.gen_range(-jitter..=jitter);
                }
            }
        }
        s[0] += s[2];
        s[1] += s[3];
    }

    /// True if the bee is in the picture at `frame`.
    pub fn is_present(&self, frame: FrameIndex) -> bool {
        if self.appear_at.is_some_and(|a| frame < a) {
            return false;
        }
        if self.disappear_at.is_some_and(|d| frame >= d) {
            return false;
        }
        true
    }

    /// True if the detector can see the bee at `frame`.
    pub fn is_visible(&self, frame: FrameIndex) -> bool {
        self.is_present(frame) && !self.hidden.iter().any(|&(a, b)| (a..b).contains(&frame))
    }

    pub fn pos(&self) -> (f64, f64) {
        (self.state[0], self.state[1])
    }
}
