//! `sim`: Bee scenario simulator: trajectories, detector output, replay logs.

pub mod detector;
pub mod replay;
pub mod scenarios;
pub mod target;

pub use detector::{CameraParams, DetectorSimulator, LabelledDetection};
pub use replay::{load_replay, save_replay, ReplayLog};
pub use scenarios::{Scenario, ScenarioKind};
pub use target::{Bee, MotionSpec};
