//! Fundamental types used across the entire workspace.

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalar type: use f64 throughout for numerical precision in Kalman filter.
// ---------------------------------------------------------------------------

/// 4-state vector: [px, py, vx, vy]
pub type StateVec = Vector4<f64>;

/// 4×4 state covariance matrix
pub type StateCov = Matrix4<f64>;

/// Observation vector [x, y]
pub type ObsVec = Vector2<f64>;

/// 2×2 observation-space covariance (R, S)
pub type ObsCov = Matrix2<f64>;

/// 2×4 observation matrix H
pub type ObsMat = Matrix2x4<f64>;

/// Video frame index as written by the detector.
pub type FrameIndex = u64;

// ---------------------------------------------------------------------------
// Identifier types: newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Bounding-box extent reported by the detector (pixels).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub width: f64,
    pub height: f64,
}

/// A single bee detection in one video frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Frame the detection belongs to
    pub frame: FrameIndex,
    /// Centroid x (pixels)
    pub x: f64,
    /// Centroid y (pixels)
    pub y: f64,
    /// Optional box extent; the tracker only uses the centroid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    pub fn new(frame: FrameIndex, x: f64, y: f64) -> Self {
        Self {
            frame,
            x,
            y,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, width: f64, height: f64) -> Self {
        self.bbox = Some(BoundingBox { width, height });
        self
    }

    /// Centroid as an observation vector.
    pub fn position(&self) -> ObsVec {
        ObsVec::new(self.x, self.y)
    }

    /// Reason this detection cannot be used as an observation, if any.
    pub fn defect(&self) -> Option<&'static str> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Some("non-finite centroid");
        }
        match self.bbox {
            Some(b) if !b.width.is_finite() || !b.height.is_finite() => {
                Some("non-finite bounding box")
            }
            Some(b) if b.width < 0.0 || b.height < 0.0 => Some("negative bounding box extent"),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Position estimate
// ---------------------------------------------------------------------------

/// Current position of a track and how uncertain it is.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub x: f64,
    pub y: f64,
    /// Trace of the position block of the covariance (px², summed over both axes)
    pub variance: f64,
}

impl PositionEstimate {
    pub fn as_vector(&self) -> ObsVec {
        ObsVec::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_defects() {
        assert_eq!(Detection::new(0, 1.0, 2.0).defect(), None);
        assert!(Detection::new(0, f64::NAN, 2.0).defect().is_some());
        assert!(Detection::new(0, 1.0, f64::INFINITY).defect().is_some());
        assert!(Detection::new(0, 1.0, 2.0)
            .with_bbox(-1.0, 4.0)
            .defect()
            .is_some());
        assert_eq!(
            Detection::new(0, 1.0, 2.0).with_bbox(3.0, 4.0).defect(),
            None
        );
    }

    #[test]
    fn track_id_display() {
        assert_eq!(TrackId(7).to_string(), "T7");
    }
}
