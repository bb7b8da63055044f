//! Error taxonomy of the tracking engine.
//!
//! - [`TrackerError::InvalidObservation`] is per-detection and non-fatal: the
//!   pipeline absorbs it into its [`Diagnostics`](crate::metrics::Diagnostics).
//! - [`TrackerError::Sequence`] and [`TrackerError::Configuration`] abort a run.

use crate::types::FrameIndex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// `frame` is `None` when raised below the pipeline, where frames are unknown.
    #[error("invalid observation ({x}, {y}){}: {reason}", in_frame_suffix(.frame))]
    InvalidObservation {
        frame: Option<FrameIndex>,
        x: f64,
        y: f64,
        reason: &'static str,
    },

    #[error("frame {got} arrived after frame {previous}; frame indices must strictly increase")]
    Sequence {
        previous: FrameIndex,
        got: FrameIndex,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("innovation covariance is not invertible")]
    DegenerateCovariance,
}

impl TrackerError {
    /// Structural errors abort a run; everything else is absorbed per detection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Sequence { .. } | Self::Configuration(_))
    }

    /// Attach the frame an invalid observation belongs to.
    pub fn in_frame(self, at: FrameIndex) -> Self {
        match self {
            Self::InvalidObservation { x, y, reason, .. } => Self::InvalidObservation {
                frame: Some(at),
                x,
                y,
                reason,
            },
            other => other,
        }
    }
}

fn in_frame_suffix(frame: &Option<FrameIndex>) -> String {
    frame.map(|f| format!(" in frame {f}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_observation_names_its_frame() {
        let err = TrackerError::InvalidObservation {
            frame: None,
            x: 1.0,
            y: f64::NAN,
            reason: "non-finite observation",
        };
        assert_eq!(err.to_string(), "invalid observation (1, NaN): non-finite observation");
        let err = err.in_frame(7);
        assert!(matches!(err, TrackerError::InvalidObservation { frame: Some(7), .. }));
        assert_eq!(
            err.to_string(),
            "invalid observation (1, NaN) in frame 7: non-finite observation"
        );
        assert!(!err.is_fatal());
    }

    #[test]
    fn in_frame_leaves_other_errors_alone() {
        let err = TrackerError::Sequence { previous: 3, got: 2 };
        assert_eq!(err.clone().in_frame(9), err);
    }
}
