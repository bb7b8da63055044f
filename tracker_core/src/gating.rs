//! Gating: determines whether a detection is "close enough" to a predicted
//! track to be considered as a potential association.
//!
//! # Gating criterion
//! cost(z, track) ≤ max_match_distance, where cost is either
//! - Euclidean: ‖z − H·x̂_pred‖ (pixels), or
//! - Mahalanobis: √(νᵀ S⁻¹ ν) with S = H·P_pred·Hᵀ + R (standard deviations).
//!
//! Pairs that fail the gate never enter the assignment problem.

use crate::{kf::CvKalmanFilter, types::ObsVec};
use serde::{Deserialize, Serialize};

/// Cost metric between a predicted track position and a detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Mahalanobis,
}

impl DistanceMetric {
    /// Cost of associating `z` with the filter's current prediction.
    /// A degenerate innovation covariance yields an infinite (always gated) cost.
    pub fn cost(&self, filter: &CvKalmanFilter, z: &ObsVec) -> f64 {
        match self {
            Self::Euclidean => {
                let (nu, _) = filter.innovation(z);
                nu.norm()
            }
            Self::Mahalanobis => filter.mahalanobis(z).unwrap_or(f64::INFINITY),
        }
    }
}

/// Result of a gate check for one (track, detection) pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateResult {
    pub cost: f64,
    /// True if cost ≤ gate threshold
    pub passes: bool,
}

/// Check whether detection `z` passes the gate around `filter`'s prediction.
pub fn gate(
    metric: DistanceMetric,
    filter: &CvKalmanFilter,
    z: &ObsVec,
    max_match_distance: f64,
) -> GateResult {
    let cost = metric.cost(filter, z);
    GateResult {
        cost,
        passes: cost.is_finite() && cost <= max_match_distance,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
