//! Kalman filter: predict and update steps.
//!
//! # Design choices
//! - A **linear KF** with a constant-velocity (CV) motion model in the image plane.
//! - All math is done in `f64` via fixed-size `nalgebra` matrices.
//! - Each track owns one filter instance; the [`MotionFilter`] trait is the
//!   seam for alternative motion models.
//!
//! ## State vector
//! x = [px, py, vx, vy]ᵀ  (4-dimensional, pixels and pixels/frame)
//!
//! ## CV Transition model
//! F = I₄ + dt * [[0₂ I₂]; [0₂ 0₂]]
//! i.e. px += vx*dt, py += vy*dt
//!
//! ## Process noise
//! Q = q * dt * I₄  (at dt = 1 this is the fixed per-frame Q = q·I)
//!
//! ## Measurement model
//! H = [I₂ 0₂],  R = r * I₂

use crate::{
    error::{Result, TrackerError},
    types::{ObsCov, ObsMat, ObsVec, PositionEstimate, StateCov, StateVec},
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A recursive estimator of one track's kinematic state.
pub trait MotionFilter {
    /// Advance state and covariance by `dt` frames without an observation.
    fn predict(&mut self, dt: f64);

    /// Blend the predicted state toward observation `z`.
    /// On error the filter is left in its predicted state.
    fn update(&mut self, z: &ObsVec) -> Result<KfUpdateResult>;

    /// Current position and its uncertainty. Pure.
    fn position_estimate(&self) -> PositionEstimate;
}

/// Result of a KF update step.
#[derive(Clone, Debug)]
pub struct KfUpdateResult {
    /// Innovation ν = z − H·x
    pub innovation: ObsVec,
    /// Innovation covariance S = H·P·Hᵀ + R
    pub innovation_cov: ObsCov,
    /// Kalman gain K
    pub kalman_gain: nalgebra::Matrix4x2<f64>,
}

// ---------------------------------------------------------------------------
// Constant Velocity model
// ---------------------------------------------------------------------------

/// Noise parameters of the CV Kalman filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvKfConfig {
    /// Process noise variance added per frame to every state component.
    /// Higher = bees allowed to change velocity more abruptly.
    pub process_noise: f64,
    /// Measurement noise variance of a detection centroid (px²).
    pub measurement_noise: f64,
    /// Diagonal of the covariance a newborn track starts with.
    pub initial_variance: f64,
}

impl Default for CvKfConfig {
    fn default() -> Self {
        Self {
            process_noise: 1e-4,
            measurement_noise: 0.1,
            initial_variance: 1000.0,
        }
    }
}

impl CvKfConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("process_noise", self.process_noise),
            ("measurement_noise", self.measurement_noise),
            ("initial_variance", self.initial_variance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrackerError::Configuration(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Constant-Velocity Kalman filter (4-state, linear), owning its estimate.
#[derive(Clone, Debug)]
pub struct CvKalmanFilter {
    config: CvKfConfig,
    state: StateVec,
    cov: StateCov,
}

impl CvKalmanFilter {
    /// Start a filter at `position` with zero velocity and wide covariance.
    pub fn new(config: CvKfConfig, position: &ObsVec) -> Self {
        let cov = StateCov::identity() * config.initial_variance;
        Self {
            state: StateVec::new(position[0], position[1], 0.0, 0.0),
            cov,
            config,
        }
    }

    /// Build a filter from an explicit state and covariance.
    pub fn from_parts(config: CvKfConfig, state: StateVec, cov: StateCov) -> Self {
        Self { config, state, cov }
    }

    pub fn state(&self) -> &StateVec {
        &self.state
    }

    pub fn covariance(&self) -> &StateCov {
        &self.cov
    }

    /// Estimated velocity [vx, vy] in pixels per frame.
    pub fn velocity(&self) -> ObsVec {
        ObsVec::new(self.state[2], self.state[3])
    }

    /// Build state transition matrix F for timestep dt.
    pub fn transition_matrix(dt: f64) -> StateCov {
        let mut f = StateCov::identity();
        // position += velocity * dt
        f[(0, 2)] = dt;
        f[(1, 3)] = dt;
        f
    }

    /// Observation matrix H: picks the position out of the state.
    pub fn observation_matrix() -> ObsMat {
        ObsMat::new(1., 0., 0., 0., 0., 1., 0., 0.)
    }

    fn process_noise(&self, dt: f64) -> StateCov {
        StateCov::identity() * (self.config.process_noise * dt)
    }

    fn measurement_noise(&self) -> ObsCov {
        ObsCov::identity() * self.config.measurement_noise
    }

    /// Innovation ν = z − H·x and its covariance S = H·P·Hᵀ + R.
    pub fn innovation(&self, z: &ObsVec) -> (ObsVec, ObsCov) {
        let h = Self::observation_matrix();
        let nu = z - h * self.state;
        let s = h * self.cov * h.transpose() + self.measurement_noise();
        (nu, s)
    }

    /// Mahalanobis distance √(νᵀ S⁻¹ ν) of `z` from the current prediction.
    pub fn mahalanobis(&self, z: &ObsVec) -> Result<f64> {
        let (nu, s) = self.innovation(z);
        let s_inv = s.try_inverse().ok_or(TrackerError::DegenerateCovariance)?;
        Ok((nu.transpose() * s_inv * nu)[(0, 0)].max(0.0).sqrt())
    }
}

impl MotionFilter for CvKalmanFilter {
    fn predict(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        let f = Self::transition_matrix(dt);
        self.state = f * self.state;
        self.cov = f * self.cov * f.transpose() + self.process_noise(dt);
    }

    fn update(&mut self, z: &ObsVec) -> Result<KfUpdateResult> {
        if !z.iter().all(|v| v.is_finite()) {
            return Err(TrackerError::InvalidObservation {
                frame: None,
                x: z[0],
                y: z[1],
                reason: "non-finite observation",
            });
        }
        let h = Self::observation_matrix();
        let r = self.measurement_noise();
        let (innovation, s) = self.innovation(z);

        // Kalman gain: K = P·Hᵀ·S⁻¹
        let s_inv = s.try_inverse().ok_or(TrackerError::DegenerateCovariance)?;
        let k = self.cov * h.transpose() * s_inv;

        // Updated state: x' = x + K·ν
        self.state += k * innovation;

        // Updated covariance: Joseph form P' = (I−KH)·P·(I−KH)ᵀ + K·R·Kᵀ
        let i_kh = StateCov::identity() - k * h;
        self.cov = i_kh * self.cov * i_kh.transpose() + k * r * k.transpose();

        Ok(KfUpdateResult {
            innovation,
            innovation_cov: s,
            kalman_gain: k,
        })
    }

    fn position_estimate(&self) -> PositionEstimate {
        PositionEstimate {
            x: self.state[0],
            y: self.state[1],
            variance: self.cov[(0, 0)] + self.cov[(1, 1)],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
