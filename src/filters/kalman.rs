use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_KALMAN_A, DEFAULT_KALMAN_B};
use crate::types::{MovingPoint, Point};

/// Per-axis gains of the constant-velocity filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanCoeffs {
    /// Position gain
    pub a: Vector3<f32>,
    /// Velocity gain
    pub b: Vector3<f32>,
}

impl Default for KalmanCoeffs {
    fn default() -> Self {
        Self {
            a: Vector3::from(DEFAULT_KALMAN_A),
            b: Vector3::repeat(DEFAULT_KALMAN_B),
        }
    }
}

impl KalmanCoeffs {
    /// Gains that keep the filter stable: `a` in (0, 1], `b` in [0, 1]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.a.iter().all(|a| a.is_finite() && *a > 0.0 && *a <= 1.0)
            && self.b.iter().all(|b| b.is_finite() && (0.0..=1.0).contains(b))
    }
}

/// Steady-state Kalman filter over a 3D position with a constant-velocity model.
///
/// Time is in milliseconds and velocity in millimetres per millisecond.
#[derive(Debug, Clone, Default)]
pub struct KalmanFilter {
    is_valid: bool,
    point: MovingPoint,
}

impl KalmanFilter {
    /// Filter that needs a [`KalmanFilter::reset`] before use
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a fresh reset before the next update
    pub fn invalidate(&mut self) {
        self.is_valid = false;
    }

    /// Restart at `pos` with zero velocity. The filter becomes valid.
    pub fn reset(&mut self, pos: Point) {
        self.point = MovingPoint::at(pos);
        self.is_valid = true;
    }

    /// Fold in `measured_pos` taken `dt` ms after the last state.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if the filter is invalid or `dt` is not positive.
    pub fn update(&mut self, coeffs: &KalmanCoeffs, measured_pos: Point, dt: f32) {
        debug_assert!(self.is_valid, "KalmanFilter::update on an invalid filter");
        debug_assert!(dt > 0.0, "KalmanFilter::update requires dt > 0");

        let predicted = Self::predict_point(&self.point, dt);
        let residual = measured_pos - predicted;

        self.point.pos = predicted + coeffs.a.component_mul(&residual);
        self.point.vel += coeffs.b.component_mul(&residual) / dt;
    }

    /// Position of `point` after `dt` ms
    #[must_use]
    pub fn predict_point(point: &MovingPoint, dt: f32) -> Point {
        point.pos + point.vel * dt
    }

    /// Position of the current state after `dt` ms; the state is not touched
    #[must_use]
    pub fn predict(&self, dt: f32) -> Point {
        Self::predict_point(&self.point, dt)
    }

    /// Whether the filter holds a state
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Current state
    #[must_use]
    pub fn point(&self) -> &MovingPoint {
        &self.point
    }
}
