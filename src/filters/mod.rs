//! Signal filtering for tracked face positions.
//!
//! The Kalman filter smooths each tracked face's 3D position and estimates its
//! velocity; the low-pass filter smooths the primary face's head pose depth.

/// Constant-velocity Kalman filter over a 3D position
pub mod kalman;

/// First-order low-pass filter over a scalar
pub mod low_pass;

pub use kalman::{KalmanCoeffs, KalmanFilter};
pub use low_pass::LowPassFilter;
