//! Device acceleration sampling for jump detection.
//!
//! Samples arrive from the host at sensor rate on any thread; the engine drains
//! them once per processed frame.

use nalgebra::Vector3;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Samples kept between two frames; older samples are discarded first
const MAX_PENDING_SAMPLES: usize = 256;

#[derive(Debug, Default)]
struct Samples {
    pending: VecDeque<f32>,
    last: f32,
}

/// Collects linear-acceleration samples between frames
#[derive(Debug, Default)]
pub struct AccelerationMonitor {
    samples: Mutex<Samples>,
}

impl AccelerationMonitor {
    /// Monitor without samples
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one linear-acceleration sample
    pub fn push(&self, acceleration: Vector3<f32>) {
        let magnitude = acceleration.norm();
        if !magnitude.is_finite() {
            return;
        }
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        if samples.pending.len() >= MAX_PENDING_SAMPLES {
            samples.pending.pop_front();
        }
        samples.pending.push_back(magnitude);
        samples.last = magnitude;
    }

    /// Largest magnitude since the previous call, or the latest sample if none arrived
    pub fn take_frame_acceleration(&self) -> f32 {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        let peak = samples.pending.drain(..).reduce(f32::max);
        peak.unwrap_or(samples.last)
    }

    /// Forget all samples
    pub fn reset(&self) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        samples.pending.clear();
        samples.last = 0.0;
    }
}
