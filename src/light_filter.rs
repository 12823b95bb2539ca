//! Ambient-light gating of face detection.
//!
//! Below `cutoff_lux` detection is skipped. Between `cutoff_lux` and
//! `check_lux` detections are only trusted once faces have been present for
//! `check_num_frames` consecutive frames.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::INVALID_LUX;
use crate::face_detector::FaceDetectorOutput;
use crate::{Error, Result};

/// Light filter thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightFilterConfiguration {
    /// Enable light gating
    pub enable: bool,
    /// Below this lux no detection runs
    pub cutoff_lux: f32,
    /// At or above this lux detections are trusted immediately
    pub check_lux: f32,
    /// Consecutive frames with faces needed between the two thresholds
    pub check_num_frames: u32,
}

impl Default for LightFilterConfiguration {
    fn default() -> Self {
        Self { enable: false, cutoff_lux: 500.0, check_lux: 550.0, check_num_frames: 90 }
    }
}

impl LightFilterConfiguration {
    /// Check the thresholds
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if a threshold is not finite or
    /// the cutoff is above the check threshold.
    pub fn validate(&self) -> Result<()> {
        if !self.cutoff_lux.is_finite() || !self.check_lux.is_finite() {
            return Err(Error::InvalidConfiguration("light filter thresholds must be finite".to_string()));
        }
        if self.cutoff_lux > self.check_lux {
            return Err(Error::InvalidConfiguration(format!(
                "light filter cutoff ({}) exceeds check threshold ({})",
                self.cutoff_lux, self.check_lux
            )));
        }
        Ok(())
    }
}

/// Light gate state
#[derive(Debug, Clone, Default)]
pub struct LightFilter {
    config: LightFilterConfiguration,
    frames_with_faces: u32,
}

impl LightFilter {
    /// Filter with `config`
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: LightFilterConfiguration) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, frames_with_faces: 0 })
    }

    /// Active thresholds
    #[must_use]
    pub fn configuration(&self) -> &LightFilterConfiguration {
        &self.config
    }

    /// Replace the thresholds and restart the face count
    ///
    /// # Errors
    ///
    /// Returns an error and keeps the current thresholds if `config` is invalid.
    pub fn set_configuration(&mut self, config: LightFilterConfiguration) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.frames_with_faces = 0;
        Ok(())
    }

    fn gates(&self, lux: f32) -> bool {
        self.config.enable && lux != INVALID_LUX && lux.is_finite()
    }

    /// Whether detection should run on a frame taken at `lux`
    #[must_use]
    pub fn should_detect_faces(&self, lux: f32) -> bool {
        !(self.gates(lux) && lux < self.config.cutoff_lux)
    }

    /// Whether the faces in `output`, detected at `lux`, should be discarded
    pub fn should_drop_faces(&mut self, lux: f32, output: &FaceDetectorOutput) -> bool {
        let has_faces = !output.faces.is_empty();
        if !self.gates(lux) || lux >= self.config.check_lux {
            self.frames_with_faces = if has_faces { self.config.check_num_frames } else { 0 };
            return false;
        }
        if lux < self.config.cutoff_lux {
            self.frames_with_faces = 0;
            return has_faces;
        }
        if !has_faces {
            self.frames_with_faces = 0;
            return false;
        }

        self.frames_with_faces = self.frames_with_faces.saturating_add(1);
        let drop = self.frames_with_faces < self.config.check_num_frames;
        if drop {
            debug!(
                "Low light ({lux} lux): holding faces back, {}/{} frames",
                self.frames_with_faces, self.config.check_num_frames
            );
        }
        drop
    }
}
