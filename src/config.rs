//! Configuration management for the head tracking application

use crate::engine::EngineConfiguration;
use crate::simulation::SceneConfiguration;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine configuration: face tracker, detector, camera and light filter
    pub engine: EngineConfiguration,

    /// Simulated scene driving the engine
    pub simulation: SceneConfiguration,
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoError`] if the file cannot be read and
    /// [`Error::ConfigError`] if it is not a valid configuration.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::IoError(e.to_string()))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the text is not a valid configuration.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| Error::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.engine.validate().map_err(|e| Error::ConfigError(e.to_string()))?;
        self.simulation.validate().map_err(|e| Error::ConfigError(e.to_string()))?;

        let detector_faces = self.engine.face_detector.max_num_of_faces;
        if usize::try_from(detector_faces).map_or(true, |n| n > crate::constants::MAX_NUM_FACES) {
            return Err(Error::ConfigError(format!(
                "At most {} faces can be tracked, {} requested",
                crate::constants::MAX_NUM_FACES,
                detector_faces
            )));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Head Tracking Configuration

engine:
  # Face tracker; distances in mm, times in ms
  face_tracker:
    track_right_eye: true
    track_left_eye: true
    head_pose_z_low_pass_alpha: 0.2
    camera_position: [0.0, 0.0, 0.0]
    single_face:
      enable: false
      too_far_distance_threshold: 0.8
      too_far_reset_timeout_ms: 1000
    filter_properties:
      acceleration_threshold: 0.5
      survival_time_ms: 600.0
      vel_damping_time: 100.0
      min_fit_dist: 40.0
      max_fit_dist: 2000.0
      angle_y_max: 0.785398
      interocular_distance_min: 30.0
      interocular_distance_max: 80.0
      buffer_lim: 600.0
      main_face_skew: [0.0, 0.0, 0.0]
      main_face_scale: [4.0, 4.0, 1.0]
      kalman:
        a: [0.02, 0.05, 0.2]
        b: [0.1, 0.1, 0.1]

  # Face detector; 0 faces selects the detector limit
  face_detector:
    max_num_of_faces: 0
    backend: Unknown
    input_type: Unknown

  # Camera mode; zeros select automatic values
  camera:
    width: 0
    height: 0
    fps: 30
    binning_factor: 0.0

  # Ambient light gating
  light_filter:
    enable: false
    cutoff_lux: 500.0
    check_lux: 550.0
    check_num_frames: 90

  enable_profiling: false

# Simulated scene
simulation:
  width: 640
  height: 480
  focal_length: 600.0
  mirrored: false
  fps: 30
  num_frames: 0
  real_time: true
  noise_px: 0.0
  seed: 0
  heads:
    - position: [0.0, 0.0, 600.0]
      velocity: [20.0, 0.0, 0.0]
      appear_ms: 0.0
      interocular_distance: 63.0
"#;
