//! Face detector seam.
//!
//! Inference backends live outside this crate. The engine creates a detector
//! through a [`FaceDetectorFactory`] when tracking starts and whenever the
//! detector configuration changes.

use serde::{Deserialize, Serialize};

use crate::camera::CameraFrame;
use crate::types::{
    CameraIntrinsics, DetectedFace, FaceDetectorBackend, FaceDetectorConfig, FaceDetectorInputType, FaceIdx,
};
use crate::Result;

/// Detector creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceDetectorConfiguration {
    /// Faces to detect per frame, 0 selects the detector limit
    pub max_num_of_faces: u32,
    /// Compute backend
    pub backend: FaceDetectorBackend,
    /// Input image location
    pub input_type: FaceDetectorInputType,
}

impl FaceDetectorConfiguration {
    /// Public part of the configuration
    #[must_use]
    pub fn public_config(&self) -> FaceDetectorConfig {
        FaceDetectorConfig { backend: self.backend, input_type: self.input_type }
    }
}

/// Faces found in one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceDetectorOutput {
    /// Detected faces, at most the configured maximum
    pub faces: Vec<DetectedFace>,
}

/// Per-frame face detector
pub trait FaceDetector: Send {
    /// Hard upper bound on faces per frame
    fn max_num_of_faces_limit(&self) -> u32;

    /// Active backend and input type
    fn config(&self) -> FaceDetectorConfig;

    /// Intrinsics changed; called before the first frame with new intrinsics
    fn camera_did_change(&mut self, intrinsics: &CameraIntrinsics);

    /// Run detection on `frame`
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails. The engine treats this as fatal.
    fn detect_faces(&mut self, frame: &dyn CameraFrame) -> Result<FaceDetectorOutput>;

    /// Restrict detection to the face with detector id `id`; `false` if unsupported
    fn track_single_face(&mut self, _id: FaceIdx) -> bool {
        false
    }
}

/// Creates detectors for the engine
pub trait FaceDetectorFactory: Send + Sync {
    /// Bit mask of [`FaceDetectorBackend::bit`] values this factory can create
    fn supported_backends(&self) -> u32;

    /// Create a detector
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized (missing model, no GPU).
    fn create(&self, config: &FaceDetectorConfiguration) -> Result<Box<dyn FaceDetector>>;

    /// Whether `backend` can be created. [`FaceDetectorBackend::Unknown`] lets the factory pick.
    fn supports(&self, backend: FaceDetectorBackend) -> bool {
        backend == FaceDetectorBackend::Unknown || self.supported_backends() & backend.bit() != 0
    }
}
