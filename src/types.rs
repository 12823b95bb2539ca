//! Plain data types shared by the tracking pipeline.
//!
//! Positions are millimetres, pixels are image-plane coordinates with a
//! top-left origin, timestamps are milliseconds.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 3D point in millimetres
pub type Point = Vector3<f32>;

/// Index into per-frame face arrays
pub type FaceIdx = u32;

/// Marks a missing back-reference between face arrays
pub const INVALID_FACE_IDX: FaceIdx = u32::MAX;

/// Number of eyes per face
pub const NUM_EYES: usize = 2;

/// Eye slots in per-face arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeIdx {
    /// Right eye of the viewer
    Right = 0,
    /// Left eye of the viewer
    Left = 1,
}

/// Clock a timestamp is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimestampSpace {
    /// Monotonic time since an unspecified starting point
    #[default]
    Unknown = -1,
    /// Same timebase as [`crate::platform::Platform::system_time_ns`]
    System = 0,
}

/// Frame timestamp
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timestamp {
    /// Clock the value is expressed in
    pub space: TimestampSpace,
    /// Milliseconds
    pub ms: f64,
}

impl Timestamp {
    /// Timestamp in the system clock space
    #[must_use]
    pub fn system(ms: f64) -> Self {
        Self { space: TimestampSpace::System, ms }
    }

    /// Timestamp with an unknown origin
    #[must_use]
    pub fn unknown(ms: f64) -> Self {
        Self { space: TimestampSpace::Unknown, ms }
    }
}

/// One image of a camera frame
#[derive(Debug, Clone)]
pub struct ImageDesc {
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
    /// Sensor rotation in degrees
    pub rotation: i32,
    /// Pixel data, may be empty for metadata-only frames
    pub data: Arc<[u8]>,
}

impl ImageDesc {
    /// Image description without pixel data
    #[must_use]
    pub fn empty(width: i32, height: i32) -> Self {
        Self { width, height, rotation: 0, data: Arc::from(Vec::new()) }
    }
}

/// Pinhole camera intrinsics
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Width of the image in pixels
    pub width: i32,
    /// Height of the image in pixels
    pub height: i32,
    /// Principal point, pixel offset from the left edge
    pub ppx: f32,
    /// Principal point, pixel offset from the top edge
    pub ppy: f32,
    /// Focal length as a multiple of pixel width
    pub fx: f32,
    /// Focal length as a multiple of pixel height
    pub fy: f32,
    /// Distortion coefficients
    pub distortion_coeffs: [f32; 5],
    /// Whether the image is mirrored horizontally
    pub is_mirrored: bool,
}

impl CameraIntrinsics {
    /// Intrinsics for an undistorted camera with the principal point at the image center
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn centered(width: i32, height: i32, focal: f32) -> Self {
        Self {
            width,
            height,
            ppx: width as f32 / 2.0,
            ppy: height as f32 / 2.0,
            fx: focal,
            fy: focal,
            distortion_coeffs: [0.0; 5],
            is_mirrored: false,
        }
    }

    /// Intrinsics usable for deprojection
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.fx > 0.0 && self.fy > 0.0
    }
}

/// Position and velocity; velocity is millimetres per millisecond
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingPoint {
    /// Position
    pub pos: Point,
    /// Velocity
    pub vel: Point,
}

impl Default for MovingPoint {
    fn default() -> Self {
        Self { pos: Point::zeros(), vel: Point::zeros() }
    }
}

impl MovingPoint {
    /// Stationary point
    #[must_use]
    pub fn at(pos: Point) -> Self {
        Self { pos, vel: Point::zeros() }
    }
}

/// Final tracked face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    /// Tracking point with camera transform and Kalman filter applied
    pub point: MovingPoint,
    /// Pose angle, radians
    pub angle: Point,
    /// Index into the raw faces array, [`INVALID_FACE_IDX`] while the face is coasting
    pub raw_face_index: FaceIdx,
}

/// Deprojected face before filtering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFace {
    /// Camera-space eye positions, indexed by [`EyeIdx`]
    pub eye_points: [Point; NUM_EYES],
    /// Camera-space point of tracking
    pub tracking_point: Point,
    /// Index into the detector output faces
    pub detected_face_index: FaceIdx,
}

/// One eye as seen by the face detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eye {
    /// Image-plane coordinate, top-left origin
    pub image_coord: Vector2<f64>,
    /// Camera-space Z (projected distance, not range)
    pub depth: f32,
}

/// Face detector output for one face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedFace {
    /// Eyes, indexed by [`EyeIdx`]
    pub eyes: [Eye; NUM_EYES],
    /// Head location in mm, camera origin
    pub pose_position: Point,
    /// Head rotation in radians, left handed
    pub pose_angle: Point,
    /// Detector-assigned id, stable while the detector keeps tracking the face
    pub id: FaceIdx,
}

/// Inertial data attached to a frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Imu {
    /// Device acceleration magnitude used for jump detection
    pub acceleration: f32,
}

/// Single-face mode: track one face and switch away from it when it stays too far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleFaceConfiguration {
    /// Enable single-face mode
    pub enable: bool,
    /// Distance from the camera, metres, beyond which the tracked face is too far
    pub too_far_distance_threshold: f32,
    /// How long the tracked face must stay too far before switching
    pub too_far_reset_timeout_ms: u32,
}

impl Default for SingleFaceConfiguration {
    fn default() -> Self {
        Self { enable: false, too_far_distance_threshold: 0.8, too_far_reset_timeout_ms: 1000 }
    }
}

/// Face detector compute backend, usable as bit flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FaceDetectorBackend {
    /// Not chosen, the detector picks one
    #[default]
    Unknown = 0,
    /// CPU inference
    Cpu = 1,
    /// GPU inference
    Gpu = 2,
}

impl FaceDetectorBackend {
    /// Flag value used in supported-backend masks
    #[must_use]
    pub fn bit(self) -> u32 {
        self as u32
    }

    /// Name for logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }
}

/// Where the face detector reads its input image from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FaceDetectorInputType {
    /// Not chosen
    #[default]
    Unknown = 0,
    /// CPU memory
    Cpu = 1,
    /// GPU texture
    Gpu = 2,
}

/// Public face detector selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FaceDetectorConfig {
    /// Compute backend
    pub backend: FaceDetectorBackend,
    /// Input type
    pub input_type: FaceDetectorInputType,
}
