//! Fixed-layout mirrors of the C tracking structs.
//!
//! Every struct is packed to 4 bytes and holds at most [`MAX_NUM_FACES`]
//! faces; conversions from a [`Frame`] truncate and set `num_faces`.

use nalgebra::{Vector2, Vector3};

pub use crate::constants::MAX_NUM_FACES;
use crate::frame_adapter::{Frame, FrameProfiling};
use crate::types::{DetectedFace, Eye, Face, FaceIdx, MovingPoint, RawFace, Timestamp, NUM_EYES};

/// Status code of the C API
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiStatus {
    /// Call succeeded
    Success = 0,
    /// Handle does not refer to a live object
    ErrorInvalidInstance = 1,
    /// Any other failure
    ErrorUnknown = 2,
}

/// `leia_timestamp`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiTimestamp {
    /// Clock, see [`crate::types::TimestampSpace`]
    pub space: i32,
    /// Milliseconds
    pub ms: f64,
}

/// `leia_vector2d`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiVector2d {
    /// X
    pub x: f64,
    /// Y
    pub y: f64,
}

/// `leia_vector3`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiVector3 {
    /// X
    pub x: f32,
    /// Y
    pub y: f32,
    /// Z
    pub z: f32,
}

/// `leia_headtracking_moving_point`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiMovingPoint {
    /// Position
    pub pos: AbiVector3,
    /// Velocity
    pub vel: AbiVector3,
}

/// `leia_headtracking_face`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiFace {
    /// Filtered tracking point
    pub point: AbiMovingPoint,
    /// Pose angle
    pub angle: AbiVector3,
    /// Index into the raw faces
    pub raw_face_index: FaceIdx,
}

/// `leia_headtracking_raw_face`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiRawFace {
    /// Camera-space eye positions
    pub eye_points: [AbiVector3; NUM_EYES],
    /// Point of tracking
    pub tracking_point: AbiVector3,
    /// Index into the detected faces
    pub detected_face_index: FaceIdx,
}

/// `leia_headtracking_detected_face_eye`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiDetectedFaceEye {
    /// Image-plane coordinate
    pub image_coord: AbiVector2d,
    /// Camera-space Z
    pub depth: f32,
}

/// `leia_headtracking_detected_face`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiDetectedFace {
    /// Eyes
    pub eyes: [AbiDetectedFaceEye; NUM_EYES],
    /// Head location, mm
    pub pose_position: AbiVector3,
    /// Head rotation, radians
    pub pose_angle: AbiVector3,
    /// Detector id
    pub id: u32,
}

/// `leia_headtracking_tracking_result`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiTrackingResult {
    /// Valid entries in `faces`
    pub num_faces: i32,
    /// Tracked faces
    pub faces: [AbiFace; MAX_NUM_FACES],
    /// Frame timestamp
    pub timestamp: AbiTimestamp,
    /// Jump flag, 0 or 1
    pub jump_flag: i32,
}

/// `leia_headtracking_raw_faces`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiRawFaces {
    /// Valid entries in `faces`
    pub num_faces: i32,
    /// Raw faces
    pub faces: [AbiRawFace; MAX_NUM_FACES],
}

/// `leia_headtracking_detected_faces`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiDetectedFaces {
    /// Valid entries in `faces`
    pub num_faces: i32,
    /// Detected faces
    pub faces: [AbiDetectedFace; MAX_NUM_FACES],
}

/// `leia_headtracking_frame_profiling`
#[repr(C, packed(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiFrameProfiling {
    /// Camera exposure, ns
    pub camera_exposure_time: i64,
    /// Detector start, ns
    pub face_detector_start_time: i64,
    /// Detector end, ns
    pub face_detector_end_time: i64,
    /// Delivery to the user, ns
    pub api_timestamp: i64,
}

impl From<Vector3<f32>> for AbiVector3 {
    fn from(v: Vector3<f32>) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<AbiVector3> for Vector3<f32> {
    fn from(v: AbiVector3) -> Self {
        Vector3::new(v.x, v.y, v.z)
    }
}

impl From<Vector2<f64>> for AbiVector2d {
    fn from(v: Vector2<f64>) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<Timestamp> for AbiTimestamp {
    fn from(t: Timestamp) -> Self {
        Self { space: t.space as i32, ms: t.ms }
    }
}

impl From<MovingPoint> for AbiMovingPoint {
    fn from(p: MovingPoint) -> Self {
        Self { pos: p.pos.into(), vel: p.vel.into() }
    }
}

impl From<&Face> for AbiFace {
    fn from(face: &Face) -> Self {
        Self { point: face.point.into(), angle: face.angle.into(), raw_face_index: face.raw_face_index }
    }
}

impl From<&RawFace> for AbiRawFace {
    fn from(face: &RawFace) -> Self {
        Self {
            eye_points: face.eye_points.map(AbiVector3::from),
            tracking_point: face.tracking_point.into(),
            detected_face_index: face.detected_face_index,
        }
    }
}

impl From<&Eye> for AbiDetectedFaceEye {
    fn from(eye: &Eye) -> Self {
        Self { image_coord: eye.image_coord.into(), depth: eye.depth }
    }
}

impl From<&DetectedFace> for AbiDetectedFace {
    fn from(face: &DetectedFace) -> Self {
        Self {
            eyes: [AbiDetectedFaceEye::from(&face.eyes[0]), AbiDetectedFaceEye::from(&face.eyes[1])],
            pose_position: face.pose_position.into(),
            pose_angle: face.pose_angle.into(),
            id: face.id,
        }
    }
}

impl From<FrameProfiling> for AbiFrameProfiling {
    fn from(p: FrameProfiling) -> Self {
        Self {
            camera_exposure_time: p.camera_exposure_time,
            face_detector_start_time: p.face_detector_start_time,
            face_detector_end_time: p.face_detector_end_time,
            api_timestamp: p.api_timestamp,
        }
    }
}

// Copies at most MAX_NUM_FACES entries, returns how many were written
fn fill_bounded<S, D>(source: &[S], target: &mut [D; MAX_NUM_FACES]) -> i32
where
    for<'a> D: From<&'a S>,
{
    let mut count = 0;
    for (slot, item) in target.iter_mut().zip(source) {
        *slot = D::from(item);
        count += 1;
    }
    count
}

impl AbiTrackingResult {
    /// Tracking result of `frame`
    #[must_use]
    pub fn from_frame(frame: &dyn Frame) -> Self {
        let mut result = Self::default();
        let mut faces = [AbiFace::default(); MAX_NUM_FACES];
        result.num_faces = fill_bounded(frame.faces(), &mut faces);
        result.faces = faces;
        result.timestamp = frame.timestamp().into();
        result.jump_flag = i32::from(frame.jump_flag());
        result
    }

    /// Valid faces
    #[must_use]
    pub fn valid_faces(&self) -> Vec<AbiFace> {
        let faces = self.faces;
        let count = usize::try_from(self.num_faces).unwrap_or(0).min(MAX_NUM_FACES);
        faces[..count].to_vec()
    }
}

impl AbiRawFaces {
    /// Raw faces of `frame`
    #[must_use]
    pub fn from_frame(frame: &dyn Frame) -> Self {
        let mut faces = [AbiRawFace::default(); MAX_NUM_FACES];
        let num_faces = fill_bounded(frame.raw_faces(), &mut faces);
        Self { num_faces, faces }
    }
}

impl AbiDetectedFaces {
    /// Detector output of `frame`
    #[must_use]
    pub fn from_frame(frame: &dyn Frame) -> Self {
        let mut faces = [AbiDetectedFace::default(); MAX_NUM_FACES];
        let num_faces = fill_bounded(frame.detected_faces(), &mut faces);
        Self { num_faces, faces }
    }
}

impl AbiFrameProfiling {
    /// Profiling of `frame`
    #[must_use]
    pub fn from_frame(frame: &dyn Frame) -> Self {
        frame.profiling().into()
    }
}
