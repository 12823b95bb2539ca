//! Camera abstraction: frames with deprojection, capture lifecycle and listeners.
//!
//! Two camera variants are provided, picked when tracking starts:
//! - [`shared::SharedCamera`]: the host owns the camera and pushes images into a
//!   [`shared::SharedCameraSink`].
//! - [`platform::PlatformCamera`]: a background capture thread pulls frames from
//!   a host-supplied [`platform::FrameSource`] (device drivers live behind it).

/// Host-driven camera
pub mod shared;

/// Camera with its own capture thread
pub mod platform;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::types::{CameraIntrinsics, ImageDesc, Point, Timestamp};
use crate::{Error, Result};

pub use crate::constants::INVALID_LUX;

/// Single-frame data. A frame is stereo when it carries two images.
pub trait CameraFrame {
    /// Capture time of the frame
    fn timestamp(&self) -> Timestamp;

    /// Images contained in the frame, valid for the lifetime of the frame
    fn image_descs(&self) -> &[ImageDesc];

    /// Camera-space Z at `pixel`, `None` without depth data
    fn depth(&self, pixel: Vector2<f64>) -> Option<f32>;

    /// Camera-space point seen at `pixel` with camera-space Z `depth`
    fn deproject_pixel_to_point(&self, pixel: Vector2<f64>, depth: f32) -> Option<Point>;

    /// Pixel and camera-space Z of `point`
    fn project_point_to_pixel(&self, point: &Point) -> Option<(Vector2<f64>, f32)>;

    /// GPU texture holding the image, if any
    fn gpu_texture_id(&self) -> Option<u32> {
        None
    }
}

/// Requested camera mode. Zeros select automatic values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfiguration {
    /// Image width
    pub width: i32,
    /// Image height
    pub height: i32,
    /// Frames per second
    pub fps: u32,
    /// Sensor binning factor
    pub binning_factor: f32,
}

/// Per-session capture options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CameraCaptureConfiguration {
    /// Measure ambient light
    pub enable_lux: bool,
}

/// Receives frames and intrinsics from a camera, on the camera's thread.
pub trait CameraListener: Send + Sync {
    /// A new frame is available; `lux` is the latest ambient light reading
    fn on_camera_frame_available(&self, frame: &dyn CameraFrame, lux: f32);

    /// Intrinsics changed; called before the first frame with new intrinsics
    fn on_camera_intrinsics_change(&self, intrinsics: &CameraIntrinsics);

    /// Capture stopped because the device failed
    fn on_camera_error(&self, _error: &Error) {}
}

/// Frame producer with a start/stop lifecycle
pub trait Camera: Send {
    /// Start delivering frames to the listener
    ///
    /// # Errors
    ///
    /// Returns an error if capture cannot be started.
    fn start_capture(&mut self, config: &CameraCaptureConfiguration) -> Result<()>;

    /// Stop delivering frames. Blocks until the frame in flight, if any, is processed.
    fn stop_capture(&mut self);

    /// Current frame rate, 0 when unknown
    fn fps(&self) -> u32;

    /// Request a frame rate from [`Camera::supported_fps`]
    fn set_fps(&mut self, fps: u32) -> bool;

    /// Frame rates the camera can run at
    fn supported_fps(&self) -> Vec<u32>;

    /// Latest ambient light reading, [`INVALID_LUX`] when unavailable
    fn lux(&self) -> f32;
}

/// Frame without geometry: every projection fails.
#[derive(Debug, Clone)]
pub struct TrivialCameraFrame {
    image: [ImageDesc; 1],
    timestamp: Timestamp,
}

impl TrivialCameraFrame {
    /// Wrap a single image
    #[must_use]
    pub fn new(image: ImageDesc, timestamp: Timestamp) -> Self {
        Self { image: [image], timestamp }
    }
}

impl CameraFrame for TrivialCameraFrame {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn image_descs(&self) -> &[ImageDesc] {
        &self.image
    }

    fn depth(&self, _pixel: Vector2<f64>) -> Option<f32> {
        None
    }

    fn deproject_pixel_to_point(&self, _pixel: Vector2<f64>, _depth: f32) -> Option<Point> {
        None
    }

    fn project_point_to_pixel(&self, _point: &Point) -> Option<(Vector2<f64>, f32)> {
        None
    }
}

/// Mono frame with pinhole geometry. Distortion is not modelled, images are
/// expected to be rectified.
#[derive(Debug, Clone)]
pub struct PinholeCameraFrame {
    image: [ImageDesc; 1],
    timestamp: Timestamp,
    intrinsics: CameraIntrinsics,
}

impl PinholeCameraFrame {
    /// Frame for `image` captured with `intrinsics`
    #[must_use]
    pub fn new(image: ImageDesc, timestamp: Timestamp, intrinsics: CameraIntrinsics) -> Self {
        Self { image: [image], timestamp, intrinsics }
    }

    /// Intrinsics used for (de)projection
    #[must_use]
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    fn unmirror_x(&self, x: f64) -> f64 {
        if self.intrinsics.is_mirrored {
            f64::from(self.intrinsics.width) - x
        } else {
            x
        }
    }
}

impl CameraFrame for PinholeCameraFrame {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn image_descs(&self) -> &[ImageDesc] {
        &self.image
    }

    fn depth(&self, _pixel: Vector2<f64>) -> Option<f32> {
        None
    }

    #[allow(clippy::cast_possible_truncation)]
    fn deproject_pixel_to_point(&self, pixel: Vector2<f64>, depth: f32) -> Option<Point> {
        if !self.intrinsics.is_valid() || !depth.is_finite() || depth <= 0.0 {
            return None;
        }
        if !pixel.x.is_finite() || !pixel.y.is_finite() {
            return None;
        }
        let intr = &self.intrinsics;
        let x = (self.unmirror_x(pixel.x) - f64::from(intr.ppx)) / f64::from(intr.fx);
        let y = (pixel.y - f64::from(intr.ppy)) / f64::from(intr.fy);
        Some(Point::new(x as f32 * depth, y as f32 * depth, depth))
    }

    fn project_point_to_pixel(&self, point: &Point) -> Option<(Vector2<f64>, f32)> {
        if !self.intrinsics.is_valid() || !(point.z > 0.0) {
            return None;
        }
        let intr = &self.intrinsics;
        let u = f64::from(intr.fx) * f64::from(point.x / point.z) + f64::from(intr.ppx);
        let v = f64::from(intr.fy) * f64::from(point.y / point.z) + f64::from(intr.ppy);
        Some((Vector2::new(self.unmirror_x(u), v), point.z))
    }
}
