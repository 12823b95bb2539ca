//! Push and pull delivery of processed frames.
//!
//! The engine pushes every processed frame into a [`FrameAdapter`]. The
//! adapter forwards it to a callback and, when polling is enabled, keeps a
//! snapshot that any thread can fetch with [`FrameAdapter::get_frame`].

use std::ops::BitOr;
use std::panic::Location;
use std::sync::{Mutex, PoisonError};

use crate::double_buffer::DoubleBuffer;
use crate::types::{DetectedFace, Face, Imu, RawFace, Timestamp};
use crate::{Error, Result};

/// Timing of one frame, nanoseconds in the system clock space; 0 when not measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameProfiling {
    /// Camera exposure
    pub camera_exposure_time: i64,
    /// Face detector starts processing the camera frame
    pub face_detector_start_time: i64,
    /// Face detector ends processing the camera frame
    pub face_detector_end_time: i64,
    /// Engine hands the frame to the user
    pub api_timestamp: i64,
}

/// Parts of a frame a consumer wants to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameContent(u32);

impl FrameContent {
    /// Tracked faces, timestamp, jump flag and IMU
    pub const TRACKING: Self = Self(1);
    /// Raw faces
    pub const RAW_FACES: Self = Self(1 << 1);
    /// Detector output
    pub const DETECTED_FACES: Self = Self(1 << 2);
    /// Profiling timestamps
    pub const PROFILING: Self = Self(1 << 3);
    /// Everything
    pub const ALL: Self = Self(0b1111);

    /// Whether all parts of `other` are included
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for FrameContent {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for FrameContent {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Result of processing one camera frame
pub trait Frame {
    /// Tracked faces, primary first
    fn faces(&self) -> &[Face];
    /// Camera timestamp of the frame
    fn timestamp(&self) -> Timestamp;
    /// Device motion compensation active
    fn jump_flag(&self) -> bool;
    /// Inertial data used for the frame
    fn imu(&self) -> Imu;
    /// Deprojected faces before filtering
    fn raw_faces(&self) -> &[RawFace];
    /// Face detector output
    fn detected_faces(&self) -> &[DetectedFace];
    /// Timing information
    fn profiling(&self) -> FrameProfiling;
}

/// Owned copy of a [`Frame`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferedFrame {
    /// Tracked faces, primary first
    pub faces: Vec<Face>,
    /// Camera timestamp of the frame
    pub timestamp: Timestamp,
    /// Device motion compensation active
    pub jump_flag: bool,
    /// Inertial data used for the frame
    pub imu: Imu,
    /// Deprojected faces before filtering
    pub raw_faces: Vec<RawFace>,
    /// Face detector output
    pub detected_faces: Vec<DetectedFace>,
    /// Timing information
    pub profiling: FrameProfiling,
}

impl BufferedFrame {
    /// Copy every part of `frame`
    #[must_use]
    pub fn from_frame(frame: &dyn Frame) -> Self {
        let mut buffered = Self::default();
        buffered.copy_from(frame, FrameContent::ALL);
        buffered
    }

    /// Overwrite with the `content` parts of `frame`, reusing allocations.
    /// Parts not in `content` are cleared.
    pub fn copy_from(&mut self, frame: &dyn Frame, content: FrameContent) {
        self.faces.clear();
        self.raw_faces.clear();
        self.detected_faces.clear();
        self.timestamp = frame.timestamp();

        if content.contains(FrameContent::TRACKING) {
            self.faces.extend_from_slice(frame.faces());
            self.jump_flag = frame.jump_flag();
            self.imu = frame.imu();
        } else {
            self.jump_flag = false;
            self.imu = Imu::default();
        }
        if content.contains(FrameContent::RAW_FACES) {
            self.raw_faces.extend_from_slice(frame.raw_faces());
        }
        if content.contains(FrameContent::DETECTED_FACES) {
            self.detected_faces.extend_from_slice(frame.detected_faces());
        }
        self.profiling =
            if content.contains(FrameContent::PROFILING) { frame.profiling() } else { FrameProfiling::default() };
    }
}

impl Frame for BufferedFrame {
    fn faces(&self) -> &[Face] {
        &self.faces
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn jump_flag(&self) -> bool {
        self.jump_flag
    }

    fn imu(&self) -> Imu {
        self.imu
    }

    fn raw_faces(&self) -> &[RawFace] {
        &self.raw_faces
    }

    fn detected_faces(&self) -> &[DetectedFace] {
        &self.detected_faces
    }

    fn profiling(&self) -> FrameProfiling {
        self.profiling
    }
}

/// Frame listener
pub type FrameCallback = Box<dyn Fn(&dyn Frame) + Send + Sync>;

#[derive(Default)]
struct PollBuffers {
    frames: DoubleBuffer<BufferedFrame>,
    has_frame: bool,
}

struct Poller {
    content: FrameContent,
    buffers: Mutex<PollBuffers>,
}

/// Delivers frames to a callback and/or keeps the latest one for polling
pub struct FrameAdapter {
    callback: Option<FrameCallback>,
    poller: Option<Poller>,
}

impl FrameAdapter {
    /// Adapter forwarding to `callback`; `enable_polling` keeps a full snapshot for [`FrameAdapter::get_frame`]
    #[must_use]
    pub fn new(callback: Option<FrameCallback>, enable_polling: bool) -> Self {
        let content = if enable_polling { Some(FrameContent::ALL) } else { None };
        Self::with_content(callback, content)
    }

    /// Like [`FrameAdapter::new`], polling only the `content` parts when `Some`
    #[must_use]
    pub fn with_content(callback: Option<FrameCallback>, content: Option<FrameContent>) -> Self {
        let poller = content.map(|content| Poller { content, buffers: Mutex::new(PollBuffers::default()) });
        Self { callback, poller }
    }

    /// Whether [`FrameAdapter::get_frame`] is available
    #[must_use]
    pub fn is_polling_enabled(&self) -> bool {
        self.poller.is_some()
    }

    /// Deliver a processed frame
    pub fn on_frame(&self, frame: &dyn Frame) {
        if let Some(callback) = &self.callback {
            callback(frame);
        }
        if let Some(poller) = &self.poller {
            let mut buffers = poller.buffers.lock().unwrap_or_else(PoisonError::into_inner);
            let (_, next) = buffers.frames.swap();
            next.copy_from(frame, poller.content);
            buffers.has_frame = true;
        }
    }

    /// Latest delivered frame, `None` before the first one
    ///
    /// # Errors
    ///
    /// Returns [`Error::PollingDisabled`] if the adapter was created without polling.
    #[track_caller]
    pub fn get_frame(&self) -> Result<Option<BufferedFrame>> {
        let poller = self.poller.as_ref().ok_or(Error::PollingDisabled { location: Location::caller() })?;
        let buffers = poller.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(buffers.has_frame.then(|| buffers.frames.get().clone()))
    }
}
