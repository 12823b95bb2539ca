use log::{debug, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{Camera, CameraCaptureConfiguration, CameraListener, PinholeCameraFrame, INVALID_LUX};
use crate::types::{CameraIntrinsics, ImageDesc, Timestamp};
use crate::Result;

/// Entry point for a host that manages the camera itself.
///
/// All face tracking for a pushed image happens inside [`SharedCameraSink::push_image`],
/// on the caller's thread. Intrinsics must be set before images are pushed and
/// from the same thread.
pub struct SharedCameraSink {
    listener: RwLock<Option<Arc<dyn CameraListener>>>,
    intrinsics: Mutex<Option<CameraIntrinsics>>,
    lux: AtomicU32,
}

impl Default for SharedCameraSink {
    fn default() -> Self {
        Self {
            listener: RwLock::new(None),
            intrinsics: Mutex::new(None),
            lux: AtomicU32::new(INVALID_LUX.to_bits()),
        }
    }
}

impl SharedCameraSink {
    /// Sink with no listener attached
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an image. Returns `false` when no tracking session is listening
    /// or intrinsics are unknown.
    pub fn push_image(&self, image: ImageDesc, timestamp: Timestamp) -> bool {
        let listener = self.listener.read().unwrap_or_else(PoisonError::into_inner);
        let Some(listener) = listener.as_ref() else {
            return false;
        };
        let Some(intrinsics) = *self.intrinsics.lock().unwrap_or_else(PoisonError::into_inner) else {
            warn!("Shared camera image dropped: intrinsics are not set");
            return false;
        };
        let frame = PinholeCameraFrame::new(image, timestamp, intrinsics);
        listener.on_camera_frame_available(&frame, self.lux());
        true
    }

    /// Update camera intrinsics
    pub fn set_intrinsics(&self, intrinsics: CameraIntrinsics) {
        {
            let mut current = self.intrinsics.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == Some(intrinsics) {
                return;
            }
            *current = Some(intrinsics);
        }
        let listener = self.listener.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(listener) = listener.as_ref() {
            listener.on_camera_intrinsics_change(&intrinsics);
        }
    }

    /// Update the ambient light reading
    pub fn set_lux(&self, lux: f32) {
        self.lux.store(lux.to_bits(), Ordering::Relaxed);
    }

    /// Latest ambient light reading
    #[must_use]
    pub fn lux(&self) -> f32 {
        f32::from_bits(self.lux.load(Ordering::Relaxed))
    }

    /// Whether a tracking session currently receives pushed images
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.listener.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn attach(&self, listener: Arc<dyn CameraListener>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
        let intrinsics = *self.intrinsics.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(intrinsics) = intrinsics {
            let listener = self.listener.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(listener) = listener.as_ref() {
                listener.on_camera_intrinsics_change(&intrinsics);
            }
        }
    }

    // Waits for an in-flight push_image to return.
    fn detach(&self) {
        self.listener.write().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Camera driven by a [`SharedCameraSink`]
pub struct SharedCamera {
    listener: Arc<dyn CameraListener>,
    sink: Arc<SharedCameraSink>,
    capturing: bool,
}

impl SharedCamera {
    /// Bind `listener` to frames pushed into `sink`
    #[must_use]
    pub fn new(listener: Arc<dyn CameraListener>, sink: Arc<SharedCameraSink>) -> Self {
        Self { listener, sink, capturing: false }
    }
}

impl Camera for SharedCamera {
    fn start_capture(&mut self, _config: &CameraCaptureConfiguration) -> Result<()> {
        if !self.capturing {
            debug!("Attaching to shared camera sink");
            self.sink.attach(Arc::clone(&self.listener));
            self.capturing = true;
        }
        Ok(())
    }

    fn stop_capture(&mut self) {
        if self.capturing {
            debug!("Detaching from shared camera sink");
            self.sink.detach();
            self.capturing = false;
        }
    }

    fn fps(&self) -> u32 {
        0
    }

    fn set_fps(&mut self, _fps: u32) -> bool {
        false
    }

    fn supported_fps(&self) -> Vec<u32> {
        Vec::new()
    }

    fn lux(&self) -> f32 {
        self.sink.lux()
    }
}

impl Drop for SharedCamera {
    fn drop(&mut self) {
        self.stop_capture();
    }
}
