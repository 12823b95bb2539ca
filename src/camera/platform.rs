use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{Camera, CameraCaptureConfiguration, CameraConfiguration, CameraFrame, CameraListener, INVALID_LUX};
use crate::types::CameraIntrinsics;
use crate::{Error, Result};

/// Device-side frame producer driven by a [`PlatformCamera`] capture thread.
///
/// `next_frame` may block until the device delivers a frame; it paces capture.
pub trait FrameSource: Send {
    /// Current intrinsics, polled after every frame to detect changes
    fn intrinsics(&self) -> CameraIntrinsics;

    /// Next frame, `Ok(None)` at end of stream
    ///
    /// # Errors
    ///
    /// Returns an error if the device fails; capture stops.
    fn next_frame(&mut self) -> Result<Option<Box<dyn CameraFrame>>>;

    /// Current frame rate
    fn fps(&self) -> u32;

    /// Frame rates the device supports
    fn supported_fps(&self) -> Vec<u32> {
        vec![self.fps()]
    }

    /// Switch frame rate, `false` if unsupported
    fn set_fps(&mut self, _fps: u32) -> bool {
        false
    }

    /// Ambient light, [`INVALID_LUX`] if the device cannot measure it
    fn lux(&self) -> f32 {
        INVALID_LUX
    }
}

/// Opens a [`FrameSource`] for each tracking session.
pub trait FrameSourceFactory: Send + Sync {
    /// Open the device with the requested mode
    ///
    /// # Errors
    ///
    /// Returns an error if the device is missing or busy.
    fn open(&self, config: &CameraConfiguration) -> Result<Box<dyn FrameSource>>;
}

impl<F> FrameSourceFactory for F
where
    F: Fn(&CameraConfiguration) -> Result<Box<dyn FrameSource>> + Send + Sync,
{
    fn open(&self, config: &CameraConfiguration) -> Result<Box<dyn FrameSource>> {
        self(config)
    }
}

#[derive(Default)]
struct CaptureState {
    running: AtomicBool,
    enable_lux: AtomicBool,
    fps: AtomicU32,
    requested_fps: AtomicU32,
    lux: AtomicU32,
}

/// Camera with a dedicated capture thread
pub struct PlatformCamera {
    listener: Arc<dyn CameraListener>,
    source: Option<Box<dyn FrameSource>>,
    worker: Option<JoinHandle<Box<dyn FrameSource>>>,
    state: Arc<CaptureState>,
    supported_fps: Vec<u32>,
}

impl PlatformCamera {
    /// Wrap `source`, applying the requested frame rate if the source supports it
    #[must_use]
    pub fn new(
        listener: Arc<dyn CameraListener>,
        mut source: Box<dyn FrameSource>,
        config: &CameraConfiguration,
    ) -> Self {
        let supported_fps = source.supported_fps();
        if config.fps != 0 && !source.set_fps(config.fps) {
            warn!("Camera does not support {} fps, keeping {}", config.fps, source.fps());
        }
        let state = Arc::new(CaptureState::default());
        state.fps.store(source.fps(), Ordering::Relaxed);
        state.lux.store(INVALID_LUX.to_bits(), Ordering::Relaxed);
        Self { listener, source: Some(source), worker: None, state, supported_fps }
    }

    /// Whether the capture thread is running
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }
}

fn capture_loop(
    mut source: Box<dyn FrameSource>,
    listener: &dyn CameraListener,
    state: &CaptureState,
) -> Box<dyn FrameSource> {
    let mut intrinsics = source.intrinsics();
    listener.on_camera_intrinsics_change(&intrinsics);

    while state.running.load(Ordering::Acquire) {
        let requested = state.requested_fps.swap(0, Ordering::AcqRel);
        if requested != 0 {
            if source.set_fps(requested) {
                state.fps.store(requested, Ordering::Relaxed);
                info!("Camera switched to {requested} fps");
            } else {
                warn!("Camera rejected {requested} fps");
            }
        }

        match source.next_frame() {
            Ok(Some(frame)) => {
                let current = source.intrinsics();
                if current != intrinsics {
                    intrinsics = current;
                    listener.on_camera_intrinsics_change(&intrinsics);
                }
                let lux = if state.enable_lux.load(Ordering::Relaxed) { source.lux() } else { INVALID_LUX };
                state.lux.store(lux.to_bits(), Ordering::Relaxed);
                listener.on_camera_frame_available(frame.as_ref(), lux);
            }
            Ok(None) => {
                info!("Camera stream ended");
                break;
            }
            Err(e) => {
                error!("Camera capture failed: {e}");
                listener.on_camera_error(&e);
                break;
            }
        }
    }

    state.running.store(false, Ordering::Release);
    source
}

impl Camera for PlatformCamera {
    fn start_capture(&mut self, config: &CameraCaptureConfiguration) -> Result<()> {
        let source = self
            .source
            .take()
            .ok_or_else(|| Error::InvalidState("Camera capture already started".to_string()))?;

        self.state.enable_lux.store(config.enable_lux, Ordering::Relaxed);
        self.state.running.store(true, Ordering::Release);

        let listener = Arc::clone(&self.listener);
        let state = Arc::clone(&self.state);
        let worker = thread::Builder::new()
            .name("head-tracking-camera".to_string())
            .spawn(move || capture_loop(source, listener.as_ref(), &state))
            .map_err(|e| Error::Camera(format!("Failed to spawn capture thread: {e}")))?;

        debug!("Camera capture thread started");
        self.worker = Some(worker);
        Ok(())
    }

    fn stop_capture(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.state.running.store(false, Ordering::Release);
        match worker.join() {
            Ok(source) => self.source = Some(source),
            Err(_) => error!("Camera capture thread panicked"),
        }
        debug!("Camera capture thread stopped");
    }

    fn fps(&self) -> u32 {
        self.state.fps.load(Ordering::Relaxed)
    }

    fn set_fps(&mut self, fps: u32) -> bool {
        if !self.supported_fps.contains(&fps) {
            return false;
        }
        match self.source.as_mut() {
            Some(source) => {
                let applied = source.set_fps(fps);
                if applied {
                    self.state.fps.store(fps, Ordering::Relaxed);
                }
                applied
            }
            None => {
                self.state.requested_fps.store(fps, Ordering::Release);
                true
            }
        }
    }

    fn supported_fps(&self) -> Vec<u32> {
        self.supported_fps.clone()
    }

    fn lux(&self) -> f32 {
        f32::from_bits(self.state.lux.load(Ordering::Relaxed))
    }
}

impl Drop for PlatformCamera {
    fn drop(&mut self) {
        self.stop_capture();
    }
}
