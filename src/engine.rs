//! Tracking engine: owns the camera, face detector and face tracker of a
//! tracking session and runs them on every camera frame.
//!
//! Frames are processed on the camera's thread (the host's thread for a
//! [`SharedCameraSink`]). Configuration setters may be called from any thread;
//! they validate, store the new value and mark it dirty. Dirty parts are
//! applied at the start of the next processed frame, so a frame never sees a
//! half-applied configuration.

use log::{debug, error, info, warn};
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::abi::AbiTrackingResult;
use crate::acceleration::AccelerationMonitor;
use crate::camera::platform::{FrameSourceFactory, PlatformCamera};
use crate::camera::shared::{SharedCamera, SharedCameraSink};
use crate::camera::{
    Camera, CameraCaptureConfiguration, CameraConfiguration, CameraFrame, CameraListener, INVALID_LUX,
};
use crate::constants::{MAX_NUM_FACES, NS_PER_MS};
use crate::double_buffer::PublishedBuffer;
use crate::face_detector::{FaceDetector, FaceDetectorConfiguration, FaceDetectorFactory, FaceDetectorOutput};
use crate::face_tracker::{FaceTracker, FaceTrackerConfiguration, FilterProperties};
use crate::frame_adapter::{Frame, FrameAdapter, FrameProfiling};
use crate::light_filter::{LightFilter, LightFilterConfiguration};
use crate::platform::{Platform, SystemPlatform};
use crate::types::{
    CameraIntrinsics, DetectedFace, Face, FaceDetectorConfig, Imu, RawFace, SingleFaceConfiguration, Timestamp,
    TimestampSpace,
};
use crate::virtual_face::{VirtualFaceHook, VirtualFaceInjector};
use crate::{Error, Result};

/// Everything the engine can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    /// Face tracker
    pub face_tracker: FaceTrackerConfiguration,
    /// Face detector
    pub face_detector: FaceDetectorConfiguration,
    /// Camera mode
    pub camera: CameraConfiguration,
    /// Ambient light gating
    pub light_filter: LightFilterConfiguration,
    /// Fill frame profiling timestamps
    pub enable_profiling: bool,
}

impl EngineConfiguration {
    /// Check every part
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn validate(&self) -> Result<()> {
        self.face_tracker.validate()?;
        self.light_filter.validate()
    }
}

/// Where frames come from
#[derive(Clone)]
pub enum CameraSource {
    /// The host pushes images into the sink
    Shared(Arc<SharedCameraSink>),
    /// A capture thread pulls frames from a source opened on every start
    Platform(Arc<dyn FrameSourceFactory>),
}

/// Tracking session notifications, delivered on the processing thread
pub trait TrackingStateListener: Send + Sync {
    /// Tracking started (first frame processed) or stopped
    fn on_tracking_status_update(&self, _is_started: bool) {}

    /// Tracking failed; frames are ignored until tracking is restarted
    fn on_fatal_error(&self, _error: &Error) {}
}

/// Called after each processed frame, on the processing thread
pub type EngineFrameCallback = Box<dyn Fn(&FaceTracker, &FaceDetectorOutput, &dyn CameraFrame) + Send + Sync>;

/// Engine construction parameters
pub struct EngineInitArgs {
    /// Initial configuration
    pub configuration: EngineConfiguration,
    /// Time source
    pub platform: Arc<dyn Platform>,
    /// Camera used by tracking sessions
    pub camera: CameraSource,
    /// Creates face detectors
    pub face_detector_factory: Arc<dyn FaceDetectorFactory>,
    /// Raw per-frame callback
    pub frame_callback: Option<EngineFrameCallback>,
    /// Frame delivery to callbacks and pollers
    pub frame_adapter: Option<Arc<FrameAdapter>>,
    /// Virtual face injection
    pub virtual_face_hook: Option<Box<dyn VirtualFaceHook>>,
    /// Session notifications
    pub tracking_state_listener: Option<Arc<dyn TrackingStateListener>>,
}

impl EngineInitArgs {
    /// Arguments with the default configuration and the system clock
    #[must_use]
    pub fn new(camera: CameraSource, face_detector_factory: Arc<dyn FaceDetectorFactory>) -> Self {
        Self {
            configuration: EngineConfiguration::default(),
            platform: Arc::new(SystemPlatform),
            camera,
            face_detector_factory,
            frame_callback: None,
            frame_adapter: None,
            virtual_face_hook: None,
            tracking_state_listener: None,
        }
    }
}

mod dirty {
    pub const FACE_TRACKER: u32 = 1 << 0;
    pub const MAX_NUM_OF_FACES: u32 = 1 << 1;
    pub const FACE_DETECTOR: u32 = 1 << 2;
    pub const LIGHT_FILTER: u32 = 1 << 3;
    pub const ALL: u32 = !0;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn effective_max_faces(requested: u32, limit: u32) -> usize {
    let count = if requested == 0 { limit } else { requested.min(limit) };
    usize::try_from(count).unwrap_or(MAX_NUM_FACES)
}

// Per-session processing state, touched only by the processing thread and start/stop
struct Pipeline {
    tracker: Option<FaceTracker>,
    detector: Option<Box<dyn FaceDetector>>,
    light_filter: LightFilter,
    injector: Option<VirtualFaceInjector>,
    intrinsics: Option<CameraIntrinsics>,
    intrinsics_dirty: bool,
    max_num_of_faces: usize,
    failed: bool,
    notify_tracking_start: bool,
}

impl Pipeline {
    fn end_session(&mut self) {
        self.tracker = None;
        self.detector = None;
        self.intrinsics = None;
        self.intrinsics_dirty = false;
    }
}

// View of a processed frame handed to the frame adapter
struct EngineFrame<'a> {
    tracker: &'a FaceTracker,
    output: &'a FaceDetectorOutput,
    imu: Imu,
    profiling: FrameProfiling,
}

impl Frame for EngineFrame<'_> {
    fn faces(&self) -> &[Face] {
        self.tracker.faces()
    }

    fn timestamp(&self) -> Timestamp {
        self.tracker.timestamp()
    }

    fn jump_flag(&self) -> bool {
        self.tracker.jump_flag()
    }

    fn imu(&self) -> Imu {
        self.imu
    }

    fn raw_faces(&self) -> &[RawFace] {
        self.tracker.raw_faces()
    }

    fn detected_faces(&self) -> &[DetectedFace] {
        &self.output.faces
    }

    fn profiling(&self) -> FrameProfiling {
        self.profiling
    }
}

struct EngineShared {
    platform: Arc<dyn Platform>,
    factory: Arc<dyn FaceDetectorFactory>,
    frame_callback: Option<EngineFrameCallback>,
    frame_adapter: Option<Arc<FrameAdapter>>,
    state_listener: Option<Arc<dyn TrackingStateListener>>,

    config: Mutex<EngineConfiguration>,
    dirty_bits: AtomicU32,
    pipeline: Mutex<Pipeline>,

    acceleration: AccelerationMonitor,
    tracking_result: PublishedBuffer<AbiTrackingResult>,
    tracking_started: AtomicBool,
    max_faces_limit: AtomicU32,
}

impl EngineShared {
    fn now_ns(&self) -> i64 {
        i64::try_from(self.platform.system_time_ns()).unwrap_or(i64::MAX)
    }

    fn mark_dirty(&self, bits: u32) {
        self.dirty_bits.fetch_or(bits, Ordering::AcqRel);
    }

    fn create_detector(&self, config: &FaceDetectorConfiguration) -> Result<Box<dyn FaceDetector>> {
        let detector = self.factory.create(config)?;
        self.max_faces_limit.store(detector.max_num_of_faces_limit(), Ordering::Relaxed);
        info!(
            "Face detector created: backend {}, up to {} faces",
            detector.config().backend.as_str(),
            detector.max_num_of_faces_limit()
        );
        Ok(detector)
    }

    fn report_fatal(&self, pipeline: &mut Pipeline, error: &Error) {
        if pipeline.failed {
            return;
        }
        pipeline.failed = true;
        error!("Tracking failed: {error}");
        if let Some(listener) = &self.state_listener {
            listener.on_fatal_error(error);
        }
    }

    fn apply_pending_changes(&self, pipeline: &mut Pipeline) -> Result<()> {
        let (bits, config) = {
            let config = lock(&self.config);
            (self.dirty_bits.swap(0, Ordering::AcqRel), *config)
        };

        if bits & dirty::FACE_DETECTOR != 0 {
            pipeline.detector = Some(self.create_detector(&config.face_detector)?);
            pipeline.intrinsics_dirty = pipeline.intrinsics.is_some();
        }
        let Some(tracker) = pipeline.tracker.as_mut() else {
            return Err(Error::InvalidState("frame processed without a tracking session".to_string()));
        };

        if bits & (dirty::MAX_NUM_OF_FACES | dirty::FACE_DETECTOR) != 0 {
            let limit = self.max_faces_limit.load(Ordering::Relaxed);
            pipeline.max_num_of_faces = effective_max_faces(config.face_detector.max_num_of_faces, limit);
            tracker.on_max_num_of_detected_faces_change(pipeline.max_num_of_faces);
        }
        if bits & dirty::FACE_TRACKER != 0 {
            tracker.update_configuration(&config.face_tracker)?;
        }
        if bits & dirty::LIGHT_FILTER != 0 {
            pipeline.light_filter.set_configuration(config.light_filter)?;
        }

        if pipeline.intrinsics_dirty {
            if let Some(intrinsics) = pipeline.intrinsics {
                tracker.camera_did_change(&intrinsics);
                if let Some(detector) = pipeline.detector.as_mut() {
                    detector.camera_did_change(&intrinsics);
                }
            }
            pipeline.intrinsics_dirty = false;
        }
        Ok(())
    }

    fn process_frame(&self, frame: &dyn CameraFrame, lux: f32) {
        if !self.tracking_started.load(Ordering::Acquire) {
            return;
        }
        let mut pipeline = lock(&self.pipeline);
        if pipeline.failed || pipeline.tracker.is_none() {
            return;
        }
        if let Err(e) = self.run_pipeline(&mut pipeline, frame, lux) {
            self.report_fatal(&mut pipeline, &e);
            return;
        }
        if pipeline.notify_tracking_start {
            pipeline.notify_tracking_start = false;
            if let Some(listener) = &self.state_listener {
                listener.on_tracking_status_update(true);
            }
        }
    }

    fn run_pipeline(&self, pipeline: &mut Pipeline, frame: &dyn CameraFrame, lux: f32) -> Result<()> {
        self.apply_pending_changes(pipeline)?;

        let Pipeline {
            tracker: Some(tracker),
            detector: Some(detector),
            light_filter,
            injector,
            max_num_of_faces,
            ..
        } = pipeline
        else {
            return Err(Error::InvalidState("tracking session is missing a tracker or detector".to_string()));
        };
        if tracker.camera_intrinsics().is_none() {
            warn!("Dropping frame: camera intrinsics are not known yet");
            return Ok(());
        }

        let profiling_enabled = lock(&self.config).enable_profiling;
        let mut profiling = FrameProfiling::default();
        let timestamp = frame.timestamp();
        if profiling_enabled && timestamp.space == TimestampSpace::System {
            #[allow(clippy::cast_possible_truncation)]
            let exposure = (timestamp.ms * NS_PER_MS) as i64;
            profiling.camera_exposure_time = exposure;
        }

        let mut output = if light_filter.should_detect_faces(lux) {
            if profiling_enabled {
                profiling.face_detector_start_time = self.now_ns();
            }
            let output = detector.detect_faces(frame)?;
            if profiling_enabled {
                profiling.face_detector_end_time = self.now_ns();
            }
            output
        } else {
            debug!("Face detection skipped at {lux} lux");
            FaceDetectorOutput::default()
        };
        output.faces.truncate(*max_num_of_faces);
        if light_filter.should_drop_faces(lux, &output) {
            output.faces.clear();
        }
        if let Some(injector) = injector.as_mut() {
            injector.apply(frame, &mut output, *max_num_of_faces);
        }

        let acceleration = self.acceleration.take_frame_acceleration();
        tracker.update(Some(detector.as_mut()), &output, frame, acceleration)?;

        if let Some(callback) = &self.frame_callback {
            callback(&*tracker, &output, frame);
        }
        if profiling_enabled {
            profiling.api_timestamp = self.now_ns();
        }
        let engine_frame = EngineFrame { tracker: &*tracker, output: &output, imu: Imu { acceleration }, profiling };
        self.tracking_result.publish(AbiTrackingResult::from_frame(&engine_frame));
        if let Some(adapter) = &self.frame_adapter {
            adapter.on_frame(&engine_frame);
        }
        Ok(())
    }
}

impl CameraListener for EngineShared {
    fn on_camera_frame_available(&self, frame: &dyn CameraFrame, lux: f32) {
        self.process_frame(frame, lux);
    }

    fn on_camera_intrinsics_change(&self, intrinsics: &CameraIntrinsics) {
        info!(
            "Camera intrinsics: {}x{}, f=({}, {}), mirrored={}",
            intrinsics.width, intrinsics.height, intrinsics.fx, intrinsics.fy, intrinsics.is_mirrored
        );
        let mut pipeline = lock(&self.pipeline);
        pipeline.intrinsics = Some(*intrinsics);
        pipeline.intrinsics_dirty = true;
    }

    fn on_camera_error(&self, error: &Error) {
        let mut pipeline = lock(&self.pipeline);
        self.report_fatal(&mut pipeline, error);
    }
}

/// Head tracking engine
pub struct Engine {
    shared: Arc<EngineShared>,
    camera_source: CameraSource,
    // Stopped before the tracker and detector are released
    camera: Mutex<Option<Box<dyn Camera>>>,
}

impl Engine {
    /// Create an idle engine
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the configuration is invalid
    /// or requests a face detector backend the factory cannot create.
    pub fn new(args: EngineInitArgs) -> Result<Self> {
        args.configuration.validate()?;
        let backend = args.configuration.face_detector.backend;
        if !args.face_detector_factory.supports(backend) {
            return Err(Error::InvalidConfiguration(format!(
                "face detector backend {} is not supported",
                backend.as_str()
            )));
        }

        let light_filter = LightFilter::new(args.configuration.light_filter)?;
        let pipeline = Pipeline {
            tracker: None,
            detector: None,
            light_filter,
            injector: args.virtual_face_hook.map(VirtualFaceInjector::new),
            intrinsics: None,
            intrinsics_dirty: false,
            max_num_of_faces: MAX_NUM_FACES,
            failed: false,
            notify_tracking_start: false,
        };

        let shared = EngineShared {
            platform: args.platform,
            factory: args.face_detector_factory,
            frame_callback: args.frame_callback,
            frame_adapter: args.frame_adapter,
            state_listener: args.tracking_state_listener,
            config: Mutex::new(args.configuration),
            dirty_bits: AtomicU32::new(dirty::ALL),
            pipeline: Mutex::new(pipeline),
            acceleration: AccelerationMonitor::new(),
            tracking_result: PublishedBuffer::new(AbiTrackingResult::default()),
            tracking_started: AtomicBool::new(false),
            max_faces_limit: AtomicU32::new(u32::try_from(MAX_NUM_FACES).unwrap_or(u32::MAX)),
        };

        Ok(Self { shared: Arc::new(shared), camera_source: args.camera, camera: Mutex::new(None) })
    }

    /// Create the face detector and camera and start processing frames.
    /// Does nothing if tracking is already running.
    ///
    /// # Errors
    ///
    /// Returns an error if the detector or camera cannot be created or capture
    /// fails to start; the engine stays idle.
    pub fn start_tracking(&self) -> Result<()> {
        let mut camera_slot = lock(&self.camera);
        if camera_slot.is_some() {
            debug!("Tracking already started");
            return Ok(());
        }

        // Everything but the detector, which is created below from the current configuration
        self.shared.dirty_bits.store(dirty::ALL & !dirty::FACE_DETECTOR, Ordering::Release);
        let config = *lock(&self.shared.config);
        let detector = self.shared.create_detector(&config.face_detector)?;
        {
            let mut pipeline = lock(&self.shared.pipeline);
            pipeline.tracker = Some(FaceTracker::with_platform(Arc::clone(&self.shared.platform)));
            pipeline.detector = Some(detector);
            pipeline.intrinsics = None;
            pipeline.intrinsics_dirty = false;
            pipeline.failed = false;
            pipeline.notify_tracking_start = true;
        }
        self.shared.acceleration.reset();

        let listener: Arc<dyn CameraListener> = self.shared.clone();
        let mut camera: Box<dyn Camera> = match &self.camera_source {
            CameraSource::Shared(sink) => Box::new(SharedCamera::new(listener, Arc::clone(sink))),
            CameraSource::Platform(factory) => match factory.open(&config.camera) {
                Ok(source) => Box::new(PlatformCamera::new(listener, source, &config.camera)),
                Err(e) => {
                    lock(&self.shared.pipeline).end_session();
                    return Err(e);
                }
            },
        };

        self.shared.tracking_started.store(true, Ordering::Release);
        let capture = CameraCaptureConfiguration { enable_lux: config.light_filter.enable };
        if let Err(e) = camera.start_capture(&capture) {
            self.shared.tracking_started.store(false, Ordering::Release);
            lock(&self.shared.pipeline).end_session();
            return Err(e);
        }

        info!("Tracking started");
        *camera_slot = Some(camera);
        Ok(())
    }

    /// Stop the camera and release the session. Blocks until the frame being
    /// processed, if any, is done. Returns `false` if tracking was not running.
    ///
    /// Must not be called from a frame callback.
    pub fn stop_tracking(&self) -> bool {
        let Some(mut camera) = lock(&self.camera).take() else {
            return false;
        };
        self.shared.tracking_started.store(false, Ordering::Release);
        camera.stop_capture();
        drop(camera);

        lock(&self.shared.pipeline).end_session();
        info!("Tracking stopped");
        if let Some(listener) = &self.shared.state_listener {
            listener.on_tracking_status_update(false);
        }
        true
    }

    /// Whether a tracking session is running
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        lock(&self.camera).is_some()
    }

    /// Current configuration, including changes not yet applied to a frame
    #[must_use]
    pub fn configuration(&self) -> EngineConfiguration {
        *lock(&self.shared.config)
    }

    fn update_tracker_config(&self, change: impl FnOnce(&mut FaceTrackerConfiguration)) -> Result<()> {
        let mut config = lock(&self.shared.config);
        let mut tracker_config = config.face_tracker;
        change(&mut tracker_config);
        if let Err(e) = tracker_config.validate() {
            warn!("Face tracker configuration rejected: {e}");
            return Err(e);
        }
        config.face_tracker = tracker_config;
        self.shared.mark_dirty(dirty::FACE_TRACKER);
        Ok(())
    }

    /// Choose the eyes that make up the tracking point
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if neither eye is tracked.
    pub fn set_tracked_eyes(&self, left: bool, right: bool) -> Result<()> {
        self.update_tracker_config(|config| {
            config.track_left_eye = left;
            config.track_right_eye = right;
        })
    }

    /// Configure single-face mode
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the distance threshold is not positive.
    pub fn set_single_face_config(&self, single_face: SingleFaceConfiguration) -> Result<()> {
        self.update_tracker_config(|config| config.single_face = single_face)
    }

    /// Place the camera: `position` in mm, `rotation` as Euler angles (roll, pitch, yaw) in radians
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if a value is not finite.
    pub fn set_camera_transform(&self, position: Vector3<f32>, rotation: Vector3<f32>) -> Result<()> {
        let rotation = Rotation3::from_euler_angles(rotation.x, rotation.y, rotation.z).into_inner();
        self.update_tracker_config(|config| {
            config.camera_position = position;
            config.camera_rotation = rotation;
        })
    }

    /// Override the camera position, mm
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if a value is not finite.
    pub fn set_camera_position(&self, position: Vector3<f32>) -> Result<()> {
        self.update_tracker_config(|config| config.camera_position = position)
    }

    /// Override the camera rotation with a row-major 3x3 matrix
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if a value is not finite.
    pub fn set_camera_rotation(&self, rows: [f32; 9]) -> Result<()> {
        let rotation = Matrix3::from_row_slice(&rows);
        self.update_tracker_config(|config| config.camera_rotation = rotation)
    }

    /// Replace the matching and filtering tuning
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if a bound is unusable.
    pub fn set_filter_properties(&self, properties: FilterProperties) -> Result<()> {
        self.update_tracker_config(|config| config.filter_properties = properties)
    }

    /// Set the primary face depth low-pass alpha
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if alpha is not in (0, 1].
    pub fn set_head_pose_z_low_pass_filter_alpha(&self, alpha: f32) -> Result<()> {
        self.update_tracker_config(|config| config.head_pose_z_low_pass_alpha = alpha)
    }

    /// Primary face depth low-pass alpha
    #[must_use]
    pub fn head_pose_z_low_pass_filter_alpha(&self) -> f32 {
        lock(&self.shared.config).face_tracker.head_pose_z_low_pass_alpha
    }

    /// Most faces the face detector can report per frame
    #[must_use]
    pub fn max_num_of_detected_faces_limit(&self) -> u32 {
        self.shared.max_faces_limit.load(Ordering::Relaxed)
    }

    /// Number of faces to track, 0 for the detector limit
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `count` exceeds the detector limit.
    pub fn set_max_num_of_detected_faces(&self, count: u32) -> Result<()> {
        let limit = self.max_num_of_detected_faces_limit();
        if count > limit {
            return Err(Error::InvalidInput(format!("{count} faces requested, the detector supports {limit}")));
        }
        lock(&self.shared.config).face_detector.max_num_of_faces = count;
        self.shared.mark_dirty(dirty::MAX_NUM_OF_FACES);
        Ok(())
    }

    /// Switch face detector backend; a running session recreates its detector
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the backend is not supported.
    pub fn set_face_detector_config(&self, detector_config: FaceDetectorConfig) -> Result<()> {
        if !self.shared.factory.supports(detector_config.backend) {
            warn!("Face detector backend {} is not supported", detector_config.backend.as_str());
            return Err(Error::InvalidConfiguration(format!(
                "face detector backend {} is not supported",
                detector_config.backend.as_str()
            )));
        }
        let mut config = lock(&self.shared.config);
        if config.face_detector.public_config() == detector_config {
            return Ok(());
        }
        config.face_detector.backend = detector_config.backend;
        config.face_detector.input_type = detector_config.input_type;
        self.shared.mark_dirty(dirty::FACE_DETECTOR);
        Ok(())
    }

    /// Requested face detector backend and input type
    #[must_use]
    pub fn face_detector_config(&self) -> FaceDetectorConfig {
        lock(&self.shared.config).face_detector.public_config()
    }

    /// Frame rates of the running camera, empty when idle
    #[must_use]
    pub fn supported_camera_fps(&self) -> Vec<u32> {
        lock(&self.camera).as_ref().map(|camera| camera.supported_fps()).unwrap_or_default()
    }

    /// Request a frame rate; applied now when tracking, otherwise on the next start
    pub fn set_camera_fps(&self, fps: u32) -> bool {
        let mut camera = lock(&self.camera);
        let applied = camera.as_mut().map_or(true, |camera| camera.set_fps(fps));
        if applied {
            lock(&self.shared.config).camera.fps = fps;
        }
        applied
    }

    /// Frame rate of the running camera, the requested rate when idle
    #[must_use]
    pub fn camera_fps(&self) -> u32 {
        match lock(&self.camera).as_ref() {
            Some(camera) => camera.fps(),
            None => lock(&self.shared.config).camera.fps,
        }
    }

    /// Fill frame profiling timestamps
    pub fn set_profiling(&self, enable: bool) {
        lock(&self.shared.config).enable_profiling = enable;
    }

    /// Ambient light of the running camera, [`INVALID_LUX`] when unavailable
    #[must_use]
    pub fn lux(&self) -> f32 {
        lock(&self.camera).as_ref().map_or(INVALID_LUX, |camera| camera.lux())
    }

    /// Light filter thresholds
    #[must_use]
    pub fn light_filter_configuration(&self) -> LightFilterConfiguration {
        lock(&self.shared.config).light_filter
    }

    /// Replace the light filter thresholds
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the thresholds are inverted.
    pub fn set_light_filter_configuration(&self, light_filter: LightFilterConfiguration) -> Result<()> {
        light_filter.validate()?;
        lock(&self.shared.config).light_filter = light_filter;
        self.shared.mark_dirty(dirty::LIGHT_FILTER);
        Ok(())
    }

    /// Record a device linear-acceleration sample; any thread
    pub fn push_device_acceleration(&self, acceleration: Vector3<f32>) {
        self.shared.acceleration.push(acceleration);
    }

    /// Latest tracking result; lock-free with respect to frame processing
    #[must_use]
    pub fn tracking_result(&self) -> AbiTrackingResult {
        self.shared.tracking_result.read()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_tracking();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_max_faces() {
        assert_eq!(effective_max_faces(0, 3), 3);
        assert_eq!(effective_max_faces(1, 3), 1);
        assert_eq!(effective_max_faces(5, 3), 3);
    }

    #[test]
    fn test_dirty_bits_are_distinct() {
        let bits = [dirty::FACE_TRACKER, dirty::MAX_NUM_OF_FACES, dirty::FACE_DETECTOR, dirty::LIGHT_FILTER];
        let combined = bits.iter().fold(0, |acc, bit| {
            assert_eq!(acc & bit, 0);
            acc | bit
        });
        assert_eq!(combined & dirty::ALL, combined);
    }
}
