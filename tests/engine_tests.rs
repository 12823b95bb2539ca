//! Engine sessions driven through a shared camera sink


use head_tracking::camera::shared::SharedCameraSink;
use head_tracking::camera::CameraFrame;
use head_tracking::engine::{CameraSource, Engine, EngineFrameCallback, EngineInitArgs, TrackingStateListener};
use head_tracking::face_detector::{FaceDetector, FaceDetectorConfiguration, FaceDetectorFactory, FaceDetectorOutput};
use head_tracking::face_tracker::FaceTracker;
use head_tracking::frame_adapter::FrameAdapter;
use head_tracking::light_filter::LightFilterConfiguration;
use head_tracking::simulation::{Scene, SceneConfiguration, SceneFaceDetectorFactory, SimulatedHead};
use head_tracking::types::{
    CameraIntrinsics, FaceDetectorBackend, FaceDetectorConfig, ImageDesc, Point, Timestamp,
};
use head_tracking::virtual_face::{VirtualFace, VirtualFaceHookContext};
use head_tracking::{Error, Result};
use nalgebra::Vector3;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use test_helpers::{assert_point_near, ManualClock, HEIGHT, WIDTH};

const FRAME_MS: f64 = 33.0;

#[derive(Default)]
struct RecordingListener {
    updates: Mutex<Vec<bool>>,
    fatal_errors: AtomicUsize,
}

impl TrackingStateListener for RecordingListener {
    fn on_tracking_status_update(&self, is_started: bool) {
        self.updates.lock().unwrap().push(is_started);
    }

    fn on_fatal_error(&self, _error: &Error) {
        self.fatal_errors.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    scene: Arc<Scene>,
    sink: Arc<SharedCameraSink>,
    listener: Arc<RecordingListener>,
}

impl Fixture {
    fn new(heads: Vec<SimulatedHead>) -> Self {
        let config = SceneConfiguration { heads, real_time: false, ..SceneConfiguration::default() };
        Self {
            scene: Arc::new(Scene::new(config).unwrap()),
            sink: Arc::new(SharedCameraSink::new()),
            listener: Arc::new(RecordingListener::default()),
        }
    }

    fn args(&self) -> EngineInitArgs {
        let mut args = EngineInitArgs::new(
            CameraSource::Shared(Arc::clone(&self.sink)),
            Arc::new(SceneFaceDetectorFactory::new(Arc::clone(&self.scene))),
        );
        args.tracking_state_listener = Some(self.listener.clone());
        args
    }

    fn engine(&self) -> Engine {
        Engine::new(self.args()).unwrap()
    }

    fn push_frames(&self, first: u32, count: u32) {
        for i in first..first + count {
            let timestamp = Timestamp::system(f64::from(i) * FRAME_MS);
            let pushed = self.sink.push_image(ImageDesc::empty(WIDTH, HEIGHT), timestamp);
            assert!(pushed);
        }
    }
}

fn head_at(x: f32, y: f32, z: f32) -> SimulatedHead {
    SimulatedHead { position: [x, y, z], ..SimulatedHead::default() }
}

#[test]
fn test_shared_camera_session() {
    let fixture = Fixture::new(vec![head_at(20.0, -10.0, 650.0)]);
    let engine = fixture.engine();
    assert!(!fixture.sink.push_image(ImageDesc::empty(WIDTH, HEIGHT), Timestamp::system(0.0)));

    engine.start_tracking().unwrap();
    assert!(engine.is_tracking());
    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    fixture.push_frames(0, 10);

    let result = engine.tracking_result();
    let faces = result.valid_faces();
    assert_eq!(faces.len(), 1);
    let pos: Vector3<f32> = faces[0].point.pos.into();
    assert_point_near(pos, Point::new(20.0, -10.0, 650.0), 0.05);
    let timestamp = result.timestamp;
    let ms = timestamp.ms;
    assert_eq!(ms, 9.0 * FRAME_MS);

    assert!(engine.stop_tracking());
    assert!(!engine.stop_tracking());
    assert!(!fixture.sink.is_attached());
    assert_eq!(*fixture.listener.updates.lock().unwrap(), vec![true, false]);
}

#[test]
fn test_intrinsics_set_before_start_are_replayed() {
    let fixture = Fixture::new(vec![head_at(0.0, 0.0, 600.0)]);
    let engine = fixture.engine();
    fixture.sink.set_intrinsics(fixture.scene.intrinsics());

    engine.start_tracking().unwrap();
    fixture.push_frames(0, 3);
    let num_faces = engine.tracking_result().num_faces;
    assert_eq!(num_faces, 1);
}

#[test]
fn test_restart_starts_a_fresh_session() {
    let fixture = Fixture::new(vec![head_at(0.0, 0.0, 600.0)]);
    let engine = fixture.engine();
    fixture.sink.set_intrinsics(fixture.scene.intrinsics());

    engine.start_tracking().unwrap();
    fixture.push_frames(0, 5);
    engine.stop_tracking();

    // Timestamps restart with the new session
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 2);
    let timestamp = engine.tracking_result().timestamp;
    let ms = timestamp.ms;
    assert_eq!(ms, FRAME_MS);
}

#[test]
fn test_polling_frame_adapter_sees_every_stage() {
    let fixture = Fixture::new(vec![head_at(0.0, 0.0, 600.0), head_at(200.0, 0.0, 700.0)]);
    let adapter = Arc::new(FrameAdapter::new(None, true));
    let mut args = fixture.args();
    args.frame_adapter = Some(Arc::clone(&adapter));
    let engine = Engine::new(args).unwrap();

    assert!(adapter.get_frame().unwrap().is_none());
    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 4);

    let frame = adapter.get_frame().unwrap().unwrap();
    assert_eq!(frame.faces.len(), 2);
    assert_eq!(frame.raw_faces.len(), 2);
    assert_eq!(frame.detected_faces.len(), 2);
    assert_eq!(frame.timestamp.ms, 3.0 * FRAME_MS);
    assert!(!frame.jump_flag);
}

#[test]
fn test_frame_callback_gets_tracker_state() {
    let fixture = Fixture::new(vec![head_at(0.0, 0.0, 600.0)]);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let callback: EngineFrameCallback =
        Box::new(move |tracker: &FaceTracker, output: &FaceDetectorOutput, _frame: &dyn CameraFrame| {
            assert_eq!(tracker.faces().len(), output.faces.len());
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let mut args = fixture.args();
    args.frame_callback = Some(callback);
    let engine = Engine::new(args).unwrap();

    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 6);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

struct BrokenDetector;

impl FaceDetector for BrokenDetector {
    fn max_num_of_faces_limit(&self) -> u32 {
        3
    }

    fn config(&self) -> FaceDetectorConfig {
        FaceDetectorConfig::default()
    }

    fn camera_did_change(&mut self, _intrinsics: &CameraIntrinsics) {}

    fn detect_faces(&mut self, _frame: &dyn CameraFrame) -> Result<FaceDetectorOutput> {
        Err(Error::FaceDetector("inference failed".to_string()))
    }
}

struct BrokenFactory;

impl FaceDetectorFactory for BrokenFactory {
    fn supported_backends(&self) -> u32 {
        FaceDetectorBackend::Cpu.bit()
    }

    fn create(&self, _config: &FaceDetectorConfiguration) -> Result<Box<dyn FaceDetector>> {
        Ok(Box::new(BrokenDetector))
    }
}

#[test]
fn test_detector_failure_is_reported_once_per_session() {
    let fixture = Fixture::new(Vec::new());
    let mut args = fixture.args();
    args.face_detector_factory = Arc::new(BrokenFactory);
    let engine = Engine::new(args).unwrap();

    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 5);
    assert_eq!(fixture.listener.fatal_errors.load(Ordering::SeqCst), 1);
    let num_faces = engine.tracking_result().num_faces;
    assert_eq!(num_faces, 0);

    engine.stop_tracking();
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 2);
    assert_eq!(fixture.listener.fatal_errors.load(Ordering::SeqCst), 2);
}

#[test]
fn test_invalid_settings_are_rejected() {
    let fixture = Fixture::new(Vec::new());
    let engine = fixture.engine();
    let before = engine.configuration();

    assert!(matches!(engine.set_tracked_eyes(false, false), Err(Error::InvalidConfiguration(_))));
    assert!(engine.set_head_pose_z_low_pass_filter_alpha(0.0).is_err());
    let gpu = FaceDetectorConfig { backend: FaceDetectorBackend::Gpu, ..FaceDetectorConfig::default() };
    assert!(engine.set_face_detector_config(gpu).is_err());
    assert!(matches!(engine.set_max_num_of_detected_faces(5), Err(Error::InvalidInput(_))));
    let inverted =
        LightFilterConfiguration { cutoff_lux: 800.0, check_lux: 100.0, ..LightFilterConfiguration::default() };
    assert!(engine.set_light_filter_configuration(inverted).is_err());

    assert_eq!(engine.configuration(), before);
}

#[test]
fn test_unsupported_backend_fails_construction() {
    let fixture = Fixture::new(Vec::new());
    let mut args = fixture.args();
    args.configuration.face_detector.backend = FaceDetectorBackend::Gpu;
    assert!(matches!(Engine::new(args), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn test_settings_apply_on_next_frame() {
    let fixture = Fixture::new(vec![head_at(0.0, 0.0, 600.0)]);
    let engine = fixture.engine();
    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 3);

    engine.set_camera_position(Vector3::new(0.0, 100.0, 0.0)).unwrap();
    engine.set_head_pose_z_low_pass_filter_alpha(0.5).unwrap();
    assert_eq!(engine.head_pose_z_low_pass_filter_alpha(), 0.5);
    fixture.push_frames(3, 1);

    let faces = engine.tracking_result().valid_faces();
    let pos: Vector3<f32> = faces[0].point.pos.into();
    assert_point_near(pos, Point::new(0.0, 100.0, 600.0), 0.05);
}

#[test]
fn test_max_num_of_faces_limits_output() {
    let fixture = Fixture::new(vec![head_at(-200.0, 0.0, 600.0), head_at(200.0, 0.0, 600.0)]);
    let engine = fixture.engine();
    assert_eq!(engine.max_num_of_detected_faces_limit(), 3);
    engine.set_max_num_of_detected_faces(1).unwrap();

    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 3);
    let num_faces = engine.tracking_result().num_faces;
    assert_eq!(num_faces, 1);
}

#[test]
fn test_virtual_face_replaces_detections() {
    let fixture = Fixture::new(vec![head_at(0.0, 0.0, 600.0)]);
    let mut args = fixture.args();
    args.virtual_face_hook = Some(Box::new(|context: &mut VirtualFaceHookContext| {
        context.drop_detected_faces = true;
        context.virtual_faces.push(VirtualFace::at(Point::new(50.0, 0.0, 800.0)));
        true
    }));
    let engine = Engine::new(args).unwrap();

    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 3);

    let faces = engine.tracking_result().valid_faces();
    assert_eq!(faces.len(), 1);
    let pos: Vector3<f32> = faces[0].point.pos.into();
    assert_point_near(pos, Point::new(50.0, 0.0, 800.0), 0.05);
}

#[test]
fn test_low_light_skips_detection() {
    let fixture = Fixture::new(vec![head_at(0.0, 0.0, 600.0)]);
    let mut args = fixture.args();
    args.configuration.light_filter = LightFilterConfiguration { enable: true, ..LightFilterConfiguration::default() };
    let engine = Engine::new(args).unwrap();

    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    fixture.sink.set_lux(100.0);
    engine.start_tracking().unwrap();
    assert_eq!(engine.lux(), 100.0);
    fixture.push_frames(0, 3);
    let num_faces = engine.tracking_result().num_faces;
    assert_eq!(num_faces, 0);

    fixture.sink.set_lux(1000.0);
    fixture.push_frames(3, 1);
    let num_faces = engine.tracking_result().num_faces;
    assert_eq!(num_faces, 1);
}

#[test]
fn test_device_acceleration_raises_jump_flag() {
    let fixture = Fixture::new(vec![head_at(0.0, 0.0, 600.0)]);
    let engine = fixture.engine();
    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 2);
    let jump_flag = engine.tracking_result().jump_flag;
    assert_eq!(jump_flag, 0);

    engine.push_device_acceleration(Vector3::new(0.0, 3.0, 0.0));
    fixture.push_frames(2, 1);
    let jump_flag = engine.tracking_result().jump_flag;
    assert_eq!(jump_flag, 1);
}

#[test]
fn test_profiling_uses_platform_clock() {
    let fixture = Fixture::new(vec![head_at(0.0, 0.0, 600.0)]);
    let adapter = Arc::new(FrameAdapter::new(None, true));
    let mut args = fixture.args();
    args.platform = Arc::new(ManualClock::at_ms(5.0));
    args.frame_adapter = Some(Arc::clone(&adapter));
    let engine = Engine::new(args).unwrap();

    fixture.sink.set_intrinsics(fixture.scene.intrinsics());
    engine.start_tracking().unwrap();
    fixture.push_frames(0, 1);
    let profiling = adapter.get_frame().unwrap().unwrap().profiling;
    assert_eq!(profiling.face_detector_start_time, 0);

    engine.set_profiling(true);
    fixture.push_frames(1, 1);
    let profiling = adapter.get_frame().unwrap().unwrap().profiling;
    assert_eq!(profiling.camera_exposure_time, 33_000_000);
    assert_eq!(profiling.face_detector_start_time, 5_000_000);
    assert_eq!(profiling.face_detector_end_time, 5_000_000);
    assert_eq!(profiling.api_timestamp, 5_000_000);
}

#[test]
fn test_camera_fps_while_idle() {
    let fixture = Fixture::new(Vec::new());
    let engine = fixture.engine();
    assert!(engine.supported_camera_fps().is_empty());
    assert!(engine.set_camera_fps(60));
    assert_eq!(engine.camera_fps(), 60);
    assert_eq!(engine.lux(), head_tracking::camera::INVALID_LUX);
}
