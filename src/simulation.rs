//! Synthetic scene: a pinhole camera looking at moving heads.
//!
//! [`SceneFrameSource`] produces empty frames with scene timestamps and
//! [`SceneFaceDetector`] "detects" the heads visible at that time by projecting
//! their eyes, optionally with pixel noise. Together they drive the engine
//! without a camera or an inference model.

use log::{debug, info};
use nalgebra::Vector2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::camera::platform::FrameSource;
use crate::camera::{CameraConfiguration, CameraFrame, PinholeCameraFrame};
use crate::constants::{DEFAULT_FPS, DEFAULT_INTEROCULAR_DISTANCE, MAX_NUM_FACES};
use crate::face_detector::{FaceDetector, FaceDetectorConfiguration, FaceDetectorFactory, FaceDetectorOutput};
use crate::types::{
    CameraIntrinsics, DetectedFace, Eye, FaceDetectorBackend, FaceDetectorConfig, FaceIdx, ImageDesc, Point,
    Timestamp,
};
use crate::virtual_face::VirtualFace;
use crate::{Error, Result};

/// Head moving at constant velocity, camera space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedHead {
    /// Eye midpoint at scene time 0, mm
    pub position: [f32; 3],
    /// Velocity, mm per second
    pub velocity: [f32; 3],
    /// Scene time the head enters, ms
    pub appear_ms: f64,
    /// Scene time the head leaves, ms; never when `None`
    pub disappear_ms: Option<f64>,
    /// Distance between the eyes, mm
    pub interocular_distance: f32,
}

impl Default for SimulatedHead {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 600.0],
            velocity: [0.0; 3],
            appear_ms: 0.0,
            disappear_ms: None,
            interocular_distance: DEFAULT_INTEROCULAR_DISTANCE,
        }
    }
}

impl SimulatedHead {
    /// Eye midpoint at `time_ms`, `None` when the head is not in the scene
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn position_at(&self, time_ms: f64) -> Option<Point> {
        if time_ms < self.appear_ms || self.disappear_ms.is_some_and(|end| time_ms >= end) {
            return None;
        }
        let seconds = (time_ms / 1000.0) as f32;
        Some(Point::from(self.position) + Point::from(self.velocity) * seconds)
    }
}

/// Scene camera and heads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfiguration {
    /// Image width, pixels
    pub width: i32,
    /// Image height, pixels
    pub height: i32,
    /// Focal length, pixels
    pub focal_length: f32,
    /// Mirror the image horizontally
    pub mirrored: bool,
    /// Frame rate
    pub fps: u32,
    /// Frames to produce; endless when 0
    pub num_frames: u64,
    /// Sleep so frames arrive at `fps`
    pub real_time: bool,
    /// Uniform detection noise amplitude, pixels
    pub noise_px: f64,
    /// Noise generator seed
    pub seed: u64,
    /// Heads in the scene
    pub heads: Vec<SimulatedHead>,
}

impl Default for SceneConfiguration {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            focal_length: 600.0,
            mirrored: false,
            fps: DEFAULT_FPS,
            num_frames: 0,
            real_time: true,
            noise_px: 0.0,
            seed: 0,
            heads: vec![SimulatedHead::default()],
        }
    }
}

impl SceneConfiguration {
    /// Check the camera and noise parameters
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] on an unusable value.
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(Error::InvalidConfiguration(format!(
                "scene image size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.focal_length.is_finite() && self.focal_length > 0.0) {
            return Err(Error::InvalidConfiguration("scene focal length must be positive".to_string()));
        }
        if self.fps == 0 {
            return Err(Error::InvalidConfiguration("scene fps must be positive".to_string()));
        }
        if !(self.noise_px.is_finite() && self.noise_px >= 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "scene noise must be finite and not negative, got {}",
                self.noise_px
            )));
        }
        if let Some(head) = self.heads.iter().find(|head| !(head.interocular_distance > 0.0)) {
            return Err(Error::InvalidConfiguration(format!(
                "interocular distance must be positive, got {}",
                head.interocular_distance
            )));
        }
        Ok(())
    }

    /// Time between frames, ms
    #[must_use]
    pub fn frame_period_ms(&self) -> f64 {
        1000.0 / f64::from(self.fps.max(1))
    }
}

/// Shared scene description
#[derive(Debug)]
pub struct Scene {
    config: SceneConfiguration,
}

impl Scene {
    /// Validated scene
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the configuration is unusable.
    pub fn new(config: SceneConfiguration) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Scene parameters
    #[must_use]
    pub fn config(&self) -> &SceneConfiguration {
        &self.config
    }

    /// Camera intrinsics of the scene
    #[must_use]
    pub fn intrinsics(&self) -> CameraIntrinsics {
        let mut intrinsics =
            CameraIntrinsics::centered(self.config.width, self.config.height, self.config.focal_length);
        intrinsics.is_mirrored = self.config.mirrored;
        intrinsics
    }

    /// Heads present at `time_ms` with their detector id (head index + 1)
    #[must_use]
    pub fn visible_heads(&self, time_ms: f64) -> Vec<(FaceIdx, VirtualFace)> {
        (1..)
            .zip(&self.config.heads)
            .filter_map(|(id, head)| {
                head.position_at(time_ms).map(|tracking_point| {
                    (id, VirtualFace { tracking_point, interocular_distance: head.interocular_distance })
                })
            })
            .collect()
    }
}

/// Frame source replaying the scene clock
pub struct SceneFrameSource {
    scene: Arc<Scene>,
    fps: u32,
    frame_index: u64,
    // Wall clock and scene time at the last pacing restart
    started: Option<(Instant, f64)>,
}

impl SceneFrameSource {
    /// Source starting at scene time 0
    #[must_use]
    pub fn new(scene: Arc<Scene>) -> Self {
        let fps = scene.config().fps;
        Self { scene, fps, frame_index: 0, started: None }
    }

    /// Factory closure for [`crate::engine::CameraSource::Platform`]
    pub fn factory(
        scene: Arc<Scene>,
    ) -> impl Fn(&CameraConfiguration) -> Result<Box<dyn FrameSource>> + Send + Sync {
        move |config: &CameraConfiguration| {
            let mut source = Self::new(Arc::clone(&scene));
            if config.fps != 0 {
                source.fps = config.fps;
            }
            info!("Scene camera opened at {} fps", source.fps);
            Ok(Box::new(source) as Box<dyn FrameSource>)
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn frame_time_ms(&self) -> f64 {
        self.frame_index as f64 * 1000.0 / f64::from(self.fps)
    }
}

impl FrameSource for SceneFrameSource {
    fn intrinsics(&self) -> CameraIntrinsics {
        self.scene.intrinsics()
    }

    fn next_frame(&mut self) -> Result<Option<Box<dyn CameraFrame>>> {
        let limit = self.scene.config().num_frames;
        if limit != 0 && self.frame_index >= limit {
            return Ok(None);
        }
        let time_ms = self.frame_time_ms();
        if self.scene.config().real_time {
            let (started, origin_ms) = *self.started.get_or_insert_with(|| (Instant::now(), time_ms));
            let due = started + Duration::from_secs_f64((time_ms - origin_ms).max(0.0) / 1000.0);
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
        }
        self.frame_index += 1;

        let config = self.scene.config();
        let frame = PinholeCameraFrame::new(
            ImageDesc::empty(config.width, config.height),
            Timestamp::system(time_ms),
            self.scene.intrinsics(),
        );
        Ok(Some(Box::new(frame)))
    }

    fn fps(&self) -> u32 {
        self.fps
    }

    fn supported_fps(&self) -> Vec<u32> {
        vec![15, 30, 60, 90]
    }

    fn set_fps(&mut self, fps: u32) -> bool {
        if fps == 0 {
            return false;
        }
        // Keep scene time continuous across the rate change
        let time_ms = self.frame_time_ms();
        self.fps = fps;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = (time_ms * f64::from(fps) / 1000.0).round() as u64;
        self.frame_index = index;
        self.started = None;
        true
    }
}

/// Detector reporting the scene heads visible at the frame time
pub struct SceneFaceDetector {
    scene: Arc<Scene>,
    config: FaceDetectorConfiguration,
    tracked_id: Option<FaceIdx>,
    rng: StdRng,
}

impl SceneFaceDetector {
    /// Detector with noise seeded from the scene configuration
    #[must_use]
    pub fn new(scene: Arc<Scene>, config: FaceDetectorConfiguration) -> Self {
        let rng = StdRng::seed_from_u64(scene.config().seed);
        Self { scene, config, tracked_id: None, rng }
    }

    fn jitter(&mut self, pixel: Vector2<f64>) -> Vector2<f64> {
        let amplitude = self.scene.config().noise_px;
        if amplitude == 0.0 {
            return pixel;
        }
        pixel + Vector2::new(self.rng.gen_range(-amplitude..=amplitude), self.rng.gen_range(-amplitude..=amplitude))
    }

    fn in_image(&self, pixel: &Vector2<f64>) -> bool {
        let config = self.scene.config();
        (0.0..f64::from(config.width)).contains(&pixel.x) && (0.0..f64::from(config.height)).contains(&pixel.y)
    }
}

impl FaceDetector for SceneFaceDetector {
    fn max_num_of_faces_limit(&self) -> u32 {
        u32::try_from(MAX_NUM_FACES).unwrap_or(u32::MAX)
    }

    fn config(&self) -> FaceDetectorConfig {
        let mut config = self.config.public_config();
        if config.backend == FaceDetectorBackend::Unknown {
            config.backend = FaceDetectorBackend::Cpu;
        }
        config
    }

    fn camera_did_change(&mut self, intrinsics: &CameraIntrinsics) {
        debug!("Scene detector got intrinsics {}x{}", intrinsics.width, intrinsics.height);
    }

    fn detect_faces(&mut self, frame: &dyn CameraFrame) -> Result<FaceDetectorOutput> {
        let limit = match self.config.max_num_of_faces {
            0 => MAX_NUM_FACES,
            n => usize::try_from(n).unwrap_or(MAX_NUM_FACES).min(MAX_NUM_FACES),
        };

        let mut output = FaceDetectorOutput::default();
        for (id, head) in self.scene.visible_heads(frame.timestamp().ms) {
            if self.tracked_id.is_some_and(|tracked| tracked != id) {
                continue;
            }
            let [right, left] = head.eye_points();
            let (Some((right_px, right_depth)), Some((left_px, left_depth))) =
                (frame.project_point_to_pixel(&right), frame.project_point_to_pixel(&left))
            else {
                continue;
            };
            if !self.in_image(&right_px) || !self.in_image(&left_px) {
                continue;
            }
            let eyes = [
                Eye { image_coord: self.jitter(right_px), depth: right_depth },
                Eye { image_coord: self.jitter(left_px), depth: left_depth },
            ];
            output.faces.push(DetectedFace {
                eyes,
                pose_position: head.tracking_point,
                pose_angle: Point::zeros(),
                id,
            });
            if output.faces.len() == limit {
                break;
            }
        }
        Ok(output)
    }

    fn track_single_face(&mut self, id: FaceIdx) -> bool {
        debug!("Scene detector restricted to face {id}");
        self.tracked_id = Some(id);
        true
    }
}

/// Creates [`SceneFaceDetector`]s on the CPU backend
pub struct SceneFaceDetectorFactory {
    scene: Arc<Scene>,
}

impl SceneFaceDetectorFactory {
    /// Factory over `scene`
    #[must_use]
    pub fn new(scene: Arc<Scene>) -> Self {
        Self { scene }
    }
}

impl FaceDetectorFactory for SceneFaceDetectorFactory {
    fn supported_backends(&self) -> u32 {
        FaceDetectorBackend::Cpu.bit()
    }

    fn create(&self, config: &FaceDetectorConfiguration) -> Result<Box<dyn FaceDetector>> {
        if !self.supports(config.backend) {
            return Err(Error::FaceDetector(format!("backend {} is not available", config.backend.as_str())));
        }
        Ok(Box::new(SceneFaceDetector::new(Arc::clone(&self.scene), *config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(heads: Vec<SimulatedHead>) -> Arc<Scene> {
        let config = SceneConfiguration { heads, real_time: false, ..SceneConfiguration::default() };
        Arc::new(Scene::new(config).unwrap())
    }

    #[test]
    fn test_head_visibility_window() {
        let head = SimulatedHead {
            velocity: [100.0, 0.0, 0.0],
            appear_ms: 100.0,
            disappear_ms: Some(300.0),
            ..SimulatedHead::default()
        };
        assert!(head.position_at(50.0).is_none());
        let position = head.position_at(200.0).unwrap();
        assert!((position.x - 20.0).abs() < 1e-4);
        assert!(head.position_at(300.0).is_none());
    }

    #[test]
    fn test_frames_follow_scene_clock() {
        let scene = Arc::new(
            Scene::new(SceneConfiguration { num_frames: 2, real_time: false, fps: 50, ..SceneConfiguration::default() })
                .unwrap(),
        );
        let mut source = SceneFrameSource::new(scene);
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(first.timestamp().ms, 0.0);
        assert!((second.timestamp().ms - 20.0).abs() < 1e-9);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_detector_projects_visible_heads() {
        let scene = scene(vec![
            SimulatedHead::default(),
            SimulatedHead { position: [5000.0, 0.0, 600.0], ..SimulatedHead::default() },
        ]);
        let mut detector = SceneFaceDetector::new(Arc::clone(&scene), FaceDetectorConfiguration::default());
        let frame = PinholeCameraFrame::new(ImageDesc::empty(640, 480), Timestamp::system(0.0), scene.intrinsics());

        let output = detector.detect_faces(&frame).unwrap();
        // The second head is far outside the image
        assert_eq!(output.faces.len(), 1);
        let face = &output.faces[0];
        assert_eq!(face.id, 1);
        assert!((face.eyes[0].depth - 600.0).abs() < 1e-3);
    }

    #[test]
    fn test_single_face_restriction() {
        let scene = scene(vec![
            SimulatedHead::default(),
            SimulatedHead { position: [100.0, 0.0, 700.0], ..SimulatedHead::default() },
        ]);
        let mut detector = SceneFaceDetector::new(Arc::clone(&scene), FaceDetectorConfiguration::default());
        let frame = PinholeCameraFrame::new(ImageDesc::empty(640, 480), Timestamp::system(0.0), scene.intrinsics());
        assert_eq!(detector.detect_faces(&frame).unwrap().faces.len(), 2);

        assert!(detector.track_single_face(2));
        let output = detector.detect_faces(&frame).unwrap();
        assert_eq!(output.faces.len(), 1);
        assert_eq!(output.faces[0].id, 2);
    }

    #[test]
    fn test_factory_rejects_gpu() {
        let factory = SceneFaceDetectorFactory::new(scene(Vec::new()));
        let config =
            FaceDetectorConfiguration { backend: FaceDetectorBackend::Gpu, ..FaceDetectorConfiguration::default() };
        assert!(factory.create(&config).is_err());
        assert!(factory.create(&FaceDetectorConfiguration::default()).is_ok());
    }

    #[test]
    fn test_invalid_scene() {
        let config = SceneConfiguration { fps: 0, ..SceneConfiguration::default() };
        assert!(matches!(Scene::new(config), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_non_finite_noise_is_rejected() {
        for noise_px in [f64::INFINITY, f64::NAN, -1.0] {
            let config = SceneConfiguration { noise_px, ..SceneConfiguration::default() };
            assert!(matches!(Scene::new(config), Err(Error::InvalidConfiguration(_))), "noise {noise_px}");
        }
        let config = SceneConfiguration { focal_length: f32::INFINITY, ..SceneConfiguration::default() };
        assert!(Scene::new(config).is_err());
    }
}
