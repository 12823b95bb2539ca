//! Head tracking library: turns per-frame face detections into stable,
//! filtered 3D head positions.
//!
//! The processing pipeline for each camera frame:
//! 1. A [`camera::Camera`] delivers the frame and its intrinsics
//! 2. The [`light_filter::LightFilter`] decides whether detection can be trusted
//! 3. A [`face_detector::FaceDetector`] finds eyes in the image
//! 4. Optional virtual faces are injected ([`virtual_face`])
//! 5. The [`face_tracker::FaceTracker`] deprojects, matches and filters faces
//! 6. Results are published to callbacks, pollers and the fixed-layout
//!    [`abi::AbiTrackingResult`]
//!
//! The [`engine::Engine`] owns this pipeline. Face detection models and camera
//! drivers are supplied by the host through the [`face_detector`] and
//! [`camera`] traits; [`simulation`] provides a synthetic scene for both.
//!
//! # Examples
//!
//! ## Filtering a single face
//!
//! ```no_run
//! use head_tracking::camera::PinholeCameraFrame;
//! use head_tracking::face_detector::FaceDetectorOutput;
//! use head_tracking::face_tracker::FaceTracker;
//! use head_tracking::types::{CameraIntrinsics, ImageDesc, Timestamp};
//!
//! # fn main() -> head_tracking::Result<()> {
//! let intrinsics = CameraIntrinsics::centered(640, 480, 600.0);
//! let mut tracker = FaceTracker::new();
//! tracker.camera_did_change(&intrinsics);
//!
//! let frame = PinholeCameraFrame::new(ImageDesc::empty(640, 480), Timestamp::system(0.0), intrinsics);
//! // Detector output for this frame
//! let output = FaceDetectorOutput::default();
//! tracker.update(None, &output, &frame, 0.0)?;
//!
//! for face in tracker.faces() {
//!     println!("Head at {:?}", face.point.pos);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the engine on a host-managed camera
//!
//! ```no_run
//! use std::sync::Arc;
//! use head_tracking::camera::shared::SharedCameraSink;
//! use head_tracking::engine::{CameraSource, Engine, EngineInitArgs};
//! use head_tracking::simulation::{Scene, SceneConfiguration, SceneFaceDetectorFactory};
//! use head_tracking::types::{CameraIntrinsics, ImageDesc, Timestamp};
//!
//! # fn main() -> head_tracking::Result<()> {
//! let scene = Arc::new(Scene::new(SceneConfiguration::default())?);
//! let sink = Arc::new(SharedCameraSink::new());
//! let engine = Engine::new(EngineInitArgs::new(
//!     CameraSource::Shared(Arc::clone(&sink)),
//!     Arc::new(SceneFaceDetectorFactory::new(Arc::clone(&scene))),
//! ))?;
//!
//! engine.start_tracking()?;
//! sink.set_intrinsics(scene.intrinsics());
//! sink.push_image(ImageDesc::empty(640, 480), Timestamp::system(0.0));
//!
//! let result = engine.tracking_result();
//! let num_faces = result.num_faces;
//! println!("{num_faces} face(s)");
//! engine.stop_tracking();
//! # Ok(())
//! # }
//! ```

/// Error types and result handling
pub mod error;

/// Constants used throughout the library
pub mod constants;

/// Shared data types: points, faces, timestamps, intrinsics
pub mod types;

/// Platform services such as the steady clock
pub mod platform;

/// Kalman and low-pass filters
pub mod filters;

/// Camera abstraction and the shared/platform camera variants
pub mod camera;

/// Face detector and factory traits
pub mod face_detector;

/// Double buffering for single- and cross-thread handoff
pub mod double_buffer;

/// Frame-to-frame face tracking
pub mod face_tracker;

/// Ambient light gating of face detection
pub mod light_filter;

/// Device acceleration sampling
pub mod acceleration;

/// Virtual face injection
pub mod virtual_face;

/// Push and pull delivery of processed frames
pub mod frame_adapter;

/// Fixed-layout result structs
pub mod abi;

/// Tracking engine
pub mod engine;

/// Synthetic camera scene and face detector
pub mod simulation;

/// Configuration management
pub mod config;

/// Main application module
pub mod app;

pub use error::{Error, Result};
