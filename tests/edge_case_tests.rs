//! Edge case tests for degenerate detections, frames and filter input


use head_tracking::camera::{CameraFrame, TrivialCameraFrame};
use head_tracking::face_detector::{FaceDetector, FaceDetectorConfiguration, FaceDetectorOutput};
use head_tracking::face_tracker::FaceTracker;
use head_tracking::filters::{KalmanCoeffs, KalmanFilter, LowPassFilter};
use head_tracking::simulation::{Scene, SceneConfiguration, SceneFaceDetector, SimulatedHead};
use head_tracking::types::{DetectedFace, Eye, ImageDesc, Point, Timestamp};
use head_tracking::virtual_face::{VirtualFace, VirtualFaceHookContext, VirtualFaceInjector};
use head_tracking::Error;
use nalgebra::Vector2;
use std::sync::Arc;
use test_helpers::{detected_face, frame_at, intrinsics, HEIGHT, WIDTH};

fn tracker() -> FaceTracker {
    let mut tracker = FaceTracker::new();
    tracker.camera_did_change(&intrinsics());
    tracker
}

fn broken_face(image_coord: Vector2<f64>, depth: f32) -> DetectedFace {
    let eye = Eye { image_coord, depth };
    DetectedFace { eyes: [eye; 2], pose_position: Point::zeros(), pose_angle: Point::zeros(), id: 1 }
}

#[test]
fn test_update_before_intrinsics() {
    let mut tracker = FaceTracker::new();
    let frame = frame_at(0.0);
    let err = tracker.update(None, &FaceDetectorOutput::default(), &frame, 0.0).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(err.is_programming_error());
}

#[test]
fn test_empty_output_still_advances_time() {
    let mut tracker = tracker();
    let frame = frame_at(42.0);
    tracker.update(None, &FaceDetectorOutput::default(), &frame, 0.0).unwrap();
    assert!(tracker.faces().is_empty());
    assert!(tracker.raw_faces().is_empty());
    assert_eq!(tracker.timestamp(), Timestamp::system(42.0));
}

#[test]
fn test_non_finite_eyes_are_skipped() {
    let mut tracker = tracker();
    let frame = frame_at(0.0);
    let output = FaceDetectorOutput {
        faces: vec![
            broken_face(Vector2::new(f64::NAN, 240.0), 600.0),
            broken_face(Vector2::new(f64::INFINITY, 240.0), 600.0),
            // No depth and no depth map
            broken_face(Vector2::new(320.0, 240.0), f32::NAN),
            broken_face(Vector2::new(320.0, 240.0), -1.0),
        ],
    };
    tracker.update(None, &output, &frame, 0.0).unwrap();
    assert!(tracker.raw_faces().is_empty());
    assert!(tracker.faces().is_empty());
}

#[test]
fn test_frame_without_geometry() {
    let mut tracker = tracker();
    let pinhole = frame_at(0.0);
    let output = FaceDetectorOutput { faces: vec![detected_face(&pinhole, Point::new(0.0, 0.0, 600.0), 1)] };

    let trivial = TrivialCameraFrame::new(ImageDesc::empty(WIDTH, HEIGHT), Timestamp::system(0.0));
    tracker.update(None, &output, &trivial, 0.0).unwrap();
    assert!(tracker.faces().is_empty());
}

#[test]
fn test_non_finite_acceleration_does_not_jump() {
    let mut tracker = tracker();
    let frame = frame_at(0.0);
    let output = FaceDetectorOutput { faces: vec![detected_face(&frame, Point::new(0.0, 0.0, 600.0), 1)] };
    tracker.update(None, &output, &frame, f32::NAN).unwrap();
    assert!(!tracker.jump_flag());
    assert_eq!(tracker.faces().len(), 1);
}

#[test]
fn test_virtual_face_behind_camera_is_skipped() {
    let mut injector = VirtualFaceInjector::new(Box::new(|context: &mut VirtualFaceHookContext| {
        context.virtual_faces.push(VirtualFace::at(Point::new(0.0, 0.0, -300.0)));
        true
    }));
    let frame = frame_at(0.0);
    let mut output = FaceDetectorOutput::default();
    injector.apply(&frame, &mut output, 3);
    assert!(output.faces.is_empty());
}

#[test]
fn test_scene_head_outside_image_is_not_detected() {
    let config = SceneConfiguration {
        heads: vec![
            SimulatedHead { position: [0.0, 0.0, -600.0], ..SimulatedHead::default() },
            SimulatedHead { position: [5000.0, 0.0, 600.0], ..SimulatedHead::default() },
        ],
        real_time: false,
        ..SceneConfiguration::default()
    };
    let scene = Arc::new(Scene::new(config).unwrap());
    let mut detector = SceneFaceDetector::new(Arc::clone(&scene), FaceDetectorConfiguration::default());
    detector.camera_did_change(&scene.intrinsics());
    let frame = frame_at(0.0);
    assert_eq!(frame.timestamp().ms, 0.0);
    let output = detector.detect_faces(&frame).unwrap();
    assert!(output.faces.is_empty());
}

#[test]
fn test_low_pass_reset_takes_next_sample() {
    let mut filter = LowPassFilter::new(0.1);
    filter.update(10.0);
    filter.update(20.0);
    filter.reset();
    assert!(!filter.is_valid());
    assert_eq!(filter.update(-5.0), -5.0);
}

#[test]
fn test_kalman_invalid_until_reset() {
    let mut filter = KalmanFilter::new();
    assert!(!filter.is_valid());
    filter.reset(Point::new(1.0, 2.0, 3.0));
    assert!(filter.is_valid());
    filter.invalidate();
    assert!(!filter.is_valid());
    assert!(KalmanCoeffs::default().is_valid());
}
