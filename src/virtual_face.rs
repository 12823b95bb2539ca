//! Synthetic faces injected into detector output.
//!
//! A [`VirtualFaceHook`] decides per frame which virtual heads exist; the
//! [`VirtualFaceInjector`] projects them into the frame and merges them with
//! the real detections, so the tracker sees them like any other face.

use log::trace;
use nalgebra::Vector3;

use crate::camera::CameraFrame;
use crate::constants::{DEFAULT_INTEROCULAR_DISTANCE, VIRTUAL_FACE_ID_BASE};
use crate::face_detector::FaceDetectorOutput;
use crate::types::{DetectedFace, Eye, EyeIdx, FaceIdx, Point, Timestamp, NUM_EYES};

/// Head to inject, camera space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualFace {
    /// Midpoint between the eyes, mm
    pub tracking_point: Point,
    /// Distance between the eyes, mm
    pub interocular_distance: f32,
}

impl VirtualFace {
    /// Virtual head at `tracking_point` with an average eye distance
    #[must_use]
    pub fn at(tracking_point: Point) -> Self {
        Self { tracking_point, interocular_distance: DEFAULT_INTEROCULAR_DISTANCE }
    }

    /// Camera-space eye positions, indexed by [`EyeIdx`]
    #[must_use]
    pub fn eye_points(&self) -> [Point; NUM_EYES] {
        let half = Vector3::new(self.interocular_distance / 2.0, 0.0, 0.0);
        let mut eyes = [self.tracking_point; NUM_EYES];
        eyes[EyeIdx::Right as usize] -= half;
        eyes[EyeIdx::Left as usize] += half;
        eyes
    }
}

/// Per-frame exchange between the engine and a hook
#[derive(Debug, Clone, Default)]
pub struct VirtualFaceHookContext {
    /// Timestamp of the frame
    pub timestamp: Timestamp,
    /// Real faces found by the detector
    pub num_detected_faces: usize,
    /// How many virtual faces fit in this frame
    pub max_num_virtual_faces: usize,
    /// Faces to inject, filled by the hook
    pub virtual_faces: Vec<VirtualFace>,
    /// Discard the real faces, filled by the hook
    pub drop_detected_faces: bool,
}

/// Decides which virtual faces to inject
pub trait VirtualFaceHook: Send {
    /// Fill `context`. Returns `false` to leave the frame untouched.
    fn inject(&mut self, context: &mut VirtualFaceHookContext) -> bool;
}

impl<F> VirtualFaceHook for F
where
    F: FnMut(&mut VirtualFaceHookContext) -> bool + Send,
{
    fn inject(&mut self, context: &mut VirtualFaceHookContext) -> bool {
        self(context)
    }
}

/// Applies a [`VirtualFaceHook`] to detector output
pub struct VirtualFaceInjector {
    hook: Box<dyn VirtualFaceHook>,
    context: VirtualFaceHookContext,
}

impl VirtualFaceInjector {
    /// Injector driven by `hook`
    #[must_use]
    pub fn new(hook: Box<dyn VirtualFaceHook>) -> Self {
        Self { hook, context: VirtualFaceHookContext::default() }
    }

    /// Merge the hook's faces into `output`, keeping at most `max_num_of_faces` faces.
    /// Virtual faces that cannot be projected into `frame` are skipped.
    pub fn apply(&mut self, frame: &dyn CameraFrame, output: &mut FaceDetectorOutput, max_num_of_faces: usize) {
        self.context.timestamp = frame.timestamp();
        self.context.num_detected_faces = output.faces.len();
        self.context.max_num_virtual_faces = max_num_of_faces;
        self.context.virtual_faces.clear();
        self.context.drop_detected_faces = false;

        if !self.hook.inject(&mut self.context) {
            return;
        }

        if self.context.drop_detected_faces {
            output.faces.clear();
        }
        let virtual_faces = self.context.virtual_faces.iter().take(max_num_of_faces);
        for (index, face) in (0..).zip(virtual_faces) {
            match project_virtual_face(frame, face, VIRTUAL_FACE_ID_BASE + index) {
                Some(detected) => output.faces.push(detected),
                None => trace!("Virtual face at {:?} is outside the frame", face.tracking_point),
            }
        }
        output.faces.truncate(max_num_of_faces);
    }
}

fn project_virtual_face(frame: &dyn CameraFrame, face: &VirtualFace, id: FaceIdx) -> Option<DetectedFace> {
    let [right, left] = face.eye_points();
    let project = |point: &Point| {
        frame.project_point_to_pixel(point).map(|(image_coord, depth)| Eye { image_coord, depth })
    };
    Some(DetectedFace {
        eyes: [project(&right)?, project(&left)?],
        pose_position: face.tracking_point,
        pose_angle: Point::zeros(),
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCameraFrame;
    use crate::types::{CameraIntrinsics, ImageDesc};
    use nalgebra::Vector2;

    fn frame() -> PinholeCameraFrame {
        PinholeCameraFrame::new(
            ImageDesc::empty(640, 480),
            Timestamp::system(10.0),
            CameraIntrinsics::centered(640, 480, 600.0),
        )
    }

    fn real_face() -> DetectedFace {
        let eye = Eye { image_coord: Vector2::new(300.0, 240.0), depth: 600.0 };
        DetectedFace { eyes: [eye; 2], pose_position: Point::zeros(), pose_angle: Point::zeros(), id: 7 }
    }

    #[test]
    fn test_inactive_hook_leaves_output() {
        let mut injector = VirtualFaceInjector::new(Box::new(|_: &mut VirtualFaceHookContext| false));
        let mut output = FaceDetectorOutput { faces: vec![real_face()] };
        injector.apply(&frame(), &mut output, 3);
        assert_eq!(output.faces, vec![real_face()]);
    }

    #[test]
    fn test_virtual_faces_are_appended() {
        let mut injector = VirtualFaceInjector::new(Box::new(|context: &mut VirtualFaceHookContext| {
            assert_eq!(context.num_detected_faces, 1);
            context.virtual_faces.push(VirtualFace::at(Point::new(0.0, 0.0, 600.0)));
            true
        }));
        let mut output = FaceDetectorOutput { faces: vec![real_face()] };
        injector.apply(&frame(), &mut output, 3);

        assert_eq!(output.faces.len(), 2);
        let injected = &output.faces[1];
        assert_eq!(injected.id, VIRTUAL_FACE_ID_BASE);
        // Eyes straddle the principal point, right eye on the left of the image
        let right = injected.eyes[EyeIdx::Right as usize].image_coord;
        let left = injected.eyes[EyeIdx::Left as usize].image_coord;
        assert!(right.x < 320.0 && left.x > 320.0);
        assert!((right.x + left.x - 640.0).abs() < 1e-6);
    }

    #[test]
    fn test_drop_detected_and_bound() {
        let mut injector = VirtualFaceInjector::new(Box::new(|context: &mut VirtualFaceHookContext| {
            context.drop_detected_faces = true;
            for i in 0..5 {
                context.virtual_faces.push(VirtualFace::at(Point::new(i as f32 * 100.0, 0.0, 700.0)));
            }
            true
        }));
        let mut output = FaceDetectorOutput { faces: vec![real_face()] };
        injector.apply(&frame(), &mut output, 2);
        assert_eq!(output.faces.len(), 2);
        assert!(output.faces.iter().all(|face| face.id >= VIRTUAL_FACE_ID_BASE));
    }
}
