//! Frame-to-frame face tracking.
//!
//! [`FaceTracker::update`] turns one frame of detector output into tracked
//! faces:
//! 1. Deproject the tracked eyes into camera space and validate the face
//!    (head yaw, interocular distance).
//! 2. Drop raw faces that duplicate an earlier one.
//! 3. Move tracking points into the configured world frame.
//! 4. Match faces to Kalman filter slots by distance to each slot's prediction.
//! 5. Update or reset matched slots, claim slots for new faces, coast and
//!    eventually free unmatched slots.
//! 6. Order the output so the primary face comes first and low-pass its depth.
//!
//! Slots hold the tracking identity. A slot that loses its face keeps being
//! reported with a damped prediction until the survival time runs out.

use log::{debug, info, warn};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::panic::Location;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::camera::CameraFrame;
use crate::constants::{DEFAULT_HEAD_POSE_Z_ALPHA, MAX_NUM_FACES, MM_PER_METER};
use crate::double_buffer::DoubleBuffer;
use crate::face_detector::{FaceDetector, FaceDetectorOutput};
use crate::filters::{KalmanCoeffs, KalmanFilter, LowPassFilter};
use crate::platform::{Platform, SystemPlatform};
use crate::types::{
    CameraIntrinsics, Eye, EyeIdx, Face, FaceIdx, MovingPoint, Point, RawFace, SingleFaceConfiguration, Timestamp,
    INVALID_FACE_IDX,
};
use crate::{Error, Result};

/// Tuning of the matching and filtering stages. Distances in mm, times in ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterProperties {
    /// Device acceleration above which the jump flag is raised
    pub acceleration_threshold: f32,
    /// How long an unmatched slot survives
    pub survival_time_ms: f32,
    /// Time constant of the velocity decay applied to coasting slots
    pub vel_damping_time: f32,
    /// Raw faces closer than this to an earlier raw face are duplicates
    pub min_fit_dist: f32,
    /// Faces farther than this from a slot's prediction do not match it
    pub max_fit_dist: f32,
    /// Largest accepted head yaw, radians
    pub angle_y_max: f32,
    /// Smallest accepted eye distance when both eyes are tracked
    pub interocular_distance_min: f32,
    /// Largest accepted eye distance when both eyes are tracked
    pub interocular_distance_max: f32,
    /// How long the jump flag stays raised
    pub buffer_lim: f32,
    /// Point the primary-face distance is measured from
    pub main_face_skew: Vector3<f32>,
    /// Per-axis weights of the primary-face distance
    pub main_face_scale: Vector3<f32>,
    /// Kalman gains
    pub kalman: KalmanCoeffs,
}

impl Default for FilterProperties {
    fn default() -> Self {
        Self {
            acceleration_threshold: 0.5,
            survival_time_ms: 600.0,
            vel_damping_time: 100.0,
            min_fit_dist: 40.0,
            max_fit_dist: 2000.0,
            angle_y_max: 45.0_f32.to_radians(),
            interocular_distance_min: 30.0,
            interocular_distance_max: 80.0,
            buffer_lim: 600.0,
            main_face_skew: Vector3::zeros(),
            main_face_scale: Vector3::new(4.0, 4.0, 1.0),
            kalman: KalmanCoeffs::default(),
        }
    }
}

fn non_negative(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!("{name} must be finite and non-negative, got {value}")))
    }
}

impl FilterProperties {
    /// Check that every bound is usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] naming the first bad property.
    pub fn validate(&self) -> Result<()> {
        non_negative("acceleration_threshold", self.acceleration_threshold)?;
        non_negative("survival_time_ms", self.survival_time_ms)?;
        non_negative("vel_damping_time", self.vel_damping_time)?;
        non_negative("min_fit_dist", self.min_fit_dist)?;
        non_negative("max_fit_dist", self.max_fit_dist)?;
        non_negative("buffer_lim", self.buffer_lim)?;
        non_negative("interocular_distance_min", self.interocular_distance_min)?;
        non_negative("interocular_distance_max", self.interocular_distance_max)?;

        if self.min_fit_dist > self.max_fit_dist {
            return Err(Error::InvalidConfiguration(format!(
                "min_fit_dist ({}) exceeds max_fit_dist ({})",
                self.min_fit_dist, self.max_fit_dist
            )));
        }
        if self.interocular_distance_min > self.interocular_distance_max {
            return Err(Error::InvalidConfiguration(format!(
                "interocular_distance_min ({}) exceeds interocular_distance_max ({})",
                self.interocular_distance_min, self.interocular_distance_max
            )));
        }
        if !(self.angle_y_max > 0.0 && self.angle_y_max.is_finite()) {
            return Err(Error::InvalidConfiguration(format!("angle_y_max must be positive, got {}", self.angle_y_max)));
        }
        if !self.main_face_skew.iter().chain(self.main_face_scale.iter()).all(|v| v.is_finite()) {
            return Err(Error::InvalidConfiguration("main face skew and scale must be finite".to_string()));
        }
        if !self.kalman.is_valid() {
            return Err(Error::InvalidConfiguration(format!("Kalman gains out of range: {:?}", self.kalman)));
        }
        Ok(())
    }
}

/// Face tracker configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceTrackerConfiguration {
    /// Track the right eye
    pub track_right_eye: bool,
    /// Track the left eye
    pub track_left_eye: bool,
    /// Matching and filtering tuning
    pub filter_properties: FilterProperties,
    /// Rotation from camera space into the world frame
    pub camera_rotation: Matrix3<f32>,
    /// Camera position in the world frame, mm
    pub camera_position: Vector3<f32>,
    /// Single-face mode
    pub single_face: SingleFaceConfiguration,
    /// Low-pass alpha for the primary face depth
    pub head_pose_z_low_pass_alpha: f32,
}

impl Default for FaceTrackerConfiguration {
    fn default() -> Self {
        Self {
            track_right_eye: true,
            track_left_eye: true,
            filter_properties: FilterProperties::default(),
            camera_rotation: Matrix3::identity(),
            camera_position: Vector3::zeros(),
            single_face: SingleFaceConfiguration::default(),
            head_pose_z_low_pass_alpha: DEFAULT_HEAD_POSE_Z_ALPHA,
        }
    }
}

impl FaceTrackerConfiguration {
    /// Check the configuration before it is applied
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if no eye is tracked or any
    /// bound is unusable.
    pub fn validate(&self) -> Result<()> {
        if !self.track_right_eye && !self.track_left_eye {
            return Err(Error::InvalidConfiguration("at least one eye must be tracked".to_string()));
        }
        self.filter_properties.validate()?;
        if !self.camera_rotation.iter().chain(self.camera_position.iter()).all(|v| v.is_finite()) {
            return Err(Error::InvalidConfiguration("camera transform must be finite".to_string()));
        }
        let threshold = self.single_face.too_far_distance_threshold;
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "single face distance threshold must be positive, got {threshold}"
            )));
        }
        let alpha = self.head_pose_z_low_pass_alpha;
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::InvalidConfiguration(format!("head pose Z alpha must be in (0, 1], got {alpha}")));
        }
        Ok(())
    }

    fn transform_point(&self, point: &Point) -> Point {
        self.camera_rotation * point + self.camera_position
    }
}

#[derive(Debug, Clone)]
struct Slot {
    filter: KalmanFilter,
    last_update_ms: f64,
    raw_face_index: FaceIdx,
    angle: Point,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            filter: KalmanFilter::new(),
            last_update_ms: 0.0,
            raw_face_index: INVALID_FACE_IDX,
            angle: Point::zeros(),
        }
    }
}

impl Slot {
    fn is_active(&self) -> bool {
        self.filter.is_valid()
    }

    fn is_matched(&self) -> bool {
        self.raw_face_index != INVALID_FACE_IDX
    }

    #[allow(clippy::cast_possible_truncation)]
    fn state_at(&self, now_ms: f64, damping_time: f32) -> MovingPoint {
        damped_prediction(self.filter.point(), (now_ms - self.last_update_ms) as f32, damping_time)
    }
}

/// Extrapolate `point` by `elapsed` ms while its velocity decays with time constant `damping_time`.
fn damped_prediction(point: &MovingPoint, elapsed: f32, damping_time: f32) -> MovingPoint {
    if elapsed <= 0.0 {
        return *point;
    }
    if damping_time <= 0.0 {
        return MovingPoint::at(point.pos);
    }
    let decay = (-elapsed / damping_time).exp();
    MovingPoint { pos: point.pos + point.vel * (damping_time * (1.0 - decay)), vel: point.vel * decay }
}

// A raw face taking part in slot matching
struct Candidate {
    raw_index: usize,
    world: Point,
    angle: Point,
}

#[derive(Debug, Default)]
struct SingleFaceState {
    tracked_id: Option<FaceIdx>,
    last_point: Option<Point>,
    // Frame time the tracked face was last detected
    last_seen_ms: Option<f64>,
    too_far_since_ms: Option<f64>,
}

struct SingleFaceSelection {
    raw_index: usize,
    switched: bool,
}

impl SingleFaceState {
    /// Pick the raw face to track. `now_ms` is steady time for the too-far
    /// timer, `frame_ms` the frame time the lost face coasts on. `None` means
    /// nothing is measured this frame.
    fn select(
        &mut self,
        config: &SingleFaceConfiguration,
        survival_time_ms: f32,
        raw_faces: &[RawFace],
        output: &FaceDetectorOutput,
        now_ms: f64,
        frame_ms: f64,
    ) -> Option<SingleFaceSelection> {
        let id_of = |raw: &RawFace| output.faces[raw.detected_face_index as usize].id;
        let nearest_to = |reference: &Point, exclude: Option<usize>| {
            raw_faces
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != exclude)
                .min_by(|(_, a), (_, b)| {
                    let a = (a.tracking_point - reference).norm();
                    let b = (b.tracking_point - reference).norm();
                    a.total_cmp(&b)
                })
                .map(|(i, _)| i)
        };
        let timeout_ms = f64::from(config.too_far_reset_timeout_ms);
        let previous_id = self.tracked_id;

        let tracked = previous_id.and_then(|id| raw_faces.iter().position(|raw| id_of(raw) == id));
        let selected = match tracked {
            Some(current) => {
                let range = raw_faces[current].tracking_point.norm();
                let mut selected = current;
                if range / MM_PER_METER > config.too_far_distance_threshold {
                    let since = *self.too_far_since_ms.get_or_insert(now_ms);
                    if now_ms - since > timeout_ms {
                        if let Some(closer) = nearest_to(&Point::zeros(), Some(current)) {
                            if raw_faces[closer].tracking_point.norm() < range {
                                selected = closer;
                            }
                        }
                    }
                } else {
                    self.too_far_since_ms = None;
                }
                selected
            }
            None => {
                // The lost face keeps its identity while its slot coasts
                let coasting = previous_id.is_some()
                    && self
                        .last_seen_ms
                        .is_some_and(|seen| frame_ms - seen <= f64::from(survival_time_ms));
                let too_far_expired = self.too_far_since_ms.is_some_and(|since| now_ms - since > timeout_ms);
                if coasting && !too_far_expired {
                    return None;
                }
                let reference = self.last_point.unwrap_or_else(Point::zeros);
                nearest_to(&reference, None)?
            }
        };

        let id = id_of(&raw_faces[selected]);
        let switched = previous_id.is_some_and(|previous| previous != id);
        if switched || previous_id.is_none() {
            let range = raw_faces[selected].tracking_point.norm();
            self.too_far_since_ms = (range / MM_PER_METER > config.too_far_distance_threshold).then_some(now_ms);
        }
        self.tracked_id = Some(id);
        self.last_point = Some(raw_faces[selected].tracking_point);
        self.last_seen_ms = Some(frame_ms);
        Some(SingleFaceSelection { raw_index: selected, switched })
    }
}

/// Matches detected faces between frames and filters their positions.
///
/// `update` must be driven from a single thread. Accessors reflect the most
/// recent `update`.
pub struct FaceTracker {
    config: FaceTrackerConfiguration,
    camera_intrinsics: Option<CameraIntrinsics>,
    platform: Arc<dyn Platform>,
    update_thread: Option<ThreadId>,
    previous_rotation: Option<i32>,

    timestamp: Option<Timestamp>,
    raw_faces: Vec<RawFace>,

    slots: DoubleBuffer<Vec<Slot>>,
    result_faces: DoubleBuffer<Vec<Face>>,
    primary_slot: Option<usize>,

    jump_flag: bool,
    jump_until_ms: Option<f64>,

    single_face: SingleFaceState,
    head_pose_z_filter: LowPassFilter,
}

impl Default for FaceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceTracker {
    /// Tracker with the default configuration, timed by the system clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_platform(Arc::new(SystemPlatform))
    }

    /// Tracker reading steady time from `platform`
    #[must_use]
    pub fn with_platform(platform: Arc<dyn Platform>) -> Self {
        let config = FaceTrackerConfiguration::default();
        let slots = vec![Slot::default(); MAX_NUM_FACES];
        Self {
            head_pose_z_filter: LowPassFilter::new(config.head_pose_z_low_pass_alpha),
            config,
            camera_intrinsics: None,
            platform,
            update_thread: None,
            previous_rotation: None,
            timestamp: None,
            raw_faces: Vec::new(),
            slots: DoubleBuffer::new(slots.clone(), slots),
            result_faces: DoubleBuffer::default(),
            primary_slot: None,
            jump_flag: false,
            jump_until_ms: None,
            single_face: SingleFaceState::default(),
        }
    }

    /// Set camera intrinsics. Required before the first [`FaceTracker::update`];
    /// a change resets every tracked face.
    pub fn camera_did_change(&mut self, intrinsics: &CameraIntrinsics) {
        if self.camera_intrinsics.as_ref() != Some(intrinsics) {
            if self.camera_intrinsics.is_some() {
                info!("Camera intrinsics changed, resetting tracked faces");
                self.reset();
            }
            self.camera_intrinsics = Some(*intrinsics);
        }
    }

    /// Resize slot storage to `max_num_of_faces`; slots past the bound are dropped.
    pub fn on_max_num_of_detected_faces_change(&mut self, max_num_of_faces: usize) {
        debug!("Face tracker slots: {max_num_of_faces}");
        self.slots.for_each_mut(|slots| slots.resize_with(max_num_of_faces, Slot::default));
        self.result_faces.get_mut().truncate(max_num_of_faces);
        if self.primary_slot.is_some_and(|slot| slot >= max_num_of_faces) {
            self.primary_slot = None;
        }
    }

    /// Apply `config` if it is valid
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] and keeps the current
    /// configuration if `config` is invalid.
    pub fn update_configuration(&mut self, config: &FaceTrackerConfiguration) -> Result<()> {
        if let Err(e) = config.validate() {
            warn!("Face tracker configuration rejected: {e}");
            return Err(e);
        }

        self.head_pose_z_filter.reconfigure(config.head_pose_z_low_pass_alpha)?;
        let previous = std::mem::replace(&mut self.config, *config);

        let geometry_changed = previous.track_right_eye != config.track_right_eye
            || previous.track_left_eye != config.track_left_eye
            || previous.camera_rotation != config.camera_rotation
            || previous.camera_position != config.camera_position;
        if geometry_changed || previous.single_face.enable != config.single_face.enable {
            debug!("Face tracker geometry changed, resetting tracked faces");
            self.reset();
        }
        Ok(())
    }

    /// Process `output` detected on `frame`. Afterwards [`FaceTracker::faces`]
    /// and [`FaceTracker::timestamp`] describe this frame.
    ///
    /// Frames that do not advance the timestamp are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongThread`] when called from a thread other than the
    /// first caller, and [`Error::InvalidState`] before camera intrinsics are known.
    #[track_caller]
    pub fn update(
        &mut self,
        detector: Option<&mut dyn FaceDetector>,
        output: &FaceDetectorOutput,
        frame: &dyn CameraFrame,
        device_acceleration: f32,
    ) -> Result<()> {
        let current_thread = thread::current().id();
        match self.update_thread {
            Some(owner) if owner != current_thread => {
                return Err(Error::WrongThread { location: Location::caller() });
            }
            Some(_) => {}
            None => self.update_thread = Some(current_thread),
        }
        if self.camera_intrinsics.is_none() {
            return Err(Error::InvalidState("FaceTracker::update called before camera_did_change".to_string()));
        }

        let timestamp = frame.timestamp();
        if let Some(last) = self.timestamp {
            if timestamp.ms <= last.ms {
                debug!("Ignoring frame at {} ms, last frame was at {} ms", timestamp.ms, last.ms);
                return Ok(());
            }
        }

        let rotation = frame.image_descs().first().map(|image| image.rotation);
        if rotation.is_some() && self.previous_rotation.is_some() && rotation != self.previous_rotation {
            info!("Image rotation changed, resetting tracked faces");
            self.reset();
        }
        if rotation.is_some() {
            self.previous_rotation = rotation;
        }

        let now_ms = timestamp.ms;
        self.timestamp = Some(timestamp);
        self.build_raw_faces(output, frame);
        self.update_jump_flag(device_acceleration, now_ms);

        let (candidates, switched) = self.select_candidates(detector, output, now_ms);
        if switched {
            // A new identity starts from its own measurement
            for slot in self.slots.get_mut() {
                slot.filter.invalidate();
            }
            self.primary_slot = None;
            self.head_pose_z_filter.reset();
        }

        self.match_slots(&candidates, now_ms);
        self.publish_faces(now_ms);
        Ok(())
    }

    fn build_raw_faces(&mut self, output: &FaceDetectorOutput, frame: &dyn CameraFrame) {
        let properties = &self.config.filter_properties;
        self.raw_faces.clear();

        for (index, detected) in output.faces.iter().enumerate() {
            if detected.pose_angle.y.abs() > properties.angle_y_max {
                debug!("Face {} rejected: yaw {} rad", detected.id, detected.pose_angle.y);
                continue;
            }

            let right = deproject_eye(frame, &detected.eyes[EyeIdx::Right as usize]);
            let left = deproject_eye(frame, &detected.eyes[EyeIdx::Left as usize]);
            let tracking_point = match (self.config.track_right_eye, self.config.track_left_eye, right, left) {
                (true, true, Some(right), Some(left)) => {
                    let interocular = (right - left).norm();
                    if interocular < properties.interocular_distance_min
                        || interocular > properties.interocular_distance_max
                    {
                        debug!("Face {} rejected: interocular distance {interocular} mm", detected.id);
                        continue;
                    }
                    (right + left) * 0.5
                }
                (true, false, Some(right), _) => right,
                (false, true, _, Some(left)) => left,
                _ => {
                    debug!("Face {} skipped: eye deprojection failed", detected.id);
                    continue;
                }
            };

            let duplicate = self
                .raw_faces
                .iter()
                .any(|raw| (raw.tracking_point - tracking_point).norm() < properties.min_fit_dist);
            if duplicate {
                debug!("Face {} dropped as a duplicate", detected.id);
                continue;
            }

            self.raw_faces.push(RawFace {
                eye_points: [right.unwrap_or(tracking_point), left.unwrap_or(tracking_point)],
                tracking_point,
                detected_face_index: FaceIdx::try_from(index).unwrap_or(INVALID_FACE_IDX),
            });
        }
    }

    fn update_jump_flag(&mut self, device_acceleration: f32, now_ms: f64) {
        let properties = &self.config.filter_properties;
        if device_acceleration > properties.acceleration_threshold {
            self.jump_until_ms = Some(now_ms + f64::from(properties.buffer_lim));
        }
        self.jump_flag = self.jump_until_ms.is_some_and(|until| now_ms <= until);
        if !self.jump_flag {
            self.jump_until_ms = None;
        }
    }

    fn select_candidates(
        &mut self,
        detector: Option<&mut dyn FaceDetector>,
        output: &FaceDetectorOutput,
        frame_ms: f64,
    ) -> (Vec<Candidate>, bool) {
        let to_candidate = |raw_index: usize, raw: &RawFace| Candidate {
            raw_index,
            world: self.config.transform_point(&raw.tracking_point),
            angle: output.faces[raw.detected_face_index as usize].pose_angle,
        };

        if !self.config.single_face.enable {
            let candidates = self.raw_faces.iter().enumerate().map(|(i, raw)| to_candidate(i, raw)).collect();
            return (candidates, false);
        }

        let previous_id = self.single_face.tracked_id;
        let now_ms = self.platform.system_time_ms();
        let survival_time_ms = self.config.filter_properties.survival_time_ms;
        let selection = self.single_face.select(
            &self.config.single_face,
            survival_time_ms,
            &self.raw_faces,
            output,
            now_ms,
            frame_ms,
        );
        let Some(selection) = selection else {
            return (Vec::new(), false);
        };
        let raw = &self.raw_faces[selection.raw_index];
        let id = output.faces[raw.detected_face_index as usize].id;
        if selection.switched {
            info!("Single face tracking switched from {previous_id:?} to face {id}");
        }
        if previous_id != Some(id) {
            if let Some(detector) = detector {
                if !detector.track_single_face(id) {
                    debug!("Face detector does not support single face tracking");
                }
            }
        }
        (vec![to_candidate(selection.raw_index, raw)], selection.switched)
    }

    fn match_slots(&mut self, candidates: &[Candidate], now_ms: f64) {
        let properties = self.config.filter_properties;
        let single_face = self.config.single_face.enable;
        let (previous, slots) = self.slots.swap();
        slots.clone_from(previous);

        let mut pairs = Vec::new();
        for (slot_index, slot) in slots.iter().enumerate().filter(|(_, slot)| slot.is_active()) {
            let predicted = slot.state_at(now_ms, properties.vel_damping_time).pos;
            for (candidate_index, candidate) in candidates.iter().enumerate() {
                let distance = (candidate.world - predicted).norm();
                if distance < properties.max_fit_dist {
                    pairs.push((distance, slot_index, candidate_index));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        for slot in slots.iter_mut() {
            slot.raw_face_index = INVALID_FACE_IDX;
        }
        let mut assigned = vec![false; candidates.len()];
        for (_, slot_index, candidate_index) in pairs {
            let slot = &mut slots[slot_index];
            if assigned[candidate_index] || slot.is_matched() {
                continue;
            }
            assigned[candidate_index] = true;
            apply_measurement(slot, &candidates[candidate_index], now_ms, &properties.kalman, self.jump_flag);
        }

        for (candidate, _) in candidates.iter().zip(&assigned).filter(|(_, assigned)| !**assigned) {
            let free = slots.iter().position(|slot| !slot.is_active()).or_else(|| {
                slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| !slot.is_matched())
                    .min_by(|(_, a), (_, b)| a.last_update_ms.total_cmp(&b.last_update_ms))
                    .map(|(i, _)| i)
            });
            match free {
                Some(slot_index) => {
                    debug!("Face {} claims slot {slot_index}", candidate.raw_index);
                    let slot = &mut slots[slot_index];
                    slot.filter.invalidate();
                    apply_measurement(slot, candidate, now_ms, &properties.kalman, self.jump_flag);
                }
                None => debug!("No free slot for face {}", candidate.raw_index),
            }
        }

        let any_matched = slots.iter().any(Slot::is_matched);
        for (slot_index, slot) in slots.iter_mut().enumerate() {
            if !slot.is_active() || slot.is_matched() {
                continue;
            }
            let expired = now_ms - slot.last_update_ms > f64::from(properties.survival_time_ms);
            if expired || (single_face && any_matched) {
                debug!("Slot {slot_index} freed");
                slot.filter.invalidate();
            }
        }
    }

    fn publish_faces(&mut self, now_ms: f64) {
        let properties = &self.config.filter_properties;
        let slots = self.slots.get();

        let mut tracked: Vec<(usize, Face)> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_active())
            .map(|(slot_index, slot)| {
                let point = if slot.is_matched() {
                    *slot.filter.point()
                } else {
                    slot.state_at(now_ms, properties.vel_damping_time)
                };
                (slot_index, Face { point, angle: slot.angle, raw_face_index: slot.raw_face_index })
            })
            .collect();

        let weighted_distance = |face: &Face| {
            (face.point.pos - properties.main_face_skew).component_mul(&properties.main_face_scale).norm()
        };
        let primary = tracked
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| weighted_distance(&a.1).total_cmp(&weighted_distance(&b.1)))
            .map(|(i, _)| i);

        match primary {
            Some(index) => {
                tracked[..=index].rotate_right(1);
                let slot_index = tracked[0].0;
                if self.primary_slot != Some(slot_index) {
                    self.head_pose_z_filter.reset();
                    self.primary_slot = Some(slot_index);
                }
                let face = &mut tracked[0].1;
                face.point.pos.z = self.head_pose_z_filter.update(face.point.pos.z);
            }
            None => {
                self.primary_slot = None;
                self.head_pose_z_filter.reset();
            }
        }

        if self.config.single_face.enable {
            tracked.truncate(1);
        }

        let (_, faces) = self.result_faces.swap();
        faces.clear();
        faces.extend(tracked.into_iter().map(|(_, face)| face));
    }

    fn reset(&mut self) {
        self.slots.for_each_mut(|slots| slots.iter_mut().for_each(|slot| *slot = Slot::default()));
        self.primary_slot = None;
        self.head_pose_z_filter.reset();
        self.single_face = SingleFaceState::default();
        self.jump_until_ms = None;
        self.jump_flag = false;
    }

    /// Raw faces of the most recent frame
    #[must_use]
    pub fn raw_faces(&self) -> &[RawFace] {
        &self.raw_faces
    }

    /// Tracked faces of the most recent frame, primary face first
    #[must_use]
    pub fn faces(&self) -> &[Face] {
        self.result_faces.get()
    }

    /// Whether device motion is being compensated
    #[must_use]
    pub fn jump_flag(&self) -> bool {
        self.jump_flag
    }

    /// Timestamp of the most recent frame
    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp.unwrap_or_default()
    }

    /// Kalman gains in use
    #[must_use]
    pub fn kalman_coeffs(&self) -> &KalmanCoeffs {
        &self.config.filter_properties.kalman
    }

    /// Intrinsics from the last [`FaceTracker::camera_did_change`]
    #[must_use]
    pub fn camera_intrinsics(&self) -> Option<&CameraIntrinsics> {
        self.camera_intrinsics.as_ref()
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &FaceTrackerConfiguration {
        &self.config
    }

    /// Filter applied to the primary face depth
    #[must_use]
    pub fn head_pose_z_filter(&self) -> &LowPassFilter {
        &self.head_pose_z_filter
    }

    /// Kalman filter of every slot, tracked or free
    pub fn slot_filters(&self) -> impl Iterator<Item = &KalmanFilter> + '_ {
        self.slots.get().iter().map(|slot| &slot.filter)
    }

    /// Detector id followed in single-face mode
    #[must_use]
    pub fn single_face_id(&self) -> Option<FaceIdx> {
        self.single_face.tracked_id
    }
}

fn apply_measurement(slot: &mut Slot, candidate: &Candidate, now_ms: f64, kalman: &KalmanCoeffs, jump: bool) {
    #[allow(clippy::cast_possible_truncation)]
    let dt = (now_ms - slot.last_update_ms) as f32;
    if slot.filter.is_valid() && !jump && dt > 0.0 {
        slot.filter.update(kalman, candidate.world, dt);
    } else {
        slot.filter.reset(candidate.world);
    }
    slot.last_update_ms = now_ms;
    slot.raw_face_index = FaceIdx::try_from(candidate.raw_index).unwrap_or(INVALID_FACE_IDX);
    slot.angle = candidate.angle;
}

fn deproject_eye(frame: &dyn CameraFrame, eye: &Eye) -> Option<Point> {
    let depth = if eye.depth.is_finite() && eye.depth > 0.0 { eye.depth } else { frame.depth(eye.image_coord)? };
    frame.deproject_pixel_to_point(eye.image_coord, depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configuration_is_valid() {
        assert!(FaceTrackerConfiguration::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_bounds_are_rejected() {
        let mut config = FaceTrackerConfiguration::default();
        config.filter_properties.min_fit_dist = 500.0;
        config.filter_properties.max_fit_dist = 100.0;
        assert!(config.validate().is_err());

        let mut config = FaceTrackerConfiguration::default();
        config.filter_properties.interocular_distance_min = 90.0;
        assert!(config.validate().is_err());

        let mut config = FaceTrackerConfiguration::default();
        config.head_pose_z_low_pass_alpha = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_damped_prediction() {
        let point = MovingPoint { pos: Point::zeros(), vel: Point::new(1.0, 0.0, 0.0) };
        // Far past the damping time the travelled distance approaches vel * tau
        let far = damped_prediction(&point, 10_000.0, 100.0);
        assert!((far.pos.x - 100.0).abs() < 1e-3);
        assert!(far.vel.x < 1e-6);

        let now = damped_prediction(&point, 0.0, 100.0);
        assert_eq!(now, point);

        let undamped = damped_prediction(&point, 50.0, 0.0);
        assert_eq!(undamped.pos, Point::zeros());
        assert_eq!(undamped.vel, Point::zeros());
    }

    #[test]
    fn test_camera_transform() {
        let config = FaceTrackerConfiguration {
            camera_rotation: Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0),
            camera_position: Vector3::new(0.0, 100.0, 0.0),
            ..FaceTrackerConfiguration::default()
        };
        let world = config.transform_point(&Point::new(10.0, 0.0, 500.0));
        assert!((world - Point::new(0.0, 110.0, 500.0)).norm() < 1e-5);
    }

    #[test]
    fn test_update_requires_intrinsics() {
        let mut tracker = FaceTracker::new();
        let frame =
            crate::camera::TrivialCameraFrame::new(crate::types::ImageDesc::empty(4, 4), Timestamp::unknown(1.0));
        let err = tracker.update(None, &FaceDetectorOutput::default(), &frame, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
