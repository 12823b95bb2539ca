//! Constants used throughout the library

/// Maximum number of faces carried across the binary frame boundary
pub const MAX_NUM_FACES: usize = 3;

/// Default frames per second assumption
pub const DEFAULT_FPS: u32 = 30;

/// Lux value reported by cameras that cannot measure ambient light
pub const INVALID_LUX: f32 = 0.0;

/// Millimetres per metre, single-face distances are configured in metres
pub const MM_PER_METER: f32 = 1000.0;

/// Nanoseconds per millisecond
pub const NS_PER_MS: f64 = 1_000_000.0;

/// Detector ids at and above this value belong to injected virtual faces
pub const VIRTUAL_FACE_ID_BASE: u32 = 0x8000_0000;

/// Default low-pass alpha for the primary face head pose Z
pub const DEFAULT_HEAD_POSE_Z_ALPHA: f32 = 0.2;

/// Default Kalman position gains (x, y, z)
pub const DEFAULT_KALMAN_A: [f32; 3] = [0.02, 0.05, 0.2];

/// Default Kalman velocity gain, all axes
pub const DEFAULT_KALMAN_B: f32 = 0.1;

/// Default interocular distance used by virtual faces, mm
pub const DEFAULT_INTEROCULAR_DISTANCE: f32 = 63.0;

/// Numeric precision epsilon
pub const EPSILON: f32 = 1e-6;
