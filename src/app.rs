//! Main application module: runs the engine over a simulated scene.

use crate::{
    config::Config,
    engine::{CameraSource, Engine, EngineInitArgs, TrackingStateListener},
    error::{Error, Result},
    frame_adapter::{BufferedFrame, Frame, FrameAdapter, FrameCallback},
    simulation::{Scene, SceneFaceDetectorFactory, SceneFrameSource},
};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// How processed frames reach the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Frames are pushed to a callback on the camera thread
    Callback,
    /// The application polls the latest frame
    Polling,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Engine and scene configuration
    pub config: Config,
    /// Frame delivery
    pub delivery: DeliveryMode,
    /// Stop after this long; the scene decides when `None`
    pub duration: Option<Duration>,
}

/// Totals of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Frames delivered to the application
    pub frames: u64,
    /// Delivered frames with at least one tracked face
    pub frames_with_faces: u64,
    /// Last delivered frame
    pub last_frame: Option<BufferedFrame>,
}

#[derive(Default)]
struct RunState {
    frames: AtomicU64,
    frames_with_faces: AtomicU64,
    last_frame: Mutex<Option<BufferedFrame>>,
    failed: AtomicBool,
}

impl RunState {
    fn record(&self, frame: &dyn Frame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        if let Some(primary) = frame.faces().first() {
            self.frames_with_faces.fetch_add(1, Ordering::Relaxed);
            let pos = primary.point.pos;
            debug!(
                "t={:.1} ms faces={} primary=({:.1}, {:.1}, {:.1}) jump={}",
                frame.timestamp().ms,
                frame.faces().len(),
                pos.x,
                pos.y,
                pos.z,
                frame.jump_flag()
            );
        }
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            frames: self.frames.load(Ordering::Relaxed),
            frames_with_faces: self.frames_with_faces.load(Ordering::Relaxed),
            last_frame: self.last_frame.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }
}

struct StateLogger {
    state: Arc<RunState>,
}

impl TrackingStateListener for StateLogger {
    fn on_tracking_status_update(&self, is_started: bool) {
        info!("Tracking {}", if is_started { "running" } else { "stopped" });
    }

    fn on_fatal_error(&self, error: &Error) {
        error!("Tracking failed: {error}");
        self.state.failed.store(true, Ordering::Release);
    }
}

/// Head tracking application driven by a simulated camera
pub struct TrackingApp {
    config: AppConfig,
    scene: Arc<Scene>,
    engine: Engine,
    adapter: Arc<FrameAdapter>,
    state: Arc<RunState>,
}

impl TrackingApp {
    /// Create a new head tracking application
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing head tracking application");
        config.config.validate()?;

        let scene = Arc::new(Scene::new(config.config.simulation.clone())?);
        let state = Arc::new(RunState::default());

        let adapter = match config.delivery {
            DeliveryMode::Callback => {
                let callback_state = Arc::clone(&state);
                let callback: FrameCallback = Box::new(move |frame: &dyn Frame| {
                    callback_state.record(frame);
                    *callback_state.last_frame.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(BufferedFrame::from_frame(frame));
                });
                FrameAdapter::new(Some(callback), false)
            }
            DeliveryMode::Polling => FrameAdapter::new(None, true),
        };
        let adapter = Arc::new(adapter);

        let mut args = EngineInitArgs::new(
            CameraSource::Platform(Arc::new(SceneFrameSource::factory(Arc::clone(&scene)))),
            Arc::new(SceneFaceDetectorFactory::new(Arc::clone(&scene))),
        );
        args.configuration = config.config.engine;
        args.frame_adapter = Some(Arc::clone(&adapter));
        args.tracking_state_listener = Some(Arc::new(StateLogger { state: Arc::clone(&state) }));
        let engine = Engine::new(args)?;

        Ok(Self { config, scene, engine, adapter, state })
    }

    /// Engine driven by the application
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run until the duration elapses, the scene runs out of frames or tracking fails
    ///
    /// # Errors
    ///
    /// Returns an error if tracking cannot start or fails while running.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.engine.start_tracking()?;
        let fps = self.engine.camera_fps().max(1);
        let num_frames = self.scene.config().num_frames;
        info!("Tracking {} simulated head(s) at {fps} fps", self.scene.config().heads.len());

        let period_ms = 1000.0 / f64::from(fps);
        #[allow(clippy::cast_precision_loss)]
        let last_frame_ms = num_frames.saturating_sub(1) as f64 * period_ms;
        let period = Duration::from_secs_f64(period_ms / 1000.0);

        let started = Instant::now();
        let mut last_polled = None;
        loop {
            if self.state.failed.load(Ordering::Acquire) {
                break;
            }
            if self.config.duration.is_some_and(|duration| started.elapsed() >= duration) {
                break;
            }
            if num_frames != 0 {
                let delivered = self.state.frames.load(Ordering::Relaxed);
                let latest = self.engine.tracking_result().timestamp.ms;
                if delivered >= num_frames || (delivered > 0 && latest >= last_frame_ms - period_ms / 2.0) {
                    break;
                }
            }
            if self.config.delivery == DeliveryMode::Polling {
                self.poll_frame(&mut last_polled)?;
            }
            thread::sleep(period / 2);
        }

        self.engine.stop_tracking();
        if self.config.delivery == DeliveryMode::Polling {
            self.poll_frame(&mut last_polled)?;
        }

        if self.state.failed.load(Ordering::Acquire) {
            return Err(Error::InvalidState("tracking stopped after a fatal error".to_string()));
        }
        let summary = self.state.summary();
        info!("Processed {} frames, {} with faces", summary.frames, summary.frames_with_faces);
        if summary.frames == 0 {
            warn!("No frames were delivered");
        }
        Ok(summary)
    }

    fn poll_frame(&self, last_polled: &mut Option<f64>) -> Result<()> {
        let Some(frame) = self.adapter.get_frame()? else {
            return Ok(());
        };
        let timestamp = frame.timestamp.ms;
        if *last_polled == Some(timestamp) {
            return Ok(());
        }
        *last_polled = Some(timestamp);
        self.state.record(&frame);
        *self.state.last_frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
        Ok(())
    }
}
