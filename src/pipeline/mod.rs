//! Render loop and session state
//!
//! A [`Session`] owns everything one camera-to-output pipeline needs: the
//! effect mode, effect and inference settings, the background surface, the
//! inference engine and, once set up, the capture source and output sink.
//! It is driven from a single task. Its setters take `&self`, so the same
//! task can keep toggling modes, changing settings and loading backgrounds
//! while `start()` is being awaited.

mod background;
mod mode;
mod telemetry;

pub use background::{load_background, ImageSource, SharedSurface};
pub use mode::{Mode, ModeState};
pub use telemetry::{FrameTimes, FRAME_WINDOW};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::buffer::ConvertBuffer;
use image::{Rgba, RgbImage, RgbaImage};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::canvas::{
    draw_text, BlurBackend, CompositeOp, OffscreenCache, Surface, BLACK, GREEN,
};
use crate::capture::CaptureSource;
use crate::effects::{
    check_blur_radius, draw_bokeh_effect, substitute_background, EffectSettings,
};
use crate::error::PipelineError;
use crate::output::OutputSink;
use crate::segmentation::{
    validate, InferenceConfig, ModelFactory, SegmentOptions, Segmentation, SegmentationModel,
};

const STATS_INTERVAL: u64 = 30;
const FPS_TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);
const FPS_BACKDROP: Rgba<u8> = Rgba([0, 0, 0, 160]);

type SharedModel = Arc<Mutex<Box<dyn SegmentationModel>>>;
type InferenceTask = JoinHandle<anyhow::Result<Segmentation>>;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub effects: EffectSettings,
    /// Sleep away whatever is left of each frame's budget at this rate
    pub target_fps: Option<u32>,
    /// Skip a frame whose segmentation takes longer than this
    pub inference_timeout: Option<Duration>,
    /// Draw the measured frame rate in the top-left corner
    pub show_fps: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            effects: EffectSettings::default(),
            target_fps: None,
            inference_timeout: None,
            show_fps: true,
        }
    }
}

/// Capture and output bound at setup, checked out by the running loop
struct SessionIo {
    capture: Box<dyn CaptureSource>,
    output: Box<dyn OutputSink>,
    cache: OffscreenCache,
}

/// Returns the checked-out IO to the session when the loop ends or is dropped
struct IoLease<'a> {
    slot: &'a Mutex<Option<SessionIo>>,
    io: Option<SessionIo>,
}

impl Drop for IoLease<'_> {
    fn drop(&mut self) {
        if let Some(io) = self.io.take() {
            *self.slot.lock() = Some(io);
        }
    }
}

#[derive(Default)]
struct LoopStats {
    frames: u64,
    skipped: u64,
    capture: Duration,
    segment: Duration,
    composite: Duration,
}

impl LoopStats {
    fn log(&self, fps: f64) {
        let n = self.frames.max(1) as f64;
        let ms = |d: Duration| d.as_secs_f64() * 1000.0 / n;
        tracing::info!(
            "Frame {}: capture={:.1}ms, segment={:.1}ms, composite={:.1}ms, \
             total={:.1}ms, fps={:.1}, skipped={}",
            self.frames,
            ms(self.capture),
            ms(self.segment),
            ms(self.composite),
            ms(self.capture + self.segment + self.composite),
            fps,
            self.skipped
        );
    }
}

pub struct Session {
    mode: Mutex<ModeState>,
    effects: Mutex<EffectSettings>,
    config: Mutex<InferenceConfig>,
    factory: Option<Box<dyn ModelFactory>>,
    engine: Mutex<Option<SharedModel>>,
    background: SharedSurface,
    io: Mutex<Option<SessionIo>>,
    initialized: AtomicBool,
    stop: Mutex<CancellationToken>,
    target_fps: Option<u32>,
    inference_timeout: Option<Duration>,
    show_fps: bool,
}

impl Session {
    /// Create an unbound session
    ///
    /// Without a `factory` no segmentation is available and effect modes
    /// render like passthrough.
    pub fn new(
        settings: SessionSettings,
        config: InferenceConfig,
        factory: Option<Box<dyn ModelFactory>>,
    ) -> Self {
        Self {
            mode: Mutex::new(ModeState::default()),
            effects: Mutex::new(settings.effects),
            config: Mutex::new(config),
            factory,
            engine: Mutex::new(None),
            background: Arc::new(RwLock::new(Surface::blank())),
            io: Mutex::new(None),
            initialized: AtomicBool::new(false),
            stop: Mutex::new(CancellationToken::new()),
            target_fps: settings.target_fps.filter(|&fps| fps > 0),
            inference_timeout: settings.inference_timeout,
            show_fps: settings.show_fps,
        }
    }

    /// One-time setup: bind the camera and output, paint the background
    /// green and load the inference engine
    ///
    /// The session resolution is the capture resolution. May be repeated
    /// while stopped, e.g. after a resolution change.
    pub fn init(
        &self,
        capture: Box<dyn CaptureSource>,
        mut output: Box<dyn OutputSink>,
    ) -> Result<(), PipelineError> {
        let mut slot = self.io.lock();
        if self.initialized.load(Ordering::Acquire) && slot.is_none() {
            return Err(PipelineError::AlreadyRunning);
        }

        let (width, height) = capture.resolution();
        {
            let mut background = self.background.write();
            background.resize(width, height)?;
            background.fill(GREEN);
        }
        if let Some(canvas) = output.canvas() {
            canvas.resize(width, height)?;
        }

        self.reload()?;

        *slot = Some(SessionIo {
            capture,
            output,
            cache: OffscreenCache::new(),
        });
        self.initialized.store(true, Ordering::Release);

        tracing::info!("Session initialized at {}x{}", width, height);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.is_initialized() && self.io.lock().is_none()
    }

    /// Run the render loop until `stop()` is called
    ///
    /// The stop token is installed when `start()` is called, not when the
    /// returned future is first polled, so a `stop()` in between is honoured.
    pub fn start(&self) -> impl Future<Output = Result<(), PipelineError>> + '_ {
        let cancel = CancellationToken::new();
        if !self.is_running() {
            *self.stop.lock() = cancel.clone();
        }
        self.run(cancel)
    }

    /// Run the render loop until `cancel` (or `stop()`) fires
    ///
    /// Cancellation is checked once at the top of every iteration; an
    /// iteration in progress, including its inference call, always finishes.
    /// On the way out the output is cleared to black.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PipelineError> {
        if !self.is_initialized() {
            return Err(PipelineError::NotInitialized);
        }

        let mut lease = IoLease {
            slot: &self.io,
            io: self.io.lock().take(),
        };
        let Some(io) = lease.io.as_mut() else {
            return Err(PipelineError::AlreadyRunning);
        };
        if io.output.canvas().is_none() {
            return Err(PipelineError::ContextUnavailable);
        }

        *self.stop.lock() = cancel.clone();

        tracing::info!("Starting render loop in {} mode", self.mode());
        self.render_loop(io, &cancel).await
    }

    /// Ask the running loop to finish after its current iteration
    pub fn stop(&self) {
        self.stop.lock().cancel();
    }

    async fn render_loop(
        &self,
        io: &mut SessionIo,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let frame_budget = self
            .target_fps
            .map(|fps| Duration::from_secs_f64(1.0 / f64::from(fps)));
        let mut times = FrameTimes::default();
        let mut stats = LoopStats::default();
        let mut warned_no_engine = false;
        let mut in_flight: Option<InferenceTask> = None;

        while !cancel.is_cancelled() {
            let started = Instant::now();

            let capture_start = Instant::now();
            let frame = io
                .capture
                .capture_frame()
                .map_err(PipelineError::Capture)?;
            stats.capture += capture_start.elapsed();

            let mode = self.mode();
            let effects = self.effects();

            let segmentation = if mode.needs_segmentation() {
                let segment_start = Instant::now();
                let result = self.segment(&frame, &mut in_flight).await;
                stats.segment += segment_start.elapsed();
                match result {
                    Ok(Some(segmentation)) => Some(segmentation),
                    Ok(None) => {
                        if !warned_no_engine {
                            tracing::warn!(
                                "No segmentation model loaded, {} renders as passthrough",
                                mode
                            );
                            warned_no_engine = true;
                        }
                        None
                    }
                    Err(err) => {
                        tracing::warn!("Skipping frame: {:#}", anyhow::Error::new(err));
                        stats.skipped += 1;
                        end_frame(started, frame_budget).await;
                        continue;
                    }
                }
            } else {
                None
            };

            let composite_start = Instant::now();
            let frame: RgbaImage = frame.convert();
            let canvas = io
                .output
                .canvas()
                .ok_or(PipelineError::ContextUnavailable)?;

            match (mode, segmentation) {
                (Mode::Blur, Some(segmentation)) => {
                    draw_bokeh_effect(canvas, &frame, &segmentation, &effects, &mut io.cache)?;
                }
                (Mode::Substitute, Some(segmentation)) => {
                    let background = self.background.read();
                    substitute_background(
                        canvas,
                        &frame,
                        &background,
                        &segmentation,
                        effects.edge_blur,
                        effects.flip_horizontal,
                        effects.blur_backend,
                        &mut io.cache,
                    )?;
                }
                _ => {
                    let (width, height) = canvas.dimensions();
                    canvas.draw_image(&frame, 0.0, 0.0, width as f32, height as f32);
                }
            }
            stats.composite += composite_start.elapsed();

            times.push(started.elapsed().as_secs_f64() * 1000.0);
            if self.show_fps {
                let label = format!("{} FPS", times.fps().round() as u64);
                draw_text(canvas, &label, 4, 4, 2, FPS_TEXT, FPS_BACKDROP);
            }

            io.output.present().map_err(PipelineError::Output)?;

            stats.frames += 1;
            if stats.frames % STATS_INTERVAL == 0 {
                stats.log(times.fps());
            }

            end_frame(started, frame_budget).await;
        }

        if in_flight.is_some() {
            tracing::warn!("Leaving a timed-out inference call running");
        }

        match io.output.canvas() {
            Some(canvas) => {
                canvas.save();
                canvas.reset_transform();
                canvas.set_composite(CompositeOp::SourceOver);
                canvas.fill(BLACK);
                canvas.restore();
                io.output.present().map_err(PipelineError::Output)?;
            }
            None => tracing::warn!("Output lost its drawing context, not clearing it"),
        }

        tracing::info!(
            "Render loop stopped after {} frames ({} skipped)",
            stats.frames,
            stats.skipped
        );
        Ok(())
    }

    /// Segment `frame` on the blocking pool with the current internal resolution
    ///
    /// `Ok(None)` when no engine is loaded. A call that overruns the
    /// inference timeout is parked in `in_flight`; later frames wait on it
    /// (again bounded by the timeout) and are skipped until it finishes, so
    /// a stalled engine never has more than one call queued against it.
    async fn segment(
        &self,
        frame: &RgbImage,
        in_flight: &mut Option<InferenceTask>,
    ) -> Result<Option<Segmentation>, PipelineError> {
        if let (Some(mut task), Some(limit)) = (in_flight.take(), self.inference_timeout) {
            if tokio::time::timeout(limit, &mut task).await.is_err() {
                *in_flight = Some(task);
                return Err(PipelineError::InferenceTimeout(limit));
            }
            tracing::debug!("Timed-out inference finished, dropping its stale result");
        }

        let Some(model) = self.engine.lock().clone() else {
            return Ok(None);
        };
        let options = SegmentOptions {
            internal_resolution: self.config.lock().internal_resolution(),
        };

        let frame = frame.clone();
        let mut task: InferenceTask =
            tokio::task::spawn_blocking(move || model.lock().segment(&frame, &options));

        let joined = match self.inference_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    *in_flight = Some(task);
                    return Err(PipelineError::InferenceTimeout(limit));
                }
            },
            None => task.await,
        };

        let segmentation = joined
            .map_err(|e| PipelineError::Inference(e.into()))?
            .map_err(PipelineError::Inference)?;
        Ok(Some(segmentation))
    }

    pub fn mode(&self) -> Mode {
        self.mode.lock().mode()
    }

    pub fn blur(&self) -> bool {
        self.mode.lock().blur()
    }

    /// Toggle blur mode; turning it on turns substitute off
    pub fn set_blur(&self, on: bool) {
        self.mode.lock().set_blur(on);
    }

    pub fn substitute(&self) -> bool {
        self.mode.lock().substitute()
    }

    /// Toggle substitute mode; turning it on turns blur off
    pub fn set_substitute(&self, on: bool) {
        self.mode.lock().set_substitute(on);
    }

    pub fn effects(&self) -> EffectSettings {
        *self.effects.lock()
    }

    pub fn set_background_blur(&self, radius: u32) -> Result<(), PipelineError> {
        self.effects.lock().background_blur = check_blur_radius(radius)?;
        Ok(())
    }

    pub fn set_edge_blur(&self, radius: u32) -> Result<(), PipelineError> {
        self.effects.lock().edge_blur = check_blur_radius(radius)?;
        Ok(())
    }

    pub fn set_flip_horizontal(&self, flip: bool) {
        self.effects.lock().flip_horizontal = flip;
    }

    pub fn set_blur_backend(&self, backend: BlurBackend) {
        self.effects.lock().blur_backend = backend;
    }

    pub fn config(&self) -> InferenceConfig {
        *self.config.lock()
    }

    /// Change inference parameters through the validating setters
    ///
    /// The internal resolution takes effect on the next frame; everything
    /// else needs a `reload()`.
    pub fn configure<R>(&self, f: impl FnOnce(&mut InferenceConfig) -> R) -> R {
        f(&mut self.config.lock())
    }

    /// Replace the inference engine with one built from the current config
    ///
    /// An inference call already in flight finishes on the old engine.
    /// Callers should stop the loop first; this is not enforced.
    pub fn reload(&self) -> Result<(), PipelineError> {
        let Some(factory) = &self.factory else {
            tracing::debug!("No model factory, skipping engine load");
            return Ok(());
        };

        let config = self.config();
        validate(&config)?;
        let model = factory.create(&config).map_err(PipelineError::ModelLoad)?;
        *self.engine.lock() = Some(Arc::new(Mutex::new(model)));

        tracing::info!("Inference engine loaded ({})", config.model_file_name());
        Ok(())
    }

    pub fn has_engine(&self) -> bool {
        self.engine.lock().is_some()
    }

    /// Handle to the background surface read by substitute mode
    pub fn background(&self) -> SharedSurface {
        self.background.clone()
    }

    /// Load a substitution image in the background
    ///
    /// Returns immediately. Overlapping loads are not ordered: whichever
    /// finishes decoding last is the one that stays visible. Must be called
    /// from within a Tokio runtime.
    pub fn set_substitution_image(
        &self,
        source: impl Into<ImageSource>,
    ) -> JoinHandle<Result<(), PipelineError>> {
        tokio::spawn(load_background(self.background.clone(), source.into()))
    }
}

/// Cooperative end-of-frame yield, sleeping off any remaining frame budget
async fn end_frame(started: Instant, budget: Option<Duration>) {
    match budget.and_then(|budget| budget.checked_sub(started.elapsed())) {
        Some(remaining) if !remaining.is_zero() => tokio::time::sleep(remaining).await,
        _ => tokio::task::yield_now().await,
    }
}
