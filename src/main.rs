use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use webcam_effects::canvas::BlurBackend;
use webcam_effects::capture::{CaptureSource, WebcamCapture};
use webcam_effects::effects::EffectSettings;
use webcam_effects::output::V4L2Output;
use webcam_effects::segmentation::{
    Architecture, InferenceConfig, InternalResolution, ModelFactory, Multiplier,
    OnnxModelFactory, OutputStride, QuantBytes,
};
use webcam_effects::{Session, SessionSettings};

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum EffectMode {
    #[default]
    Passthrough,
    Blur,
    Substitute,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Session resolution width
    #[arg(long, default_value_t = 720)]
    width: u32,

    /// Session resolution height
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Cap the frame rate; runs as fast as possible when unset
    #[arg(long)]
    fps: Option<u32>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Directory holding ONNX segmentation models
    /// If not provided, every mode renders as passthrough
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Effect applied at startup
    #[arg(long, value_enum, default_value_t = EffectMode::Passthrough)]
    mode: EffectMode,

    /// Image shown behind the person in substitute mode
    #[arg(long)]
    background: Option<PathBuf>,

    /// Background blur radius in blur mode (0-20)
    #[arg(long, default_value_t = 3)]
    background_blur: u32,

    /// Silhouette edge blur radius (0-20)
    #[arg(long, default_value_t = 3)]
    edge_blur: u32,

    /// Mirror the camera image
    #[arg(long)]
    flip: bool,

    /// Use the separable fixed-point blur instead of the image crate's
    #[arg(long)]
    cpu_blur: bool,

    /// Hide the frame rate overlay
    #[arg(long)]
    no_fps: bool,

    /// Skip frames whose segmentation takes longer than this many milliseconds
    #[arg(long)]
    inference_timeout_ms: Option<u64>,

    /// Segmentation backbone (mobilenetv1, resnet50)
    #[arg(long)]
    architecture: Option<Architecture>,

    /// MobileNet depth multiplier (0.5, 0.75, 1.0)
    #[arg(long)]
    multiplier: Option<Multiplier>,

    /// Output stride (8, 16, 32)
    #[arg(long)]
    output_stride: Option<OutputStride>,

    /// Weight quantization in bytes (1, 2, 4)
    #[arg(long)]
    quant_bytes: Option<QuantBytes>,

    /// Inference scale: low, medium, high, full or a number in (0, 1]
    #[arg(long)]
    internal_resolution: Option<InternalResolution>,
}

impl Args {
    /// Later parameters win where they conflict with earlier ones
    fn inference_config(&self) -> InferenceConfig {
        let mut config = InferenceConfig::default();
        if let Some(architecture) = self.architecture {
            config.set_architecture(architecture);
        }
        if let Some(multiplier) = self.multiplier {
            config.set_multiplier(multiplier);
        }
        if let Some(output_stride) = self.output_stride {
            config.set_output_stride(output_stride);
        }
        if let Some(quant_bytes) = self.quant_bytes {
            config.set_quant_bytes(quant_bytes);
        }
        if let Some(internal_resolution) = self.internal_resolution {
            config.set_internal_resolution(internal_resolution);
        }
        config
    }

    fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            effects: EffectSettings {
                background_blur: self.background_blur,
                edge_blur: self.edge_blur,
                flip_horizontal: self.flip,
                blur_backend: if self.cpu_blur {
                    BlurBackend::Cpu
                } else {
                    BlurBackend::Native
                },
            },
            target_fps: self.fps,
            inference_timeout: self.inference_timeout_ms.map(Duration::from_millis),
            show_fps: !self.no_fps,
        }
    }
}

/// How long a hung inference call may hold up exit after the loop stops
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("webcam-effects starting");
    tracing::info!("Resolution: {}x{}", args.width, args.height);
    match args.fps {
        Some(fps) => tracing::info!("Target FPS: {}", fps),
        None => tracing::info!("Target FPS: unlimited"),
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;
    let result = runtime.block_on(serve(args));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn serve(args: Args) -> Result<()> {
    let capture = WebcamCapture::new(args.input_device, args.width, args.height)
        .context("Failed to initialize webcam capture")?;
    let (width, height) = capture.resolution();

    let output = V4L2Output::new(&args.output_device, width, height)
        .context("Failed to initialize v4l2loopback output")?;

    let factory: Option<Box<dyn ModelFactory>> = match &args.models_dir {
        Some(dir) => {
            tracing::info!("Loading segmentation models from {}", dir.display());
            Some(Box::new(OnnxModelFactory::new(dir)))
        }
        None => {
            tracing::info!("No models directory, running without segmentation");
            None
        }
    };

    let session = Session::new(args.session_settings(), args.inference_config(), factory);
    session
        .init(Box::new(capture), Box::new(output))
        .context("Failed to initialize session")?;

    match args.mode {
        EffectMode::Passthrough => {}
        EffectMode::Blur => session.set_blur(true),
        EffectMode::Substitute => session.set_substitute(true),
    }

    if let Some(path) = &args.background {
        session
            .set_substitution_image(path.clone())
            .await
            .context("Background loader panicked")?
            .context("Failed to load background image")?;
    }

    tracing::info!("Press Ctrl+C to stop");

    let run = session.start();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result.context("Render loop failed"),
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, stopping"),
    }

    session.stop();
    run.await.context("Render loop failed")?;

    Ok(())
}
