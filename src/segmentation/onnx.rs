use super::config::{InferenceConfig, OutputStride};
use super::preprocess::{input_resolution, Preprocessor};
use super::types::{Segmentation, SegmentOptions, SegmentationModel};
use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Probability above which a pixel is classified as person
const SEGMENTATION_THRESHOLD: f32 = 0.7;

/// Person segmentation network exported to ONNX
///
/// Expects an NHWC float input of `k * output_stride + 1` pixels per side and
/// produces one channel of segmentation logits at input / output_stride.
pub struct OnnxSegmenter {
    session: Session,
    preprocessor: Preprocessor,
    output_stride: OutputStride,
    threshold: f32,
}

impl OnnxSegmenter {
    /// Load the model at `model_path` for the given configuration
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        config: &InferenceConfig,
        intra_threads: usize,
    ) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!(
            "Loading {} segmentation model from {}",
            config.architecture(),
            path.display()
        );

        let session = Session::builder()
            .map_err(|e| anyhow!("Failed to create session builder: {e}"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Failed to set optimization level: {e}"))?
            .with_intra_threads(intra_threads)
            .map_err(|e| anyhow!("Failed to set threads: {e}"))?
            .commit_from_file(path)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("Segmentation model loaded successfully");

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(config.architecture()),
            output_stride: config.output_stride(),
            threshold: SEGMENTATION_THRESHOLD,
        })
    }
}

impl SegmentationModel for OnnxSegmenter {
    fn segment(&mut self, frame: &RgbImage, options: &SegmentOptions) -> Result<Segmentation> {
        let _span = tracing::debug_span!("onnx_segment").entered();

        let target = input_resolution(
            frame.dimensions(),
            options.internal_resolution,
            self.output_stride,
        );
        let input = Tensor::from_array(self.preprocessor.preprocess(frame, target))?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![input])
            .context("Failed to run inference")?;
        drop(_infer_span);

        let (shape, logits) = outputs[0].try_extract_tensor::<f32>()?;

        // Either NHWC [1, H, W, 1] or NCHW [1, 1, H, W]
        let (height, width) = match **shape {
            [1, h, w, 1] => (h, w),
            [1, 1, h, w] => (h, w),
            ref other => bail!("Unexpected segmentation output shape {:?}", other),
        };

        let mask = Preprocessor::postprocess_logits(
            logits,
            width as u32,
            height as u32,
            frame.dimensions(),
            self.threshold,
        )?;

        Ok(Segmentation::Semantic(mask))
    }
}
