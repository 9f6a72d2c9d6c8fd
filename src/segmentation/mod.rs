mod config;
mod onnx;
mod preprocess;
pub mod types;

pub use config::{
    normalize, validate, Architecture, ConfigError, InferenceConfig, InternalResolution,
    Multiplier, OutputStride, Pinned, QuantBytes,
};
pub use onnx::OnnxSegmenter;
pub use preprocess::{input_resolution, valid_input_resolution, Preprocessor};
pub use types::{PersonMask, SegmentOptions, Segmentation, SegmentationModel};

use anyhow::Result;
use std::path::PathBuf;

/// Builds an inference engine for a configuration
///
/// Called once at setup and again on every reload.
pub trait ModelFactory {
    fn create(&self, config: &InferenceConfig) -> Result<Box<dyn SegmentationModel>>;
}

/// Loads ONNX exports named after their configuration from one directory
pub struct OnnxModelFactory {
    models_dir: PathBuf,
    intra_threads: usize,
}

impl OnnxModelFactory {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            intra_threads: 4,
        }
    }

    pub fn with_intra_threads(mut self, intra_threads: usize) -> Self {
        self.intra_threads = intra_threads;
        self
    }
}

impl ModelFactory for OnnxModelFactory {
    fn create(&self, config: &InferenceConfig) -> Result<Box<dyn SegmentationModel>> {
        let path = self.models_dir.join(config.model_file_name());
        let model = OnnxSegmenter::new(path, config, self.intra_threads)?;
        Ok(Box::new(model))
    }
}
