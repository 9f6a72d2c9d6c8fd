use std::time::Duration;

use thiserror::Error;

use crate::segmentation::ConfigError;

/// Errors raised by drawing surfaces
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("surface dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("person mask is {mask_width}x{mask_height}, expected {width}x{height}")]
    MaskSizeMismatch {
        mask_width: u32,
        mask_height: u32,
        width: u32,
        height: u32,
    },

    #[error("person mask holds {actual} pixels, expected {expected}")]
    MaskDataLength { expected: usize, actual: usize },
}

/// Errors raised by a pipeline session
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("session is not initialized, run init() first")]
    NotInitialized,

    #[error("could not get a 2D drawing context from the output surface")]
    ContextUnavailable,

    #[error("render loop is already running")]
    AlreadyRunning,

    #[error("failed to capture frame")]
    Capture(#[source] anyhow::Error),

    #[error("failed to load segmentation model")]
    ModelLoad(#[source] anyhow::Error),

    #[error("segmentation failed")]
    Inference(#[source] anyhow::Error),

    #[error("segmentation did not finish within {0:?}")]
    InferenceTimeout(Duration),

    #[error("failed to present frame")]
    Output(#[source] anyhow::Error),

    #[error("failed to load background image")]
    Background(#[source] anyhow::Error),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
