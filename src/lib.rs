//! Real-time webcam effects
//!
//! Frames come from a [`capture::CaptureSource`], are optionally segmented
//! into person masks, composited into an effect and handed to an
//! [`output::OutputSink`]. [`pipeline::Session`] ties the pieces together.

pub mod canvas;
pub mod capture;
pub mod effects;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod segmentation;

pub use error::{PipelineError, SurfaceError};
pub use pipeline::{Mode, Session, SessionSettings};
