mod v4l_capture;

pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbImage;

/// Live frame source feeding the render loop
pub trait CaptureSource {
    /// Grab the next frame, always at `resolution()`
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Session resolution as (width, height)
    fn resolution(&self) -> (u32, u32);
}
