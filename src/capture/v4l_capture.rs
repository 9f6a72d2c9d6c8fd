use super::CaptureSource;
use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
use nokhwa::Camera;

/// Live webcam feed scaled to a fixed resolution
pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open the camera at `device_index`, asking for `width`x`height`
    ///
    /// Devices that cannot deliver exactly that size are opened at their
    /// closest mode; frames are scaled to `width`x`height` either way.
    pub fn new(device_index: u32, width: u32, height: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}",
            device_index,
            width,
            height
        );

        let index = CameraIndex::Index(device_index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::HighestResolution(
            Resolution::new(width, height),
        ));

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.resolution();
        tracing::info!(
            "Webcam initialized successfully, native {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        // nokhwa may link a different `image` release than ours
        let (width, height) = (decoded.width(), decoded.height());
        let decoded = RgbImage::from_raw(width, height, decoded.into_raw())
            .context("Decoded frame has an unexpected buffer size")?;

        if decoded.dimensions() == (self.width, self.height) {
            return Ok(decoded);
        }

        Ok(imageops::resize(
            &decoded,
            self.width,
            self.height,
            imageops::FilterType::Triangle,
        ))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
