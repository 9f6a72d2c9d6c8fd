use super::OutputSink;
use crate::canvas::Surface;
use anyhow::{Context, Result};
use image::RgbaImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

/// Virtual camera backed by a v4l2loopback device
pub struct V4L2Output {
    // Held open so the negotiated format stays in effect
    _device: Device,
    file: File,
    canvas: Surface,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        match Self::negotiate_format(&device, width, height) {
            Ok(()) => tracing::debug!("Output format set to YUYV {}x{}", width, height),
            Err(err) => tracing::warn!("Could not set output format, writing anyway: {:#}", err),
        }

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        let canvas = Surface::new(width, height).context("Invalid output resolution")?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            _device: device,
            file,
            canvas,
            width,
            height,
        })
    }

    fn negotiate_format(device: &Device, width: u32, height: u32) -> Result<()> {
        let mut format = Output::format(device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YUYV");
        Output::set_format(device, &format).context("Failed to set output format")?;
        Ok(())
    }

    /// Convert RGBA frame to YUV422 (YUYV) format, ignoring alpha
    /// v4l2loopback typically expects YUYV format
    fn rgba_to_yuyv(image: &RgbaImage) -> Vec<u8> {
        let (width, height) = image.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for y in 0..height {
            for x in (0..width).step_by(2) {
                let pixel1 = image.get_pixel(x, y);
                let pixel2 = if x + 1 < width {
                    image.get_pixel(x + 1, y)
                } else {
                    pixel1
                };

                let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
                let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

                // Average U and V for the pair of pixels
                let u = ((u1 as u16 + u2 as u16) / 2) as u8;
                let v = ((v1 as u16 + v2 as u16) / 2) as u8;

                // YUYV format: Y0 U Y1 V
                yuyv.extend_from_slice(&[y1, u, y2, v]);
            }
        }

        yuyv
    }
}

/// Convert RGB to YUV color space
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn canvas(&mut self) -> Option<&mut Surface> {
        Some(&mut self.canvas)
    }

    fn present(&mut self) -> Result<()> {
        let _span = tracing::debug_span!("present").entered();

        // Effects may have resized the canvas
        let yuyv_data = if self.canvas.dimensions() != (self.width, self.height) {
            let resized = image::imageops::resize(
                self.canvas.image(),
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            Self::rgba_to_yuyv(&resized)
        } else {
            Self::rgba_to_yuyv(self.canvas.image())
        };

        self.file
            .write_all(&yuyv_data)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn black_and_white_map_to_luma_extremes() {
        assert_eq!(rgb_to_yuv(0, 0, 0), (0, 128, 128));
        assert!(rgb_to_yuv(255, 255, 255).0 >= 254);
    }

    #[test]
    fn yuyv_packs_two_pixels_in_four_bytes() {
        let image = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
        let yuyv = V4L2Output::rgba_to_yuyv(&image);
        assert_eq!(yuyv.len(), 4 * 2 * 2);
        assert_eq!(&yuyv[..4], &[0, 128, 0, 128]);
    }
}
