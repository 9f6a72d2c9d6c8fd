use image::{imageops, RgbaImage};

use super::Surface;
use crate::error::SurfaceError;

/// Which blur implementation renders soft edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlurBackend {
    /// `image`'s built-in Gaussian blur
    #[default]
    Native,
    /// Separable fixed-point Gaussian for targets where the native filter is unavailable
    Cpu,
}

/// Resize `dst` to `src`, then draw `src` blurred by `radius` pixels into it
///
/// A radius of 0 copies `src` unchanged.
pub fn blur_onto(
    src: &RgbaImage,
    radius: u32,
    backend: BlurBackend,
    dst: &mut Surface,
) -> Result<(), SurfaceError> {
    let _span = tracing::debug_span!("blur", radius, ?backend).entered();

    let (width, height) = src.dimensions();
    dst.resize(width, height)?;
    if radius == 0 {
        return dst.put_image(src);
    }

    match backend {
        BlurBackend::Native => dst.put_image(&imageops::blur(src, radius as f32)),
        BlurBackend::Cpu => {
            let kernel = gaussian_kernel_q16(radius as f32);
            let mut tmp = vec![0u8; src.as_raw().len()];
            horizontal_pass(src.as_raw(), &mut tmp, width, height, &kernel);
            vertical_pass(&tmp, dst.image_mut(), width, height, &kernel);
            Ok(())
        }
    }
}

/// Normalised Gaussian weights in Q16, covering three standard deviations
fn gaussian_kernel_q16(sigma: f32) -> Vec<u32> {
    let r = (sigma * 3.0).ceil() as i32;
    let denom = 2.0 * f64::from(sigma) * f64::from(sigma);
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();

    let mut weights: Vec<u32> = weights_f
        .iter()
        .map(|w| ((w / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();

    // Push the rounding error into the centre tap so the kernel sums to exactly 1.0
    let acc: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let mid = weights.len() / 2;
    weights[mid] = (i64::from(weights[mid]) + 65536 - acc).clamp(0, 65536) as u32;
    weights
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    for y in 0..height as i32 {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sx = (x + ki as i32 - radius).clamp(0, w - 1);
                let idx = ((y * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, k: &[u32]) {
    let radius = (k.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in k.iter().enumerate() {
                let sy = (y + ki as i32 - radius).clamp(0, h - 1);
                let idx = ((sy * w + x) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out + c] = q16_to_u8(acc[c]);
            }
        }
    }
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}
