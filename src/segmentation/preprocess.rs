use anyhow::{ensure, Result};
use image::{imageops, GrayImage, Luma, RgbImage};
use ndarray::Array4;

use super::config::{Architecture, InternalResolution, OutputStride};
use super::types::PersonMask;

/// ImageNet channel means subtracted from ResNet50 input
const RESNET_MEAN: [f32; 3] = [-123.15, -115.90, -103.06];

/// Snap `size` to the form `k * stride + 1` (rounding `k` down), never below `stride + 1`
pub fn valid_input_resolution(size: u32, stride: u32) -> u32 {
    if size > stride && (size - 1) % stride == 0 {
        return size;
    }
    ((size / stride) * stride + 1).max(stride + 1)
}

/// Network input (width, height) for a frame of `frame` dimensions
pub fn input_resolution(
    frame: (u32, u32),
    internal_resolution: InternalResolution,
    output_stride: OutputStride,
) -> (u32, u32) {
    let scale = internal_resolution.as_f32();
    let stride = output_stride.as_u32();
    let scaled = |v: u32| (v as f32 * scale) as u32;
    (
        valid_input_resolution(scaled(frame.0), stride),
        valid_input_resolution(scaled(frame.1), stride),
    )
}

/// Preprocessor for converting RGB frames to model input tensors
pub struct Preprocessor {
    architecture: Architecture,
}

impl Preprocessor {
    pub fn new(architecture: Architecture) -> Self {
        Self { architecture }
    }

    /// Preprocess an RGB image into a normalized NHWC tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Normalize per architecture (MobileNet to [-1, 1], ResNet mean-subtracted)
    /// 3. Lay out as [1, height, width, 3]
    pub fn preprocess(&self, image: &RgbImage, target: (u32, u32)) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != target {
            resized = imageops::resize(image, target.0, target.1, imageops::FilterType::Triangle);
            &resized
        } else {
            image
        };

        let (width, height) = source.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, height as usize, width as usize, 3));

        for (x, y, pixel) in source.enumerate_pixels() {
            for c in 0..3 {
                let v = f32::from(pixel[c]);
                tensor[[0, y as usize, x as usize, c]] = match self.architecture {
                    Architecture::MobileNetV1 => v / 127.5 - 1.0,
                    Architecture::ResNet50 => v + RESNET_MEAN[c],
                };
            }
        }

        tensor
    }

    /// Turn segmentation logits into a binary person mask at frame resolution
    ///
    /// # Arguments
    /// * `logits` - Row-major logits at model output resolution
    /// * `logits_width` / `logits_height` - Model output dimensions
    /// * `target` - Frame (width, height)
    /// * `threshold` - Probability above which a pixel counts as person
    pub fn postprocess_logits(
        logits: &[f32],
        logits_width: u32,
        logits_height: u32,
        target: (u32, u32),
        threshold: f32,
    ) -> Result<PersonMask> {
        let _span = tracing::debug_span!("postprocess").entered();

        ensure!(
            logits.len() == (logits_width * logits_height) as usize,
            "expected {}x{} logits, got {} values",
            logits_width,
            logits_height,
            logits.len()
        );

        let probabilities = GrayImage::from_fn(logits_width, logits_height, |x, y| {
            let logit = logits[(y * logits_width + x) as usize];
            let p = 1.0 / (1.0 + (-logit).exp());
            Luma([(p * 255.0).round().clamp(0.0, 255.0) as u8])
        });

        let scaled = if probabilities.dimensions() != target {
            imageops::resize(
                &probabilities,
                target.0,
                target.1,
                imageops::FilterType::Triangle,
            )
        } else {
            probabilities
        };

        let cutoff = threshold * 255.0;
        let data = scaled
            .pixels()
            .map(|p| u8::from(f32::from(p[0]) > cutoff))
            .collect();

        Ok(PersonMask {
            width: target.0,
            height: target.1,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_input_resolution_snaps_to_stride() {
        assert_eq!(valid_input_resolution(257, 16), 257);
        assert_eq!(valid_input_resolution(240, 16), 241);
        assert_eq!(valid_input_resolution(360, 8), 361);
        assert_eq!(valid_input_resolution(4, 16), 17);
    }

    #[test]
    fn input_resolution_applies_internal_scale() {
        let size = input_resolution((720, 480), InternalResolution::MEDIUM, OutputStride::S16);
        assert_eq!(size, (353, 241));
    }

    #[test]
    fn mobilenet_normalizes_to_unit_range() {
        let image = RgbImage::from_pixel(2, 2, image::Rgb([0, 255, 0]));
        let tensor = Preprocessor::new(Architecture::MobileNetV1).preprocess(&image, (2, 2));
        assert_eq!(tensor.shape(), &[1, 2, 2, 3]);
        assert_eq!(tensor[[0, 0, 0, 0]], -1.0);
        assert_eq!(tensor[[0, 1, 1, 1]], 1.0);
    }

    #[test]
    fn resnet_subtracts_channel_means() {
        let image = RgbImage::from_pixel(1, 1, image::Rgb([200, 200, 200]));
        let tensor = Preprocessor::new(Architecture::ResNet50).preprocess(&image, (1, 1));
        assert!((tensor[[0, 0, 0, 0]] - 76.85).abs() < 1e-3);
    }

    #[test]
    fn postprocess_thresholds_and_scales() {
        // left column strongly person, right column strongly background
        let logits = [8.0, -8.0, 8.0, -8.0];
        let mask = Preprocessor::postprocess_logits(&logits, 2, 2, (4, 2), 0.7).unwrap();
        assert_eq!((mask.width, mask.height), (4, 2));
        assert!(mask.is_person(0, 0));
        assert!(!mask.is_person(3, 1));
    }

    #[test]
    fn postprocess_rejects_short_input() {
        assert!(Preprocessor::postprocess_logits(&[0.0; 3], 2, 2, (2, 2), 0.7).is_err());
    }
}
