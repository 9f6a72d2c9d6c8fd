//! Mask-based compositing of the live frame
//!
//! Both effects follow the same recipe on the output surface: draw the
//! frame, cut it down to the person silhouette with `DestinationIn`, then
//! fill everything around the silhouette with `DestinationOver`.

mod mask;

pub use mask::{prepare_person_mask, render_person_mask};

use image::RgbaImage;

use crate::canvas::{blur_onto, BlurBackend, CompositeOp, OffscreenCache, Surface, BLURRED};
use crate::error::SurfaceError;
use crate::segmentation::{ConfigError, Segmentation};

/// Largest accepted blur radius, in pixels
pub const MAX_BLUR_RADIUS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectSettings {
    /// Blur applied to the frame behind the person in blur mode
    pub background_blur: u32,
    /// Blur applied to the silhouette edge
    pub edge_blur: u32,
    /// Mirror the live frame
    pub flip_horizontal: bool,
    pub blur_backend: BlurBackend,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            background_blur: 3,
            edge_blur: 3,
            flip_horizontal: false,
            blur_backend: BlurBackend::Native,
        }
    }
}

pub fn check_blur_radius(radius: u32) -> Result<u32, ConfigError> {
    if radius > MAX_BLUR_RADIUS {
        return Err(ConfigError::BlurRadius {
            radius,
            max: MAX_BLUR_RADIUS,
        });
    }
    Ok(radius)
}

/// Replace everything but the people in `frame` with `background`
///
/// `output` takes the background's dimensions. With an empty segmentation
/// the background is drawn as is. Mirroring applies to the frame and its
/// mask only, never to the background.
#[allow(clippy::too_many_arguments)]
pub fn substitute_background(
    output: &mut Surface,
    frame: &RgbaImage,
    background: &Surface,
    segmentation: &Segmentation,
    edge_blur: u32,
    flip_horizontal: bool,
    backend: BlurBackend,
    cache: &mut OffscreenCache,
) -> Result<(), SurfaceError> {
    let _span = tracing::debug_span!("substitute_background").entered();

    let (width, height) = background.dimensions();
    output.resize(width, height)?;

    if segmentation.is_empty() {
        output.draw_image_at(background.image(), 0.0, 0.0);
        return Ok(());
    }

    let mask_name = prepare_person_mask(cache, segmentation, edge_blur, backend)?;
    let Some(mask) = cache.get(mask_name) else {
        return Ok(());
    };

    output.save();
    if flip_horizontal {
        output.flip_horizontal();
    }
    output.draw_image_at(frame, 0.0, 0.0);

    output.set_composite(CompositeOp::DestinationIn);
    output.draw_image_at(mask.image(), 0.0, 0.0);

    output.reset_transform();
    output.set_composite(CompositeOp::DestinationOver);
    output.draw_image_at(background.image(), 0.0, 0.0);
    output.restore();

    Ok(())
}

/// Keep the people in `frame` sharp and defocus everything around them
///
/// `output` takes the frame's dimensions. The backdrop is the frame itself,
/// blurred by `settings.background_blur`, so it mirrors along with the frame.
pub fn draw_bokeh_effect(
    output: &mut Surface,
    frame: &RgbaImage,
    segmentation: &Segmentation,
    settings: &EffectSettings,
    cache: &mut OffscreenCache,
) -> Result<(), SurfaceError> {
    let _span = tracing::debug_span!("bokeh").entered();

    blur_onto(
        frame,
        settings.background_blur,
        settings.blur_backend,
        cache.surface(BLURRED),
    )?;

    let (width, height) = frame.dimensions();
    output.resize(width, height)?;

    let mask_name = if segmentation.is_empty() {
        None
    } else {
        Some(prepare_person_mask(
            cache,
            segmentation,
            settings.edge_blur,
            settings.blur_backend,
        )?)
    };

    let Some(blurred) = cache.get(BLURRED) else {
        return Ok(());
    };

    output.save();
    if settings.flip_horizontal {
        output.flip_horizontal();
    }

    match mask_name.and_then(|name| cache.get(name)) {
        None => output.draw_image_at(blurred.image(), 0.0, 0.0),
        Some(mask) => {
            output.draw_image_at(frame, 0.0, 0.0);

            output.set_composite(CompositeOp::DestinationIn);
            output.draw_image_at(mask.image(), 0.0, 0.0);

            output.set_composite(CompositeOp::DestinationOver);
            output.draw_image_at(blurred.image(), 0.0, 0.0);
        }
    }
    output.restore();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{BLURRED_MASK, GREEN};
    use crate::segmentation::PersonMask;
    use image::Rgba;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn background(w: u32, h: u32) -> Surface {
        let mut surface = Surface::new(w, h).unwrap();
        surface.fill(GREEN);
        surface
    }

    fn left_half(w: u32, h: u32) -> Segmentation {
        let data = (0..w * h).map(|i| u8::from(i % w < w / 2)).collect();
        Segmentation::Semantic(PersonMask {
            width: w,
            height: h,
            data,
        })
    }

    /// Red on the left half, blue on the right
    fn split_frame(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, _| if x < w / 2 { RED } else { BLUE })
    }

    #[test]
    fn empty_segmentation_draws_background_unchanged() {
        let mut output = Surface::new(2, 2).unwrap();
        let mut cache = OffscreenCache::new();
        let bg = background(6, 4);

        substitute_background(
            &mut output,
            &split_frame(6, 4),
            &bg,
            &Segmentation::People(vec![]),
            3,
            false,
            BlurBackend::Native,
            &mut cache,
        )
        .unwrap();

        assert_eq!(output.image(), bg.image());
        assert!(cache.is_empty());
    }

    #[test]
    fn substitution_keeps_person_and_replaces_the_rest() {
        let mut output = Surface::new(8, 2).unwrap();
        let mut cache = OffscreenCache::new();

        substitute_background(
            &mut output,
            &split_frame(8, 2),
            &background(8, 2),
            &left_half(8, 2),
            0,
            false,
            BlurBackend::Native,
            &mut cache,
        )
        .unwrap();

        assert_eq!(*output.image().get_pixel(0, 0), RED);
        assert_eq!(*output.image().get_pixel(7, 1), GREEN);
        assert!(cache.get(BLURRED_MASK).is_none());
    }

    #[test]
    fn flip_mirrors_frame_but_not_background() {
        let mut output = Surface::new(8, 1).unwrap();
        let mut cache = OffscreenCache::new();
        let mut bg = Surface::new(8, 1).unwrap();
        // gradient background so a mirrored copy would be detectable
        for x in 0..8 {
            bg.image_mut().put_pixel(x, 0, Rgba([0, (x * 30) as u8, 0, 255]));
        }

        substitute_background(
            &mut output,
            &split_frame(8, 1),
            &bg,
            &left_half(8, 1),
            0,
            true,
            BlurBackend::Native,
            &mut cache,
        )
        .unwrap();

        // the red person now sits on the right
        assert_eq!(*output.image().get_pixel(7, 0), RED);
        // the left side shows the background in its original orientation
        assert_eq!(*output.image().get_pixel(0, 0), *bg.image().get_pixel(0, 0));
        assert_eq!(*output.image().get_pixel(1, 0), *bg.image().get_pixel(1, 0));
    }

    #[test]
    fn edge_blur_feathers_the_silhouette() {
        let mut output = Surface::new(1, 1).unwrap();
        let mut cache = OffscreenCache::new();

        substitute_background(
            &mut output,
            &split_frame(16, 4),
            &background(16, 4),
            &left_half(16, 4),
            2,
            false,
            BlurBackend::Cpu,
            &mut cache,
        )
        .unwrap();

        let edge = output.image().get_pixel(8, 1);
        assert!(edge[1] > 0, "background should bleed into the edge");
        assert!(edge[2] > 0, "frame should bleed into the edge");
        assert_eq!(edge[3], 255);
    }

    #[test]
    fn bokeh_without_people_shows_blurred_frame() {
        let mut output = Surface::new(1, 1).unwrap();
        let mut cache = OffscreenCache::new();
        let settings = EffectSettings {
            background_blur: 0,
            ..EffectSettings::default()
        };
        let frame = split_frame(4, 2);

        draw_bokeh_effect(
            &mut output,
            &frame,
            &Segmentation::People(vec![]),
            &settings,
            &mut cache,
        )
        .unwrap();

        assert_eq!(output.image(), &frame);
    }

    #[test]
    fn bokeh_keeps_person_sharp() {
        let mut output = Surface::new(1, 1).unwrap();
        let mut cache = OffscreenCache::new();
        let settings = EffectSettings {
            background_blur: 4,
            edge_blur: 0,
            ..EffectSettings::default()
        };

        draw_bokeh_effect(
            &mut output,
            &split_frame(16, 4),
            &left_half(16, 4),
            &settings,
            &mut cache,
        )
        .unwrap();

        assert_eq!(output.dimensions(), (16, 4));
        // the sharp person pixel next to the edge is untouched by the blur
        assert_eq!(*output.image().get_pixel(7, 0), RED);
        // the background next to the edge picked up red from the blurred frame
        assert!(output.image().get_pixel(8, 0)[0] > 0);
        assert!(cache.get(BLURRED).is_some());
    }

    #[test]
    fn blur_radius_is_bounded() {
        assert_eq!(check_blur_radius(20), Ok(20));
        assert!(check_blur_radius(21).is_err());
    }
}
