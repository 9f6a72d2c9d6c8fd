use image::Rgba;

use crate::canvas::{
    blur_onto, BlurBackend, OffscreenCache, Surface, BLURRED_MASK, MASK, TRANSPARENT,
};
use crate::error::SurfaceError;
use crate::segmentation::Segmentation;

const PERSON: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Write the union of all person masks into `surface` as an alpha mask
///
/// Person pixels become opaque, everything else transparent. The surface is
/// resized to the mask dimensions. An empty segmentation yields nothing to
/// draw and leaves the surface untouched.
pub fn render_person_mask(
    segmentation: &Segmentation,
    surface: &mut Surface,
) -> Result<(), SurfaceError> {
    let masks = segmentation.masks();
    let Some(first) = masks.first() else {
        return Ok(());
    };
    let (width, height) = (first.width, first.height);

    for mask in masks {
        if (mask.width, mask.height) != (width, height) {
            return Err(SurfaceError::MaskSizeMismatch {
                mask_width: mask.width,
                mask_height: mask.height,
                width,
                height,
            });
        }
        let expected = (width as usize) * (height as usize);
        if mask.data.len() != expected {
            return Err(SurfaceError::MaskDataLength {
                expected,
                actual: mask.data.len(),
            });
        }
    }

    surface.resize(width, height)?;
    for (i, px) in surface.image_mut().pixels_mut().enumerate() {
        let person = masks.iter().any(|mask| mask.data[i] != 0);
        *px = if person { PERSON } else { TRANSPARENT };
    }
    Ok(())
}

/// Build the person mask in the offscreen cache, softening its edges when
/// `edge_blur` is non-zero, and return the name of the surface holding it
pub fn prepare_person_mask(
    cache: &mut OffscreenCache,
    segmentation: &Segmentation,
    edge_blur: u32,
    backend: BlurBackend,
) -> Result<&'static str, SurfaceError> {
    let _span = tracing::debug_span!("person_mask", edge_blur).entered();

    render_person_mask(segmentation, cache.surface(MASK))?;
    if edge_blur == 0 {
        return Ok(MASK);
    }

    if let Some((mask, blurred)) = cache.pair_mut(MASK, BLURRED_MASK) {
        blur_onto(mask.image(), edge_blur, backend, blurred)?;
    }
    Ok(BLURRED_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::PersonMask;

    fn half_mask() -> PersonMask {
        // left half is person
        PersonMask {
            width: 4,
            height: 1,
            data: vec![1, 1, 0, 0],
        }
    }

    #[test]
    fn semantic_mask_maps_person_to_opaque() {
        let mut surface = Surface::new(1, 1).unwrap();
        render_person_mask(&Segmentation::Semantic(half_mask()), &mut surface).unwrap();

        assert_eq!(surface.dimensions(), (4, 1));
        assert_eq!(surface.image().get_pixel(0, 0)[3], 255);
        assert_eq!(surface.image().get_pixel(3, 0)[3], 0);
    }

    #[test]
    fn per_person_masks_are_unioned() {
        let right = PersonMask {
            width: 4,
            height: 1,
            data: vec![0, 0, 0, 1],
        };
        let mut surface = Surface::new(1, 1).unwrap();
        render_person_mask(&Segmentation::People(vec![half_mask(), right]), &mut surface)
            .unwrap();

        let alpha: Vec<u8> = surface.image().pixels().map(|p| p[3]).collect();
        assert_eq!(alpha, vec![255, 255, 0, 255]);
    }

    #[test]
    fn mismatched_masks_are_rejected() {
        let other = PersonMask::empty(2, 2);
        let mut surface = Surface::new(1, 1).unwrap();
        let err = render_person_mask(&Segmentation::People(vec![half_mask(), other]), &mut surface)
            .unwrap_err();
        assert!(matches!(err, SurfaceError::MaskSizeMismatch { .. }));
    }

    #[test]
    fn zero_edge_blur_uses_raw_mask() {
        let mut cache = OffscreenCache::new();
        let segmentation = Segmentation::Semantic(half_mask());
        let name = prepare_person_mask(&mut cache, &segmentation, 0, BlurBackend::Cpu).unwrap();

        assert_eq!(name, MASK);
        assert!(cache.get(BLURRED_MASK).is_none());
    }

    #[test]
    fn edge_blur_softens_into_second_surface() {
        let mut cache = OffscreenCache::new();
        let segmentation = Segmentation::Semantic(half_mask());
        let name = prepare_person_mask(&mut cache, &segmentation, 1, BlurBackend::Cpu).unwrap();

        assert_eq!(name, BLURRED_MASK);
        let blurred = cache.get(BLURRED_MASK).unwrap();
        let edge = blurred.image().get_pixel(2, 0)[3];
        assert!(edge > 0 && edge < 255);
        // the raw mask stays crisp
        assert_eq!(cache.get(MASK).unwrap().image().get_pixel(2, 0)[3], 0);
    }
}
