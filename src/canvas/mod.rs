//! Drawing surfaces
//!
//! A `Surface` is an RGBA raster with a small 2D drawing state on top:
//! an axis-aligned scale/translate transform and a compositing operator,
//! both saved and restored as a stack. Images are drawn through the
//! transform with nearest-neighbour sampling.

mod blur;
mod cache;
mod composite;
mod text;

pub use blur::{blur_onto, BlurBackend};
pub use cache::{OffscreenCache, BLURRED, BLURRED_MASK, MASK};
pub use composite::{CompositeOp, TRANSPARENT};
pub use text::draw_text;

use std::sync::atomic::{AtomicU64, Ordering};

use image::{Rgba, RgbaImage};

use crate::error::SurfaceError;

pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a surface, stable across resizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

/// Axis-aligned affine transform: `device = scale * user + translate`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub sx: f32,
    pub sy: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        sx: 1.0,
        sy: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DrawState {
    transform: Transform,
    composite: CompositeOp,
}

pub struct Surface {
    id: SurfaceId,
    pixels: RgbaImage,
    state: DrawState,
    saved: Vec<DrawState>,
}

impl Surface {
    /// Create a transparent surface
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        check_dimensions(width, height)?;
        Ok(Self::with_pixels(RgbaImage::new(width, height)))
    }

    /// Create a surface holding a copy of `image`
    pub fn from_image(image: &RgbaImage) -> Result<Self, SurfaceError> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self::with_pixels(image.clone()))
    }

    /// A 1x1 surface for lazily created offscreen slots
    pub(crate) fn blank() -> Self {
        Self::with_pixels(RgbaImage::new(1, 1))
    }

    fn with_pixels(pixels: RgbaImage) -> Self {
        Self {
            id: SurfaceId(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed)),
            pixels,
            state: DrawState::default(),
            saved: Vec::new(),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Direct pixel access, bypassing transform and compositing
    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    /// Set the surface size
    ///
    /// Like a canvas, resizing always clears the content and resets the
    /// drawing state, even when the dimensions do not change. The pixel
    /// buffer is reused when the size is unchanged.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        check_dimensions(width, height)?;
        if self.pixels.dimensions() == (width, height) {
            self.clear();
        } else {
            self.pixels = RgbaImage::new(width, height);
        }
        self.state = DrawState::default();
        self.saved.clear();
        Ok(())
    }

    /// Make every pixel transparent
    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = TRANSPARENT;
        }
    }

    /// Fill the whole surface with `color` using the current compositing operator
    pub fn fill(&mut self, color: Rgba<u8>) {
        let op = self.state.composite;
        for px in self.pixels.pixels_mut() {
            *px = op.apply(*px, color);
        }
    }

    /// Replace the content with `image`, resizing to match
    ///
    /// Ignores transform and compositing.
    pub fn put_image(&mut self, image: &RgbaImage) -> Result<(), SurfaceError> {
        check_dimensions(image.width(), image.height())?;
        if self.pixels.dimensions() == image.dimensions() {
            self.pixels.copy_from_slice(image.as_raw());
        } else {
            self.pixels = image.clone();
        }
        Ok(())
    }

    pub fn save(&mut self) {
        self.saved.push(self.state);
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    pub fn transform(&self) -> Transform {
        self.state.transform
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        let t = &mut self.state.transform;
        t.sx *= sx;
        t.sy *= sy;
    }

    pub fn translate(&mut self, tx: f32, ty: f32) {
        let t = &mut self.state.transform;
        t.tx += t.sx * tx;
        t.ty += t.sy * ty;
    }

    pub fn reset_transform(&mut self) {
        self.state.transform = Transform::IDENTITY;
    }

    /// Mirror subsequent drawing along the vertical centre line
    pub fn flip_horizontal(&mut self) {
        let width = self.width() as f32;
        self.scale(-1.0, 1.0);
        self.translate(-width, 0.0);
    }

    pub fn composite(&self) -> CompositeOp {
        self.state.composite
    }

    pub fn set_composite(&mut self, op: CompositeOp) {
        self.state.composite = op;
    }

    /// Draw `image` at its native size with its top-left corner at (`dx`, `dy`)
    pub fn draw_image_at(&mut self, image: &RgbaImage, dx: f32, dy: f32) {
        let (w, h) = image.dimensions();
        self.draw_image(image, dx, dy, w as f32, h as f32);
    }

    /// Draw `image` scaled into the user-space rectangle (`dx`, `dy`, `dw`, `dh`)
    pub fn draw_image(&mut self, image: &RgbaImage, dx: f32, dy: f32, dw: f32, dh: f32) {
        let (iw, ih) = image.dimensions();
        if iw == 0 || ih == 0 {
            return;
        }
        let DrawState { transform, composite } = self.state;
        let (width, height) = self.pixels.dimensions();

        if composite.transparent_is_noop()
            && transform.is_identity()
            && (dx, dy) == (0.0, 0.0)
            && (dw, dh) == (width as f32, height as f32)
            && image.dimensions() == (width, height)
        {
            for (dst, src) in self.pixels.pixels_mut().zip(image.pixels()) {
                *dst = composite.apply(*dst, *src);
            }
            return;
        }

        let cols = axis_map(width, transform.sx, transform.tx, dx, dw, iw);
        let rows = axis_map(height, transform.sy, transform.ty, dy, dh, ih);

        for (y, row) in rows.iter().enumerate() {
            if row.is_none() && composite.transparent_is_noop() {
                continue;
            }
            for (x, col) in cols.iter().enumerate() {
                let src = match (col, row) {
                    (Some(sx), Some(sy)) => *image.get_pixel(*sx, *sy),
                    _ => TRANSPARENT,
                };
                if src[3] == 0 && composite.transparent_is_noop() {
                    continue;
                }
                let dst = self.pixels.get_pixel_mut(x as u32, y as u32);
                *dst = composite.apply(*dst, src);
            }
        }
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<(), SurfaceError> {
    if width == 0 || height == 0 {
        return Err(SurfaceError::InvalidDimensions { width, height });
    }
    Ok(())
}

/// For each device pixel along one axis, the source pixel it samples (if any)
fn axis_map(
    len: u32,
    scale: f32,
    offset: f32,
    start: f32,
    extent: f32,
    src_len: u32,
) -> Vec<Option<u32>> {
    (0..len)
        .map(|d| {
            if scale == 0.0 || extent <= 0.0 {
                return None;
            }
            let user = (d as f32 + 0.5 - offset) / scale;
            let rel = (user - start) / extent;
            if !(0.0..1.0).contains(&rel) {
                return None;
            }
            Some(((rel * src_len as f32) as u32).min(src_len - 1))
        })
        .collect()
}
