use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::{imageops, RgbaImage};
use parking_lot::RwLock;

use crate::canvas::{CompositeOp, Surface};
use crate::error::PipelineError;

/// Background surface shared between the loader and the compositor
pub type SharedSurface = Arc<RwLock<Surface>>;

/// A user-supplied background image
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes)
    }
}

/// Decode `source` and draw it stretched over the whole background
///
/// Decoding and scaling happen on the blocking pool against the size the
/// background has when the load starts. The finished image is drawn under
/// the write lock, so readers never see a half-drawn background. Loads are
/// not ordered: when several overlap, the one that finishes last wins.
pub async fn load_background(
    background: SharedSurface,
    source: ImageSource,
) -> Result<(), PipelineError> {
    let (width, height) = background.read().dimensions();

    let scaled = tokio::task::spawn_blocking(move || decode_scaled(&source, width, height))
        .await
        .map_err(|e| PipelineError::Background(e.into()))?
        .map_err(PipelineError::Background)?;

    let mut surface = background.write();
    let (width, height) = surface.dimensions();
    surface.save();
    surface.reset_transform();
    surface.set_composite(CompositeOp::SourceOver);
    surface.draw_image(&scaled, 0.0, 0.0, width as f32, height as f32);
    surface.restore();

    tracing::debug!("Background image drawn at {}x{}", width, height);
    Ok(())
}

fn decode_scaled(source: &ImageSource, width: u32, height: u32) -> Result<RgbaImage> {
    let _span = tracing::debug_span!("decode_background").entered();

    let decoded = match source {
        ImageSource::Path(path) => image::open(path)
            .with_context(|| format!("Failed to open background image {}", path.display()))?,
        ImageSource::Bytes(bytes) => {
            image::load_from_memory(bytes).context("Failed to decode background image")?
        }
    };

    Ok(imageops::resize(
        &decoded.to_rgba8(),
        width,
        height,
        imageops::FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn png(color: Rgba<u8>) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(3, 2, color)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn loaded_image_fills_background() {
        let background: SharedSurface = Arc::new(RwLock::new(Surface::new(12, 8).unwrap()));
        let red = Rgba([255, 0, 0, 255]);

        load_background(background.clone(), png(red).into())
            .await
            .unwrap();

        let surface = background.read();
        assert_eq!(surface.dimensions(), (12, 8));
        assert!(surface
            .image()
            .pixels()
            .all(|p| p[0] >= 254 && p[1] <= 1 && p[2] <= 1 && p[3] >= 254));
    }

    #[tokio::test]
    async fn undecodable_bytes_are_reported() {
        let background: SharedSurface = Arc::new(RwLock::new(Surface::new(2, 2).unwrap()));
        let err = load_background(background, vec![1, 2, 3].into())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Background(_)));
    }
}
