use anyhow::Result;
use image::RgbImage;

use super::config::InternalResolution;

/// Per-pixel person classification for one frame
///
/// Row-major, one byte per pixel: 0 = background, anything else = person.
/// Dimensions match the frame the mask was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PersonMask {
    /// A mask with every pixel set to background
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height) as usize],
        }
    }

    /// A mask with every pixel set to person
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![1; (width * height) as usize],
        }
    }

    pub fn is_person(&self, x: u32, y: u32) -> bool {
        self.data[(y * self.width + x) as usize] != 0
    }
}

/// Output of one segmentation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segmentation {
    /// One mask covering every person in the frame
    Semantic(PersonMask),
    /// One mask per detected person, possibly none
    People(Vec<PersonMask>),
}

impl Segmentation {
    /// True when no person was detected at all
    pub fn is_empty(&self) -> bool {
        matches!(self, Segmentation::People(people) if people.is_empty())
    }

    pub fn masks(&self) -> &[PersonMask] {
        match self {
            Segmentation::Semantic(mask) => std::slice::from_ref(mask),
            Segmentation::People(people) => people,
        }
    }
}

/// Per-call inference options
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SegmentOptions {
    pub internal_resolution: InternalResolution,
}

/// Trait for segmentation models
/// Allows swapping between different backends
pub trait SegmentationModel: Send {
    /// Segment the people in a frame
    ///
    /// Masks in the result have the frame's dimensions.
    fn segment(&mut self, frame: &RgbImage, options: &SegmentOptions) -> Result<Segmentation>;
}
