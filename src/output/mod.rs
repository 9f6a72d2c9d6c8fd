mod loopback;

pub use loopback::V4L2Output;

use anyhow::Result;

use crate::canvas::Surface;

/// Destination for rendered frames
///
/// An output owns the surface the render loop draws into and pushes it to
/// its destination on `present()`.
pub trait OutputSink {
    /// The drawing surface, or `None` when the output cannot be drawn into
    fn canvas(&mut self) -> Option<&mut Surface>;

    /// Write the current canvas contents to the output
    fn present(&mut self) -> Result<()>;

    /// Resolution the destination was opened at
    fn resolution(&self) -> (u32, u32);
}
