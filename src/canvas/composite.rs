//! Per-pixel compositing operators on straight (non-premultiplied) RGBA8.

use image::Rgba;

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// How a newly drawn pixel combines with what the surface already holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompositeOp {
    /// New content is drawn over existing content
    #[default]
    SourceOver,
    /// Existing content is kept only where new content overlaps it,
    /// everything else becomes transparent
    DestinationIn,
    /// Existing content is kept and new content fills in wherever the
    /// existing content is not opaque
    DestinationOver,
    /// New content replaces existing content
    Copy,
}

impl CompositeOp {
    /// Whether drawing a fully transparent source pixel leaves the destination untouched
    pub(crate) fn transparent_is_noop(self) -> bool {
        matches!(self, CompositeOp::SourceOver | CompositeOp::DestinationOver)
    }

    pub fn apply(self, dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
        match self {
            CompositeOp::SourceOver => over(dst, src),
            CompositeOp::DestinationIn => destination_in(dst, src),
            CompositeOp::DestinationOver => over(src, dst),
            CompositeOp::Copy => src,
        }
    }
}

/// `top` over `bottom`
pub fn over(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let ta = top[3];
    if ta == 255 {
        return top;
    }
    if ta == 0 {
        return bottom;
    }
    let ba = bottom[3];
    if ba == 0 {
        return top;
    }

    let ta = f32::from(ta) / 255.0;
    let ba = f32::from(ba) / 255.0;
    let out_a = ta + ba * (1.0 - ta);

    let mut out = [0u8; 4];
    for c in 0..3 {
        let tc = f32::from(top[c]);
        let bc = f32::from(bottom[c]);
        out[c] = to_u8((tc * ta + bc * ba * (1.0 - ta)) / out_a);
    }
    out[3] = to_u8(out_a * 255.0);
    Rgba(out)
}

pub fn destination_in(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = u32::from(src[3]);
    if sa == 255 {
        return dst;
    }
    let a = (u32::from(dst[3]) * sa + 127) / 255;
    if a == 0 {
        return TRANSPARENT;
    }
    Rgba([dst[0], dst[1], dst[2], a as u8])
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opaque_top_replaces_bottom() {
        let bottom = Rgba([10, 20, 30, 255]);
        let top = Rgba([200, 100, 50, 255]);
        assert_eq!(over(bottom, top), top);
    }

    #[test]
    fn over_transparent_top_is_noop() {
        let bottom = Rgba([10, 20, 30, 128]);
        assert_eq!(over(bottom, TRANSPARENT), bottom);
    }

    #[test]
    fn over_half_alpha_blends_on_opaque() {
        let out = over(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 128]));
        assert_eq!(out[3], 255);
        assert!((127..=129).contains(&out[0]));
    }

    #[test]
    fn destination_in_keeps_dst_where_src_is_opaque() {
        let dst = Rgba([1, 2, 3, 255]);
        assert_eq!(destination_in(dst, Rgba([0, 0, 0, 255])), dst);
        assert_eq!(destination_in(dst, TRANSPARENT), TRANSPARENT);
    }

    #[test]
    fn destination_in_scales_alpha_by_src() {
        let out = destination_in(Rgba([9, 9, 9, 255]), Rgba([0, 0, 0, 128]));
        assert_eq!(out, Rgba([9, 9, 9, 128]));
    }

    #[test]
    fn destination_over_only_fills_uncovered_pixels() {
        let green = Rgba([0, 255, 0, 255]);
        let red = Rgba([255, 0, 0, 255]);
        assert_eq!(CompositeOp::DestinationOver.apply(red, green), red);
        assert_eq!(CompositeOp::DestinationOver.apply(TRANSPARENT, green), green);
    }
}
