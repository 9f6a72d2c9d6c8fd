use image::Rgba;
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use super::Surface;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// 5x7 bitmap glyphs, one row per byte, most significant of the low 5 bits on the left
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

/// Draw `text` in device space with its top-left corner at (`x`, `y`)
///
/// Each glyph cell is `scale` pixels square. Characters without a glyph are
/// skipped. Text is drawn over a backdrop one cell wider on every side, and
/// is clipped to the surface. Pixels are replaced, not blended.
pub fn draw_text(
    surface: &mut Surface,
    text: &str,
    x: u32,
    y: u32,
    scale: u32,
    color: Rgba<u8>,
    backdrop: Rgba<u8>,
) {
    let scale = scale.max(1);
    let advance = (GLYPH_WIDTH + 1) * scale;
    let glyphs: Vec<[u8; 7]> = text.chars().filter_map(glyph).collect();
    if glyphs.is_empty() {
        return;
    }

    let box_w = glyphs.len() as u32 * advance + scale;
    let box_h = (GLYPH_HEIGHT + 2) * scale;
    let pixels = surface.image_mut();
    draw_filled_rect_mut(pixels, cell(x, y, box_w, box_h), backdrop);

    for (i, rows) in glyphs.iter().enumerate() {
        let gx = x + scale + i as u32 * advance;
        let gy = y + scale;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    let (cx, cy) = (gx + col * scale, gy + row as u32 * scale);
                    draw_filled_rect_mut(pixels, cell(cx, cy, scale, scale), color);
                }
            }
        }
    }
}

fn cell(x: u32, y: u32, w: u32, h: u32) -> Rect {
    Rect::at(x as i32, y as i32).of_size(w, h)
}
