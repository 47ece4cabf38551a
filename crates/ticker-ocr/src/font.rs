//! Embedded 5x7 bitmap font for uppercase letters and digits.
//!
//! Used to synthesise the built-in glyph templates, and handy for drawing
//! synthetic captures.

use image::{GrayImage, Luma};

pub const GLYPH_COLS: u32 = 5;
pub const GLYPH_ROWS: u32 = 7;

/// Each row is 5 bits wide, most significant bit is the leftmost column.
const FONT: [(char, [u8; 7]); 36] = [
    ('A', [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
    ('B', [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110]),
    ('C', [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110]),
    ('D', [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100]),
    ('E', [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111]),
    ('F', [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000]),
    ('G', [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111]),
    ('H', [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001]),
    ('I', [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
    ('J', [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100]),
    ('K', [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001]),
    ('L', [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111]),
    ('M', [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001]),
    ('N', [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001]),
    ('O', [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
    ('P', [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000]),
    ('Q', [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101]),
    ('R', [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001]),
    ('S', [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110]),
    ('T', [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100]),
    ('U', [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110]),
    ('V', [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100]),
    ('W', [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010]),
    ('X', [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001]),
    ('Y', [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100]),
    ('Z', [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111]),
    ('0', [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110]),
    ('1', [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110]),
    ('2', [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111]),
    ('3', [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110]),
    ('4', [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010]),
    ('5', [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110]),
    ('6', [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110]),
    ('7', [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000]),
    ('8', [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110]),
    ('9', [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100]),
];

fn rows_for(ch: char) -> Option<&'static [u8; 7]> {
    let upper = ch.to_ascii_uppercase();
    FONT.iter().find(|(c, _)| *c == upper).map(|(_, rows)| rows)
}

pub fn has_glyph(ch: char) -> bool {
    rows_for(ch).is_some()
}

/// Render one glyph as an ink mask (255 = ink) with each font cell `scale` pixels wide.
pub fn render_glyph(ch: char, scale: u32) -> Option<GrayImage> {
    let rows = rows_for(ch)?;
    let scale = scale.max(1);
    let mut img = GrayImage::new(GLYPH_COLS * scale, GLYPH_ROWS * scale);
    stamp(&mut img, 0, 0, rows, scale, 255);
    Some(img)
}

/// Draw `text` onto `canvas` with its top-left corner at (x, y).
///
/// Glyphs advance by 6 cells (5 + 1 spacing); characters without a glyph
/// leave a blank cell. Pixels falling outside the canvas are clipped.
pub fn draw_text(canvas: &mut GrayImage, x: u32, y: u32, text: &str, scale: u32, ink: u8) {
    let scale = scale.max(1);
    let advance = (GLYPH_COLS + 1) * scale;
    for (i, ch) in text.chars().enumerate() {
        if let Some(rows) = rows_for(ch) {
            stamp(canvas, x + i as u32 * advance, y, rows, scale, ink);
        }
    }
}

/// Pixel width of `text` when drawn with [`draw_text`]
pub fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    (n * (GLYPH_COLS + 1) - 1) * scale.max(1)
}

fn stamp(canvas: &mut GrayImage, x0: u32, y0: u32, rows: &[u8; 7], scale: u32, ink: u8) {
    let (w, h) = canvas.dimensions();
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_COLS {
            if bits & (1 << (GLYPH_COLS - 1 - col)) == 0 {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x0 + col * scale + dx;
                    let py = y0 + row as u32 * scale + dy;
                    if px < w && py < h {
                        canvas.put_pixel(px, py, Luma([ink]));
                    }
                }
            }
        }
    }
}
