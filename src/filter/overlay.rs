//! Display-only overlay rasterisation (timestamp label and REC indicator)

use chrono::NaiveDateTime;

use super::glyphs::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::capture::frame::{FrameSize, CHANNELS};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const LABEL_BACKGROUND: [u8; 3] = [255, 255, 255];
pub const LABEL_BORDER: [u8; 3] = [240, 240, 240];
pub const LABEL_TEXT: [u8; 3] = [255, 130, 0];
pub const RECORDING_RED: [u8; 3] = [255, 0, 0];

/// Glyph pixels are drawn as `TEXT_SCALE`×`TEXT_SCALE` blocks.
pub const TEXT_SCALE: u32 = 2;

const MARGIN: i64 = 10;
const PADDING: i64 = 10;
const DOT_OFFSET: i64 = 30;
const DOT_RADIUS: i64 = 15;

/// Mutable view over an RGB24 buffer; all drawing is clipped to its bounds.
pub struct Canvas<'a> {
    data: &'a mut [u8],
    size: FrameSize,
}

impl<'a> Canvas<'a> {
    pub fn new(data: &'a mut [u8], size: FrameSize) -> Self {
        debug_assert_eq!(data.len(), size.rgb_len());
        Self { data, size }
    }

    pub fn width(&self) -> i64 {
        i64::from(self.size.width)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.size.height)
    }

    pub fn put(&mut self, x: i64, y: i64, color: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width() || y >= self.height() {
            return;
        }
        let i = (y as usize * self.size.width as usize + x as usize) * CHANNELS;
        self.data[i..i + CHANNELS].copy_from_slice(&color);
    }

    /// Filled rectangle with inclusive corners.
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: [u8; 3]) {
        for y in y0.max(0)..=y1.min(self.height() - 1) {
            for x in x0.max(0)..=x1.min(self.width() - 1) {
                self.put(x, y, color);
            }
        }
    }

    /// One-pixel rectangle outline with inclusive corners.
    pub fn stroke_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: [u8; 3]) {
        for x in x0..=x1 {
            self.put(x, y0, color);
            self.put(x, y1, color);
        }
        for y in y0..=y1 {
            self.put(x0, y, color);
            self.put(x1, y, color);
        }
    }

    pub fn fill_circle(&mut self, cx: i64, cy: i64, radius: i64, color: [u8; 3]) {
        let r2 = radius * radius;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= r2 {
                    self.put(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Draw `text` with its top-left corner at (x, y). Unknown characters
    /// advance without drawing.
    pub fn draw_text(&mut self, text: &str, x: i64, y: i64, color: [u8; 3]) {
        let s = i64::from(TEXT_SCALE);
        let advance = i64::from(GLYPH_WIDTH + 1) * s;

        for (i, c) in text.chars().enumerate() {
            let Some(rows) = glyphs::glyph(c) else {
                continue;
            };
            let gx = x + i as i64 * advance;
            for row in 0..GLYPH_HEIGHT {
                for col in 0..GLYPH_WIDTH {
                    if glyphs::is_set(&rows, col, row) {
                        let px = gx + i64::from(col) * s;
                        let py = y + i64::from(row) * s;
                        self.fill_rect(px, py, px + s - 1, py + s - 1, color);
                    }
                }
            }
        }
    }
}

/// Width and height in pixels `text` occupies when drawn.
pub fn text_size(text: &str) -> (i64, i64) {
    let n = text.chars().count() as i64;
    if n == 0 {
        return (0, 0);
    }
    let s = i64::from(TEXT_SCALE);
    let width = n * i64::from(GLYPH_WIDTH) * s + (n - 1) * s;
    (width, i64::from(GLYPH_HEIGHT) * s)
}

/// Timestamp label in an opaque bordered box, bottom-left.
pub fn draw_timestamp(canvas: &mut Canvas<'_>, now: &NaiveDateTime) {
    let label = now.format(TIMESTAMP_FORMAT).to_string();
    let (tw, th) = text_size(&label);

    let x0 = MARGIN;
    let x1 = MARGIN + tw + 2 * PADDING;
    let y1 = canvas.height() - MARGIN;
    let y0 = y1 - th - 2 * PADDING;

    canvas.fill_rect(x0, y0, x1, y1, LABEL_BACKGROUND);
    canvas.stroke_rect(x0, y0, x1, y1, LABEL_BORDER);
    canvas.draw_text(&label, x0 + PADDING, y0 + PADDING, LABEL_TEXT);
}

/// Filled red dot and "REC", top-right.
pub fn draw_recording_indicator(canvas: &mut Canvas<'_>) {
    let cx = canvas.width() - DOT_OFFSET;
    let cy = DOT_OFFSET;
    canvas.fill_circle(cx, cy, DOT_RADIUS, RECORDING_RED);

    let (tw, th) = text_size("REC");
    let x = cx - DOT_RADIUS - PADDING - tw;
    canvas.draw_text("REC", x, cy - th / 2, RECORDING_RED);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_metrics_include_spacing() {
        assert_eq!(text_size(""), (0, 0));
        assert_eq!(text_size("0"), (10, 14));
        assert_eq!(text_size("REC"), (34, 14));
    }

    #[test]
    fn drawing_is_clipped() {
        let size = FrameSize::new(4, 4);
        let mut data = vec![0u8; size.rgb_len()];
        let mut canvas = Canvas::new(&mut data, size);
        canvas.fill_circle(0, 0, 10, RECORDING_RED);
        canvas.draw_text("88", -3, -3, LABEL_TEXT);
        canvas.stroke_rect(-1, -1, 10, 10, LABEL_BORDER);
        assert!(data.chunks_exact(3).all(|px| px != [0, 0, 0]));
    }

    #[test]
    fn timestamp_box_has_border_and_text() {
        let size = FrameSize::new(400, 100);
        let mut data = vec![0u8; size.rgb_len()];
        let now = chrono::NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        draw_timestamp(&mut Canvas::new(&mut data, size), &now);

        let at = |x: usize, y: usize| {
            let i = (y * 400 + x) * 3;
            [data[i], data[i + 1], data[i + 2]]
        };
        // Border corner, interior padding, and some text pixel
        assert_eq!(at(10, 90), LABEL_BORDER);
        assert_eq!(at(12, 88), LABEL_BACKGROUND);
        let text_row = 100 - 10 - 14 - 10; // first glyph row
        assert!((20..40).any(|x| at(x, text_row) == LABEL_TEXT));
    }
}
