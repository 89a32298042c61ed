//! Per-frame visual filters
//!
//! Order is fixed: contrast/brightness scaling, horizontal flip, grayscale,
//! then the display-only overlay. Every stage returns a new frame.

pub mod glyphs;
pub mod overlay;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::capture::frame::{Frame, CHANNELS};

pub const BRIGHTNESS_STEP: i32 = 5;
pub const CONTRAST_STEP: f64 = 0.1;
pub const MIN_CONTRAST: f64 = 0.1;

/// User-adjustable filter settings, read once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub brightness: i32,
    pub contrast: f64,
    pub flip_horizontal: bool,
    pub grayscale: bool,
    pub show_timestamp: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            brightness: 0,
            contrast: 1.0,
            flip_horizontal: false,
            grayscale: false,
            show_timestamp: true,
        }
    }
}

impl FilterState {
    pub fn increase_brightness(&mut self) -> i32 {
        self.brightness += BRIGHTNESS_STEP;
        self.brightness
    }

    pub fn decrease_brightness(&mut self) -> i32 {
        self.brightness -= BRIGHTNESS_STEP;
        self.brightness
    }

    pub fn increase_contrast(&mut self) -> f64 {
        self.contrast = round_tenth(self.contrast + CONTRAST_STEP);
        self.contrast
    }

    /// Never goes below `MIN_CONTRAST`.
    pub fn decrease_contrast(&mut self) -> f64 {
        self.contrast = round_tenth(self.contrast - CONTRAST_STEP).max(MIN_CONTRAST);
        self.contrast
    }

    pub fn toggle_flip(&mut self) -> bool {
        self.flip_horizontal = !self.flip_horizontal;
        self.flip_horizontal
    }

    pub fn toggle_grayscale(&mut self) -> bool {
        self.grayscale = !self.grayscale;
        self.grayscale
    }

    pub fn toggle_timestamp(&mut self) -> bool {
        self.show_timestamp = !self.show_timestamp;
        self.show_timestamp
    }
}

fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// What the display-only overlay needs to know about the current tick.
#[derive(Debug, Clone, Copy)]
pub struct OverlayContext {
    pub now: NaiveDateTime,
    pub recording: bool,
}

/// Run the filter pipeline over `frame`.
///
/// With `overlay == None` the result carries no overlay pixels at all, which
/// is what the recorder must receive.
pub fn apply(frame: &Frame, state: &FilterState, overlay: Option<&OverlayContext>) -> Frame {
    let mut data = scale(&frame.data, state.contrast, state.brightness);
    let width = frame.width() as usize;

    if state.flip_horizontal {
        flip_rows(&mut data, width);
    }

    if state.grayscale {
        data = expand_luma(&to_luma(&data));
    }

    if let Some(ctx) = overlay {
        let mut canvas = overlay::Canvas::new(&mut data, frame.size());
        if state.show_timestamp {
            overlay::draw_timestamp(&mut canvas, &ctx.now);
        }
        if ctx.recording {
            overlay::draw_recording_indicator(&mut canvas);
        }
    }

    frame.with_data(data)
}

/// `clamp(round(v * contrast + brightness), 0, 255)` per sample.
pub fn scale(samples: &[u8], contrast: f64, brightness: i32) -> Vec<u8> {
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        *out = scale_sample(v as u8, contrast, brightness);
    }
    samples.iter().map(|&v| lut[v as usize]).collect()
}

pub fn scale_sample(v: u8, contrast: f64, brightness: i32) -> u8 {
    (f64::from(v) * contrast + f64::from(brightness))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Mirror every row of an RGB24 buffer in place.
pub fn flip_rows(data: &mut [u8], width: usize) {
    if width == 0 {
        return;
    }
    for row in data.chunks_exact_mut(width * CHANNELS) {
        for x in 0..width / 2 {
            let (l, r) = (x * CHANNELS, (width - 1 - x) * CHANNELS);
            for c in 0..CHANNELS {
                row.swap(l + c, r + c);
            }
        }
    }
}

/// Collapse RGB24 to one luminance channel (BT.601 weights, fixed point).
pub fn to_luma(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(CHANNELS)
        .map(|px| {
            let (r, g, b) = (u32::from(px[0]), u32::from(px[1]), u32::from(px[2]));
            ((r * 4899 + g * 9617 + b * 1868 + (1 << 13)) >> 14) as u8
        })
        .collect()
}

/// Repeat a luminance channel into three equal channels.
pub fn expand_luma(luma: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(luma.len() * CHANNELS);
    for &y in luma {
        rgb.extend_from_slice(&[y, y, y]);
    }
    rgb
}
