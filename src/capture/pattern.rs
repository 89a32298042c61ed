//! Synthetic frame source for running without a camera

use crate::capture::frame::{Frame, CHANNELS};
use crate::capture::source::{DeviceParams, FrameSource};
use crate::error::Result;

/// Scrolling RGB gradient at fixed geometry.
pub struct PatternSource {
    params: DeviceParams,
    sequence: u64,
}

impl PatternSource {
    pub fn new(params: DeviceParams) -> Self {
        Self {
            params,
            sequence: 0,
        }
    }
}

impl FrameSource for PatternSource {
    fn params(&self) -> DeviceParams {
        self.params
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let size = self.params.size;
        let (w, h) = (size.width.max(1) as u64, size.height.max(1) as u64);
        let shift = self.sequence * 4;

        let mut data = Vec::with_capacity(size.rgb_len());
        for y in 0..size.height as u64 {
            for x in 0..size.width as u64 {
                data.extend_from_slice(&[
                    ((x * 255 / w + shift) % 256) as u8,
                    (y * 255 / h) as u8,
                    (((x + y) * 255 / (w + h)) as u8) ^ 0x40,
                ]);
            }
        }
        debug_assert_eq!(data.len() % CHANNELS, 0);

        self.sequence += 1;
        Frame::from_rgb(size, data, self.sequence)
    }
}
