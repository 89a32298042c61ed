use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bytes per RGB24 sample triple.
pub const CHANNELS: usize = 3;

/// Frame data with zero-copy semantics.
///
/// Pixels are always tightly packed RGB24, row-major. Filters never mutate a
/// frame in place; they build a new one that shares the metadata.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared between the display and record branches
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub size: FrameSize,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Width × height in pixels, fixed for a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Length in bytes of an RGB24 buffer of this size.
    pub fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * CHANNELS
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel formats a capture device may deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
}

impl Frame {
    /// Wrap an RGB24 buffer, checking it matches `size`.
    pub fn from_rgb(size: FrameSize, data: impl Into<Bytes>, sequence: u64) -> Result<Self> {
        let data = data.into();
        if data.len() != size.rgb_len() {
            let rows = data.len() / (size.width as usize * CHANNELS).max(1);
            return Err(Error::Geometry {
                expected: size,
                actual: FrameSize::new(size.width, rows as u32),
            });
        }

        Ok(Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence,
                size,
                device_timestamp: None,
            }),
            timestamp: Instant::now(),
        })
    }

    /// A new frame with the same metadata and different pixels.
    ///
    /// `data` must have the same geometry as `self`.
    pub fn with_data(&self, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), self.data.len());
        Self {
            data: Bytes::from(data),
            meta: Arc::clone(&self.meta),
            timestamp: self.timestamp,
        }
    }

    pub fn with_device_timestamp(mut self, timestamp: Duration) -> Self {
        Arc::make_mut(&mut self.meta).device_timestamp = Some(timestamp);
        self
    }

    pub fn size(&self) -> FrameSize {
        self.meta.size
    }

    pub fn width(&self) -> u32 {
        self.meta.size.width
    }

    pub fn height(&self) -> u32 {
        self.meta.size.height
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    /// Driver timestamp, when the source provides one.
    pub fn device_timestamp(&self) -> Option<Duration> {
        self.meta.device_timestamp
    }

    /// RGB triple at (x, y). Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width() as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("size", &self.meta.size)
            .field("bytes", &self.data.len())
            .field("device_timestamp", &self.meta.device_timestamp)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_rejects_short_buffer() {
        let size = FrameSize::new(4, 2);
        let err = Frame::from_rgb(size, vec![0u8; 4 * 3], 0).unwrap_err();
        assert!(matches!(err, Error::Geometry { expected, .. } if expected == size));
    }

    #[test]
    fn pixel_reads_row_major_rgb() {
        let size = FrameSize::new(2, 2);
        let data: Vec<u8> = (0..12).collect();
        let frame = Frame::from_rgb(size, data, 7).unwrap();
        assert_eq!(frame.pixel(1, 1), [9, 10, 11]);
        assert_eq!(frame.sequence(), 7);
    }

    #[test]
    fn device_timestamp_survives_filtering() {
        let size = FrameSize::new(1, 1);
        let frame = Frame::from_rgb(size, vec![1, 2, 3], 1).unwrap();
        assert_eq!(frame.device_timestamp(), None);

        let stamped = frame
            .clone()
            .with_device_timestamp(Duration::from_millis(1500));
        let filtered = stamped.with_data(vec![4, 5, 6]);
        assert_eq!(filtered.device_timestamp(), Some(Duration::from_millis(1500)));
        assert_eq!(filtered.timestamp, stamped.timestamp);
        // The unstamped original shares nothing mutable with the copy
        assert_eq!(frame.device_timestamp(), None);
    }
}
