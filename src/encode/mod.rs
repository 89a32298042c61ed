pub mod avi;

use crate::capture::Frame;
use crate::error::CodecError;

pub use avi::{AviReader, AviWriter, StreamInfo, MAX_FILE_LEN};

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// What a sink reports once its container is closed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SinkSummary {
    pub frames: u64,
    pub bytes: u64,
}

/// Append-only destination for video frames.
///
/// Every call is a direct, blocking append.
pub trait VideoSink {
    /// Encode and append one RGB24 frame.
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CodecError>;

    /// Append one already-encoded JPEG frame as-is.
    fn write_encoded(&mut self, jpeg: &[u8]) -> Result<(), CodecError>;

    /// Write trailers and close. Further writes fail.
    fn finish(&mut self) -> Result<SinkSummary, CodecError>;
}

/// JPEG-encode an RGB24 frame.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CodecError> {
    let mut jpeg = Vec::with_capacity(frame.data.len() / 8);
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode(
        &frame.data,
        frame.width(),
        frame.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(jpeg)
}
