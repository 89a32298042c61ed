use std::path::PathBuf;

use thiserror::Error;

use crate::capture::FrameSize;

/// Failures of the capture → filter → record pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable camera. Fatal at startup.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// One tick's frame could not be read or decoded. The tick is skipped.
    #[error("frame dropped: {0}")]
    FrameDropped(String),

    #[error("cannot open output {}: {source}", path.display())]
    CannotOpenOutput {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    /// Measured-rate rewrite failed; the temporary file is kept.
    #[error("re-encoding {} failed: {source}", temp_path.display())]
    Reencode {
        temp_path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("writing recording failed: {0}")]
    Write(#[from] CodecError),

    #[error("frame is {actual}, expected {expected}")]
    Geometry {
        expected: FrameSize,
        actual: FrameSize,
    },

    #[error("display error: {0}")]
    Display(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Container and JPEG failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("jpeg encode: {0}")]
    Encode(#[from] image::ImageError),

    #[error("jpeg decode: {0}")]
    Decode(#[from] jpeg_decoder::Error),

    #[error("malformed stream: {0}")]
    Malformed(String),

    /// The container cannot take another frame and still be closed. Frames
    /// already written are intact.
    #[error("container full after {frames} frames ({limit} bytes)")]
    Full { frames: u64, limit: u64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
