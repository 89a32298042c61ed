//! Measured-rate rewrite of a finished temporary recording

use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::capture::FrameSize;
use crate::encode::{AviReader, AviWriter, SinkSummary, StreamInfo, VideoSink};
use crate::error::{CodecError, Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeReport {
    pub output: PathBuf,
    pub frames: u64,
    pub frame_rate: f64,
}

/// Copy every frame of `temp_path` into `final_path`, stamped at
/// `measured_rate`, then delete `temp_path`.
///
/// Frames are copied as compressed payloads; no pixel changes. On failure the
/// temporary file stays on disk and `final_path` may be incomplete.
#[instrument(skip_all, fields(temp = %temp_path.display(), rate = measured_rate))]
pub fn finalize(
    temp_path: &Path,
    final_path: &Path,
    measured_rate: f64,
    size: FrameSize,
) -> Result<FinalizeReport> {
    let reencode = |source: CodecError| Error::Reencode {
        temp_path: temp_path.to_path_buf(),
        source,
    };

    // Nothing is created at `final_path` unless the temp file is readable
    let reader = AviReader::open(temp_path).map_err(reencode)?;
    let mut writer =
        AviWriter::create(final_path, StreamInfo::new(size, measured_rate)).map_err(reencode)?;
    let summary = copy_frames(reader, temp_path, &mut writer)?;

    info!(
        "Video file written: {} ({} frames at {:.2} fps, {} bytes)",
        final_path.display(),
        summary.frames,
        measured_rate,
        summary.bytes
    );

    Ok(FinalizeReport {
        output: final_path.to_path_buf(),
        frames: summary.frames,
        frame_rate: measured_rate,
    })
}

/// Copy every frame of `temp_path` into `sink`, close it, and delete
/// `temp_path` once the sink has closed cleanly.
pub fn finalize_into(temp_path: &Path, sink: &mut dyn VideoSink) -> Result<u64> {
    let reader = AviReader::open(temp_path).map_err(|source| Error::Reencode {
        temp_path: temp_path.to_path_buf(),
        source,
    })?;
    Ok(copy_frames(reader, temp_path, sink)?.frames)
}

fn copy_frames<R: Read + Seek>(
    mut reader: AviReader<R>,
    temp_path: &Path,
    sink: &mut dyn VideoSink,
) -> Result<SinkSummary> {
    let reencode = |source: CodecError| Error::Reencode {
        temp_path: temp_path.to_path_buf(),
        source,
    };

    let mut copied = 0u64;
    while let Some(jpeg) = reader.next_encoded().map_err(reencode)? {
        sink.write_encoded(&jpeg).map_err(reencode)?;
        copied += 1;
    }
    drop(reader);

    let summary = sink.finish().map_err(reencode)?;
    if summary.frames != copied {
        return Err(reencode(CodecError::Malformed(format!(
            "sink closed with {} frames, copied {copied}",
            summary.frames
        ))));
    }

    match fs::remove_file(temp_path) {
        Ok(()) => info!("Temporary file removed: {}", temp_path.display()),
        Err(e) => warn!("Could not remove temporary file {}: {}", temp_path.display(), e),
    }

    Ok(summary)
}
