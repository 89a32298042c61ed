//! Recording sessions: append filtered frames to a temporary file at the
//! declared rate, then hand off to the finalizer with the measured rate.

pub mod finalize;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tracing::{info, instrument};

use crate::capture::{Frame, FrameSize};
use crate::encode::{AviWriter, StreamInfo, VideoSink, MAX_FILE_LEN};
use crate::error::{Error, Result};

pub use finalize::{finalize, finalize_into, FinalizeReport};

/// Where session files go and how they are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub dir: PathBuf,
    pub prefix: String,
}

/// Final and temporary paths for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub output: PathBuf,
    pub temp: PathBuf,
}

impl OutputLayout {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// `<prefix>_recording_<stamp>.avi` and `<prefix>_temp_<stamp>.avi`.
    pub fn session_paths(&self, started: &DateTime<Local>) -> SessionPaths {
        self.numbered_paths(started, 0)
    }

    /// Like `session_paths`, with `_1`, `_2`, ... appended until neither file
    /// exists yet. Sessions started within the same second get their own files.
    pub fn free_session_paths(&self, started: &DateTime<Local>) -> SessionPaths {
        let mut n = 0;
        loop {
            let paths = self.numbered_paths(started, n);
            if !paths.output.exists() && !paths.temp.exists() {
                return paths;
            }
            n += 1;
        }
    }

    fn numbered_paths(&self, started: &DateTime<Local>, n: u32) -> SessionPaths {
        let stamp = started.format("%Y%m%d_%H%M%S");
        let suffix = if n == 0 { String::new() } else { format!("_{n}") };
        SessionPaths {
            output: self
                .dir
                .join(format!("{}_recording_{stamp}{suffix}.avi", self.prefix)),
            temp: self.dir.join(format!("{}_temp_{stamp}{suffix}.avi", self.prefix)),
        }
    }
}

/// Opens recording sessions with a fixed output layout and JPEG quality.
#[derive(Debug, Clone)]
pub struct Recorder {
    layout: OutputLayout,
    jpeg_quality: u8,
    max_file_len: u64,
}

impl Recorder {
    pub fn new(layout: OutputLayout, jpeg_quality: u8) -> Self {
        Self {
            layout,
            jpeg_quality,
            max_file_len: MAX_FILE_LEN,
        }
    }

    /// Cap each temporary file. Writes past the cap fail with
    /// `CodecError::Full`.
    pub fn with_max_file_len(mut self, bytes: u64) -> Self {
        self.max_file_len = bytes;
        self
    }

    /// Open a session named after the current wall-clock time.
    pub fn start(&self, declared_rate: f64, size: FrameSize) -> Result<RecordingSession> {
        let paths = self.layout.free_session_paths(&Local::now());
        self.start_at(paths, declared_rate, size, Instant::now())
    }

    /// Open a session writing to `paths.temp`, with `started` as time zero.
    #[instrument(skip(self, paths), fields(temp = %paths.temp.display()))]
    pub fn start_at(
        &self,
        paths: SessionPaths,
        declared_rate: f64,
        size: FrameSize,
        started: Instant,
    ) -> Result<RecordingSession> {
        let writer = AviWriter::create(&paths.temp, StreamInfo::new(size, declared_rate))
            .map_err(|source| Error::CannotOpenOutput {
                path: paths.temp.clone(),
                source,
            })?
            .with_quality(self.jpeg_quality)
            .with_size_limit(self.max_file_len);

        info!(
            "Recording started: {} ({} at {:.2} fps)",
            paths.output.display(),
            size,
            declared_rate
        );

        Ok(RecordingSession {
            paths,
            started,
            frame_count: 0,
            declared_rate,
            size,
            writer,
        })
    }
}

/// An open recording. Exists only while the temporary file is open.
pub struct RecordingSession {
    paths: SessionPaths,
    started: Instant,
    frame_count: u64,
    declared_rate: f64,
    size: FrameSize,
    writer: AviWriter<BufWriter<File>>,
}

impl RecordingSession {
    /// Append one overlay-free frame. `Error::Write(CodecError::Full)` means
    /// the file is at its size limit and the session should be stopped.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.size() != self.size {
            return Err(Error::Geometry {
                expected: self.size,
                actual: frame.size(),
            });
        }
        self.writer.write_frame(frame)?;
        self.frame_count += 1;
        metrics::counter!("frames_recorded").increment(1);
        Ok(())
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn temp_path(&self) -> &Path {
        &self.paths.temp
    }

    pub fn stop(self) -> Result<RecordingSummary> {
        self.stop_at(Instant::now())
    }

    /// Close the temporary file and measure the effective rate up to `ended`.
    pub fn stop_at(mut self, ended: Instant) -> Result<RecordingSummary> {
        self.writer.finish()?;

        let elapsed = ended.saturating_duration_since(self.started);
        let summary = RecordingSummary {
            paths: self.paths.clone(),
            frame_count: self.frame_count,
            elapsed,
            declared_rate: self.declared_rate,
            measured_rate: measured_rate(self.frame_count, elapsed, self.declared_rate),
            size: self.size,
        };

        info!(
            "Recording stopped: {} frames in {:.2}s, measured {:.2} fps (declared {:.2})",
            summary.frame_count,
            summary.elapsed_seconds(),
            summary.measured_rate,
            summary.declared_rate
        );

        Ok(summary)
    }
}

/// Frames written over wall-clock seconds, or `declared` when no time passed.
pub fn measured_rate(frames: u64, elapsed: Duration, declared: f64) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        frames as f64 / secs
    } else {
        declared
    }
}

/// What a closed session produced, ready for finalizing.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub paths: SessionPaths,
    pub frame_count: u64,
    pub elapsed: Duration,
    pub declared_rate: f64,
    pub measured_rate: f64,
    pub size: FrameSize,
}

impl RecordingSummary {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Rate the final file is stamped with. An empty recording has no
    /// measurable rate and keeps the declared one.
    pub fn output_rate(&self) -> f64 {
        if self.frame_count == 0 {
            self.declared_rate
        } else {
            self.measured_rate
        }
    }

    /// Rewrite the temporary file at the measured rate.
    pub fn finalize(&self) -> Result<FinalizeReport> {
        finalize(
            &self.paths.temp,
            &self.paths.output,
            self.output_rate(),
            self.size,
        )
    }
}
