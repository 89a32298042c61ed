use std::fs;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device, FourCC};

use crate::capture::frame::PixelFormat;
use crate::capture::{FrameSize, FrameSource};
use crate::error::{Error, Result};
use crate::recorder::measured_rate;

// Detected capture device info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

/// Auto-detect best capture device, preferring MJPEG over YUYV
pub fn auto_detect_device() -> Result<FoundDevice> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        // Check for capture capability
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }
        let Ok(formats) = dev.enum_formats() else {
            continue;
        };

        let fourccs: Vec<FourCC> = formats.iter().map(|f| f.fourcc).collect();
        for (wanted, format) in [
            (FourCC::new(b"MJPG"), PixelFormat::Mjpeg),
            (FourCC::new(b"YUYV"), PixelFormat::Yuyv4),
        ] {
            if fourccs.contains(&wanted) {
                info!("Found {:?} device: {} - {}", format, path, caps.card);
                return Ok(FoundDevice { path, format });
            }
        }
    }

    Err(Error::DeviceUnavailable(
        "no suitable capture device found".into(),
    ))
}

/// Create the recordings directory if it does not exist yet.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    info!("Recording to {}", dir.display());
    Ok(())
}

/// What a capture self-check saw.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub size: FrameSize,
    pub declared_rate: f64,
    pub frames_read: u32,
    pub dropped: u32,
    pub measured_rate: f64,
}

/// Read `attempts` frames back to back and report geometry and delivery rate.
/// A source that delivers nothing at all is unavailable.
pub fn self_check(source: &mut dyn FrameSource, attempts: u32) -> Result<CheckReport> {
    let params = source.params();
    let started = Instant::now();
    let (mut frames_read, mut dropped) = (0u32, 0u32);

    for _ in 0..attempts {
        match source.read_frame() {
            Ok(frame) if frame.size() != params.size => {
                return Err(Error::Geometry {
                    expected: params.size,
                    actual: frame.size(),
                })
            }
            Ok(_) => frames_read += 1,
            Err(Error::FrameDropped(reason)) => {
                debug!("Self-check frame dropped: {}", reason);
                dropped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    if frames_read == 0 {
        return Err(Error::DeviceUnavailable(format!(
            "no frames delivered in {attempts} reads"
        )));
    }

    let report = CheckReport {
        size: params.size,
        declared_rate: params.declared_rate,
        frames_read,
        dropped,
        measured_rate: measured_rate(
            u64::from(frames_read),
            started.elapsed(),
            params.declared_rate,
        ),
    };
    info!(
        "Self-check: {} frames of {} ({} dropped), {:.1} fps measured, {:.1} declared",
        report.frames_read, report.size, report.dropped, report.measured_rate, report.declared_rate
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DeviceParams, Frame, PatternSource};

    /// Drops every read.
    struct Dead(DeviceParams);

    impl FrameSource for Dead {
        fn params(&self) -> DeviceParams {
            self.0
        }

        fn read_frame(&mut self) -> Result<Frame> {
            Err(Error::FrameDropped("timeout".into()))
        }
    }

    #[test]
    fn self_check_reports_pattern_source() {
        let params = DeviceParams::new(FrameSize::new(64, 48), 25.0, 60.0);
        let report = self_check(&mut PatternSource::new(params), 10).unwrap();
        assert_eq!(report.size, FrameSize::new(64, 48));
        assert_eq!(report.declared_rate, 25.0);
        assert_eq!(report.frames_read, 10);
        assert_eq!(report.dropped, 0);
        assert!(report.measured_rate > 0.0);
    }

    #[test]
    fn self_check_fails_when_nothing_arrives() {
        let mut dead = Dead(DeviceParams::new(FrameSize::new(8, 8), 30.0, 60.0));
        let err = self_check(&mut dead, 5).unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)), "{err}");
    }

    #[test]
    fn output_dir_creation_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("a/b");
        ensure_output_dir(&dir).unwrap();
        ensure_output_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
