pub mod capture;
pub mod display;
pub mod encode;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod recorder;
pub mod utils;

use std::path::{Path, PathBuf};

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use capture::{Frame, FrameSize};
pub use error::{CodecError, Error, Result};

/// Environment variable prefix for overrides, e.g. `CAMCORDER_CAPTURE__DEVICE`.
pub const ENV_PREFIX: &str = "CAMCORDER";

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub recording: RecordingConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Device node; empty means auto-detect.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Requested rate; 0 keeps the device default.
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// Declared rate when the device reports none.
    pub fallback_fps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                device: "/dev/video0".into(),
                width: 640,
                height: 480,
                fps: 0,
                format: PixelFormat::Mjpeg,
                buffer_count: 4,
                fallback_fps: capture::DEFAULT_FRAME_RATE,
            },
            recording: RecordingConfig {
                output_dir: "recordings".into(),
                file_prefix: "camcorder".into(),
                jpeg_quality: encode::DEFAULT_JPEG_QUALITY,
            },
            display: DisplayConfig {
                width: 800,
                title: "Camcorder".into(),
            },
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then `CAMCORDER_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camcorder.toml");
        std::fs::write(
            &path,
            "[capture]\nformat = \"Yuyv4\"\nfps = 30\n\n[recording]\noutput_dir = \"/tmp/clips\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.capture.format, PixelFormat::Yuyv4);
        assert_eq!(config.capture.fps, 30);
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.recording.output_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(config.display, Config::default().display);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/camcorder.toml"))).is_err());
    }
}
