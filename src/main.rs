//! Camcorder: webcam preview with live filters and measured-rate recording

use std::path::PathBuf;

use camcorder::capture::{DeviceParams, FrameSource, PatternSource, V4l2Capture};
use camcorder::display::Sdl2Display;
use camcorder::pipeline::{ticker, PresentationLoop};
use camcorder::recorder::{OutputLayout, Recorder};
use camcorder::{utils, Config, FrameSize};
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CHECK_FRAMES: u32 = 30;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture device node (empty string auto-detects)
    #[arg(short, long)]
    device: Option<String>,

    /// Directory for finished recordings
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Use a synthetic test pattern instead of a camera
    #[arg(long)]
    test_pattern: bool,

    /// Read a few frames, report what the camera delivers, and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camcorder=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Camcorder launching...");

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(device) = args.device {
        config.capture.device = device;
    }
    if let Some(dir) = args.output_dir {
        config.recording.output_dir = dir;
    }

    utils::ensure_output_dir(&config.recording.output_dir)?;

    let mut source: Box<dyn FrameSource> = if args.test_pattern {
        let size = FrameSize::new(config.capture.width, config.capture.height);
        let rate = f64::from(config.capture.fps);
        Box::new(PatternSource::new(DeviceParams::new(
            size,
            rate,
            config.capture.fallback_fps,
        )))
    } else {
        // Auto-detect capture device if needed
        if config.capture.device.is_empty() {
            let found = utils::auto_detect_device()?;
            config.capture.device = found.path;
            config.capture.format = found.format;
        }
        info!("Using capture device: {}", config.capture.device);
        Box::new(V4l2Capture::open(&config.capture)?)
    };

    if args.check {
        let report = utils::self_check(source.as_mut(), CHECK_FRAMES)?;
        let name = if args.test_pattern {
            "test pattern"
        } else {
            config.capture.device.as_str()
        };
        println!(
            "{}: {} frames of {} ({} dropped), {:.1} fps measured, {:.1} fps declared",
            name,
            report.frames_read,
            report.size,
            report.dropped,
            report.measured_rate,
            report.declared_rate
        );
        return Ok(());
    }

    let params = source.params();

    let recorder = Recorder::new(
        OutputLayout::new(
            config.recording.output_dir.clone(),
            config.recording.file_prefix.clone(),
        ),
        config.recording.jpeg_quality,
    );
    let mut presenter = PresentationLoop::new(source, recorder);

    // Initialize SDL2
    let sdl_context = sdl2::init().map_err(|e| eyre!(e))?;
    let mut display = Sdl2Display::new(&sdl_context, &config.display, params.size)?;

    let outcome = ticker::run(&mut presenter, &mut display).await;

    if let Some(report) = presenter.shutdown()? {
        info!("Saved {} on exit", report.output.display());
    }
    outcome?;

    info!("Camcorder shutting down");
    Ok(())
}
