//! Per-tick orchestration and the Idle → PreviewOnly ⇄ Recording state machine

use std::fmt;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::capture::{DeviceParams, FrameSource};
use crate::display::DisplaySurface;
use crate::error::{CodecError, Error, Result};
use crate::filter::{self, FilterState, OverlayContext};
use crate::pipeline::command::Command;
use crate::recorder::{FinalizeReport, Recorder, RecordingSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No frame has been shown yet.
    Idle,
    PreviewOnly,
    Recording,
}

/// Snapshot for the control surface: state, last message and filter values.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub state: LoopState,
    pub message: String,
    pub filters: FilterState,
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fs = &self.filters;
        write!(
            f,
            "{} | brightness {} | contrast {:.1} | flip {} | gray {} | timestamp {}",
            self.message,
            fs.brightness,
            fs.contrast,
            on_off(fs.flip_horizontal),
            on_off(fs.grayscale),
            on_off(fs.show_timestamp)
        )
    }
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Presented,
    Dropped,
}

fn clock(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Owns the frame source, filter state and the active recording.
pub struct PresentationLoop {
    source: Box<dyn FrameSource>,
    params: DeviceParams,
    filters: FilterState,
    recorder: Recorder,
    session: Option<RecordingSession>,
    state: LoopState,
    message: String,
}

impl PresentationLoop {
    pub fn new(source: Box<dyn FrameSource>, recorder: Recorder) -> Self {
        let params = source.params();
        Self {
            source,
            params,
            filters: FilterState::default(),
            recorder,
            session: None,
            state: LoopState::Idle,
            message: "Ready".into(),
        }
    }

    pub fn params(&self) -> DeviceParams {
        self.params
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn recording(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state,
            message: self.message.clone(),
            filters: self.filters,
        }
    }

    /// One capture → filter → route → display cycle.
    pub fn tick(&mut self, display: &mut dyn DisplaySurface) -> Result<TickOutcome> {
        let started = Instant::now();

        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(Error::FrameDropped(reason)) => {
                debug!("Frame dropped: {}", reason);
                metrics::counter!("frames_dropped").increment(1);
                return Ok(TickOutcome::Dropped);
            }
            Err(e) => return Err(e),
        };

        if self.state == LoopState::Idle {
            self.state = LoopState::PreviewOnly;
        }

        let overlay = OverlayContext {
            now: Local::now().naive_local(),
            recording: self.session.is_some(),
        };
        let shown = filter::apply(&frame, &self.filters, Some(&overlay));
        let recorded = filter::apply(&frame, &self.filters, None);

        let mut full = false;
        if let Some(session) = self.session.as_mut() {
            match session.write_frame(&recorded) {
                Ok(()) => self.message = format!("Recording {}", clock(session.elapsed())),
                Err(Error::Write(CodecError::Full { frames, limit })) => {
                    warn!("Recording is full after {} frames ({} bytes)", frames, limit);
                    full = true;
                }
                Err(e) => {
                    warn!("Failed to record frame: {}", e);
                    self.message = format!("Frame not recorded: {e}");
                }
            }
        }
        if full {
            // Keep what fits rather than losing the whole session
            if let Ok(Some(report)) = self.stop_recording() {
                self.message = format!("Size limit reached, saved {}", report.output.display());
            }
        }

        display.present(&shown, &self.status())?;

        metrics::histogram!("frame_latency_us").record(frame.timestamp.elapsed().as_micros() as f64);
        metrics::histogram!("tick_time_us").record(started.elapsed().as_micros() as f64);
        Ok(TickOutcome::Presented)
    }

    /// Apply a control command. Failures are also reflected in the status.
    pub fn handle(&mut self, command: Command) -> Result<()> {
        let f = &mut self.filters;
        match command {
            Command::ToggleRecording => {
                return if self.session.is_some() {
                    self.stop_recording().map(drop)
                } else {
                    self.start_recording()
                };
            }
            Command::StartRecording => return self.start_recording(),
            Command::StopRecording => return self.stop_recording().map(drop),
            Command::IncreaseBrightness => info!("Brightness: {}", f.increase_brightness()),
            Command::DecreaseBrightness => info!("Brightness: {}", f.decrease_brightness()),
            Command::IncreaseContrast => info!("Contrast: {:.1}", f.increase_contrast()),
            Command::DecreaseContrast => info!("Contrast: {:.1}", f.decrease_contrast()),
            Command::ToggleFlip => info!("Flip: {}", on_off(f.toggle_flip())),
            Command::ToggleGrayscale => info!("Grayscale: {}", on_off(f.toggle_grayscale())),
            Command::ToggleTimestamp => info!("Timestamp: {}", on_off(f.toggle_timestamp())),
            Command::Quit => {}
        }
        Ok(())
    }

    pub fn start_recording(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        match self.recorder.start(self.params.declared_rate, self.params.size) {
            Ok(session) => {
                self.session = Some(session);
                self.state = LoopState::Recording;
                self.message = format!("Recording {}", clock(Duration::ZERO));
                Ok(())
            }
            Err(e) => {
                error!("Cannot start recording: {}", e);
                self.state = LoopState::PreviewOnly;
                self.message = format!("Cannot start recording: {e}");
                Err(e)
            }
        }
    }

    /// Stop and finalize synchronously. The loop always ends up previewing.
    pub fn stop_recording(&mut self) -> Result<Option<FinalizeReport>> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        self.state = LoopState::PreviewOnly;

        let result = session.stop().and_then(|summary| summary.finalize());
        match &result {
            Ok(report) => {
                self.message = format!("Saved {}", report.output.display());
            }
            Err(e) => {
                error!("Recording could not be finalized: {}", e);
                self.message = format!("Recording not finalized: {e}");
            }
        }
        result.map(Some)
    }

    /// Finalize any active recording, then release the device.
    pub fn shutdown(mut self) -> Result<Option<FinalizeReport>> {
        let report = if self.session.is_some() {
            info!("Finalizing active recording before exit");
            self.stop_recording()
        } else {
            Ok(None)
        };
        drop(self.source);
        info!("Capture device released");
        report
    }
}
