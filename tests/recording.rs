use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, Instant};

use camcorder::capture::{DeviceParams, FrameSource, PatternSource};
use camcorder::display::DisplaySurface;
use camcorder::encode::{encode_jpeg, AviReader};
use camcorder::filter::overlay::RECORDING_RED;
use camcorder::pipeline::{ticker, Command, LoopState, PresentationLoop, Status, TickOutcome};
use camcorder::recorder::{OutputLayout, Recorder, SessionPaths};
use camcorder::{Error, Frame, FrameSize, Result};

const SIZE: FrameSize = FrameSize::new(320, 240);

/// Solid black frames; reads listed in `drops` fail as dropped frames.
struct ScriptedSource {
    params: DeviceParams,
    reads: u64,
    drops: Vec<u64>,
}

impl ScriptedSource {
    fn new(rate: f64, drops: Vec<u64>) -> Self {
        Self {
            params: DeviceParams::new(SIZE, rate, 60.0),
            reads: 0,
            drops,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn params(&self) -> DeviceParams {
        self.params
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.reads += 1;
        if self.drops.contains(&self.reads) {
            return Err(Error::FrameDropped("scripted".into()));
        }
        Frame::from_rgb(SIZE, vec![0u8; SIZE.rgb_len()], self.reads)
    }
}

#[derive(Default)]
struct RecordingDisplay {
    frames: Vec<Frame>,
    statuses: Vec<Status>,
    /// One entry per poll; empty polls once the script runs out.
    script: VecDeque<Vec<Command>>,
}

impl DisplaySurface for RecordingDisplay {
    fn poll_commands(&mut self) -> Vec<Command> {
        self.script.pop_front().unwrap_or_default()
    }

    fn present(&mut self, frame: &Frame, status: &Status) -> Result<()> {
        self.frames.push(frame.clone());
        self.statuses.push(status.clone());
        Ok(())
    }
}

fn recorder_in(dir: &Path) -> Recorder {
    Recorder::new(OutputLayout::new(dir, "test"), 85)
}

fn count_frames(path: &Path) -> u64 {
    let mut reader = AviReader::open(path).unwrap();
    let mut n = 0;
    while let Some(frame) = reader.next_frame().unwrap() {
        assert_eq!(frame.size(), reader.info().size);
        n += 1;
    }
    n
}

fn recordings(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut found: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().contains("_recording_"))
        .collect();
    found.sort();
    found
}

fn temp_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .contains("_temp_")
        })
        .count()
}

#[test]
fn thirty_frames_in_two_seconds_is_fifteen_fps() {
    let dir = tempfile::tempdir().unwrap();
    let small = FrameSize::new(32, 24);
    let paths = SessionPaths {
        output: dir.path().join("out.avi"),
        temp: dir.path().join("temp.avi"),
    };
    let t0 = Instant::now();

    let mut session = recorder_in(dir.path())
        .start_at(paths.clone(), 30.0, small, t0)
        .unwrap();
    let mut source = PatternSource::new(DeviceParams::new(small, 30.0, 60.0));
    for _ in 0..30 {
        session.write_frame(&source.read_frame().unwrap()).unwrap();
    }
    assert_eq!(session.frame_count(), 30);

    let summary = session.stop_at(t0 + Duration::from_secs(2)).unwrap();
    assert_eq!(summary.frame_count, 30);
    assert_eq!(summary.elapsed_seconds(), 2.0);
    assert_eq!(summary.measured_rate, 15.0);

    // Temp file is stamped at the declared rate until finalized
    assert_eq!(AviReader::open(&paths.temp).unwrap().info().frame_rate, 30.0);

    let report = summary.finalize().unwrap();
    assert_eq!(report.frames, 30);
    assert_eq!(report.frame_rate, 15.0);
    assert!(!paths.temp.exists());

    let reader = AviReader::open(&paths.output).unwrap();
    assert_eq!(reader.info().frame_rate, 15.0);
    assert_eq!(reader.info().size, small);
    assert_eq!(reader.declared_frames(), 30);
    assert_eq!(count_frames(&paths.output), 30);
}

#[test]
fn zero_elapsed_falls_back_to_declared_rate() {
    let dir = tempfile::tempdir().unwrap();
    let small = FrameSize::new(16, 16);
    let paths = SessionPaths {
        output: dir.path().join("out.avi"),
        temp: dir.path().join("temp.avi"),
    };
    let t0 = Instant::now();

    let mut session = recorder_in(dir.path())
        .start_at(paths.clone(), 24.0, small, t0)
        .unwrap();
    let frame = Frame::from_rgb(small, vec![50u8; small.rgb_len()], 1).unwrap();
    session.write_frame(&frame).unwrap();

    let summary = session.stop_at(t0).unwrap();
    assert_eq!(summary.measured_rate, 24.0);

    summary.finalize().unwrap();
    assert_eq!(AviReader::open(&paths.output).unwrap().info().frame_rate, 24.0);
}

#[test]
fn failed_start_stays_in_preview() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file-not-dir");
    std::fs::write(&blocker, b"x").unwrap();

    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![])),
        recorder_in(&blocker),
    );
    let mut display = RecordingDisplay::default();

    assert_eq!(presenter.state(), LoopState::Idle);
    presenter.tick(&mut display).unwrap();
    assert_eq!(presenter.state(), LoopState::PreviewOnly);

    let err = presenter.handle(Command::StartRecording).unwrap_err();
    assert!(matches!(err, Error::CannotOpenOutput { .. }), "{err}");
    assert_eq!(presenter.state(), LoopState::PreviewOnly);
    assert!(presenter.recording().is_none());
    assert!(presenter.status().message.starts_with("Cannot start recording"));

    // Preview keeps running
    presenter.tick(&mut display).unwrap();
    assert_eq!(display.frames.len(), 2);
}

#[test]
fn failed_start_from_idle_moves_to_preview() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file-not-dir");
    std::fs::write(&blocker, b"x").unwrap();

    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![])),
        recorder_in(&blocker),
    );
    assert!(presenter.start_recording().is_err());
    assert_eq!(presenter.state(), LoopState::PreviewOnly);
}

#[test]
fn dropped_frames_skip_the_tick() {
    let dir = tempfile::tempdir().unwrap();
    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![2])),
        recorder_in(dir.path()),
    );
    let mut display = RecordingDisplay::default();

    let outcomes: Vec<TickOutcome> = (0..3)
        .map(|_| presenter.tick(&mut display).unwrap())
        .collect();
    assert_eq!(
        outcomes,
        vec![TickOutcome::Presented, TickOutcome::Dropped, TickOutcome::Presented]
    );
    assert_eq!(display.frames.len(), 2);
    assert_eq!(display.frames[1].sequence(), 3);
}

#[test]
fn dropped_frames_while_recording_are_not_counted() {
    let dir = tempfile::tempdir().unwrap();
    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![3, 4])),
        recorder_in(dir.path()),
    );
    let mut display = RecordingDisplay::default();

    presenter.handle(Command::ToggleRecording).unwrap();
    for _ in 0..6 {
        presenter.tick(&mut display).unwrap();
    }
    assert_eq!(presenter.recording().unwrap().frame_count(), 4);
    assert_eq!(presenter.state(), LoopState::Recording);
}

#[test]
fn recorded_frames_carry_no_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![])),
        recorder_in(dir.path()),
    );
    let mut display = RecordingDisplay::default();

    presenter.tick(&mut display).unwrap();
    presenter.handle(Command::StartRecording).unwrap();
    assert_eq!(presenter.state(), LoopState::Recording);
    for _ in 0..5 {
        presenter.tick(&mut display).unwrap();
    }

    // Display copies show the REC dot and the timestamp box
    let shown = display.frames.last().unwrap();
    assert_eq!(shown.pixel(290, 30), RECORDING_RED);
    assert_ne!(shown.pixel(12, 225), [0, 0, 0]);
    assert!(display.statuses.last().unwrap().message.starts_with("Recording"));

    let report = presenter.stop_recording().unwrap().unwrap();
    assert_eq!(presenter.state(), LoopState::PreviewOnly);
    assert_eq!(report.frames, 5);
    assert_eq!(temp_files(dir.path()), 0);

    let mut reader = AviReader::open(&report.output).unwrap();
    while let Some(frame) = reader.next_frame().unwrap() {
        for (x, y) in [(290, 30), (12, 225), (100, 215)] {
            let px = frame.pixel(x, y);
            assert!(px.iter().all(|&v| v < 16), "overlay at ({x},{y}): {px:?}");
        }
    }
}

#[test]
fn filter_commands_show_up_in_status() {
    let dir = tempfile::tempdir().unwrap();
    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![])),
        recorder_in(dir.path()),
    );

    for command in [
        Command::IncreaseBrightness,
        Command::IncreaseBrightness,
        Command::DecreaseContrast,
        Command::ToggleFlip,
        Command::ToggleGrayscale,
        Command::ToggleTimestamp,
    ] {
        presenter.handle(command).unwrap();
    }

    assert_eq!(presenter.filters().brightness, 10);
    let status = presenter.status();
    assert_eq!(status.filters.brightness, 10);
    assert_eq!(status.filters.contrast, 0.9);
    assert!(status.filters.flip_horizontal && status.filters.grayscale);
    assert!(!status.filters.show_timestamp);
    assert_eq!(
        status.to_string(),
        "Ready | brightness 10 | contrast 0.9 | flip on | gray on | timestamp off"
    );
}

#[test]
fn shutdown_finalizes_active_recording() {
    let dir = tempfile::tempdir().unwrap();
    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![])),
        recorder_in(dir.path()),
    );
    let mut display = RecordingDisplay::default();

    presenter.start_recording().unwrap();
    for _ in 0..3 {
        presenter.tick(&mut display).unwrap();
    }

    let report = presenter.shutdown().unwrap().unwrap();
    assert_eq!(report.frames, 3);
    assert!(report.output.exists());
    assert_eq!(temp_files(dir.path()), 0);
}

#[test]
fn shutdown_without_recording_is_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![])),
        recorder_in(dir.path()),
    );
    assert!(presenter.shutdown().unwrap().is_none());
}

#[tokio::test]
async fn ticker_runs_until_quit() {
    let dir = tempfile::tempdir().unwrap();
    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(500.0, vec![])),
        recorder_in(dir.path()),
    );
    let mut display = RecordingDisplay {
        script: VecDeque::from(vec![
            vec![],
            vec![Command::ToggleRecording],
            vec![],
            vec![Command::ToggleRecording, Command::Quit],
        ]),
        ..RecordingDisplay::default()
    };

    ticker::run(&mut presenter, &mut display).await.unwrap();

    assert_eq!(display.frames.len(), 3);
    assert_eq!(presenter.state(), LoopState::PreviewOnly);
    assert!(presenter.recording().is_none());
    assert_eq!(temp_files(dir.path()), 0);
}

#[test]
fn back_to_back_sessions_keep_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = recorder_in(dir.path());
    let small = FrameSize::new(16, 16);
    let frame = Frame::from_rgb(small, vec![90u8; small.rgb_len()], 1).unwrap();

    let mut reports = Vec::new();
    for frames in [5, 2] {
        let mut session = recorder.start(30.0, small).unwrap();
        for _ in 0..frames {
            session.write_frame(&frame).unwrap();
        }
        reports.push(session.stop().unwrap().finalize().unwrap());
    }

    assert_ne!(reports[0].output, reports[1].output);
    assert_eq!(recordings(dir.path()).len(), 2);
    assert_eq!(count_frames(&reports[0].output), 5);
    assert_eq!(count_frames(&reports[1].output), 2);
    assert_eq!(temp_files(dir.path()), 0);
}

#[test]
fn failed_finalize_keeps_temp_and_returns_to_preview() {
    let dir = tempfile::tempdir().unwrap();
    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![])),
        recorder_in(dir.path()),
    );
    let mut display = RecordingDisplay::default();

    presenter.start_recording().unwrap();
    for _ in 0..3 {
        presenter.tick(&mut display).unwrap();
    }
    let paths = presenter.recording().unwrap().paths().clone();
    // A directory where the final file should go makes the rewrite fail
    std::fs::create_dir(&paths.output).unwrap();

    let err = presenter.stop_recording().unwrap_err();
    assert!(matches!(err, Error::Reencode { .. }), "{err}");
    assert_eq!(presenter.state(), LoopState::PreviewOnly);
    assert!(presenter.recording().is_none());
    assert!(presenter
        .status()
        .message
        .starts_with("Recording not finalized"));
    assert!(paths.temp.exists());
    assert_eq!(AviReader::open(&paths.temp).unwrap().declared_frames(), 3);

    // Preview carries on
    assert_eq!(presenter.tick(&mut display).unwrap(), TickOutcome::Presented);
}

#[test]
fn full_recording_is_finalized_and_preview_continues() {
    let dir = tempfile::tempdir().unwrap();
    let black = Frame::from_rgb(SIZE, vec![0u8; SIZE.rgb_len()], 0).unwrap();
    let jpeg_len = encode_jpeg(&black, 85).unwrap().len() as u64;
    // header, idx1 header, then three chunks with their index entries
    let limit = 224 + 8 + 3 * (8 + jpeg_len + jpeg_len % 2 + 16);

    let mut presenter = PresentationLoop::new(
        Box::new(ScriptedSource::new(30.0, vec![])),
        recorder_in(dir.path()).with_max_file_len(limit),
    );
    let mut display = RecordingDisplay::default();

    presenter.start_recording().unwrap();
    for _ in 0..3 {
        presenter.tick(&mut display).unwrap();
    }
    assert_eq!(presenter.state(), LoopState::Recording);

    assert_eq!(presenter.tick(&mut display).unwrap(), TickOutcome::Presented);
    assert_eq!(presenter.state(), LoopState::PreviewOnly);
    assert!(presenter.recording().is_none());
    assert!(presenter.status().message.starts_with("Size limit reached"));

    let saved = recordings(dir.path());
    assert_eq!(saved.len(), 1);
    assert_eq!(count_frames(&saved[0]), 3);
    assert_eq!(temp_files(dir.path()), 0);

    presenter.tick(&mut display).unwrap();
    assert_eq!(display.frames.len(), 5);
}
