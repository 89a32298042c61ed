//! SDL2 Window Display Module
//! Creates the preview window, renders RGB24 frames scaled to the window and
//! turns keyboard input into control commands.

use sdl2::event::Event;
use sdl2::keyboard::Scancode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use sdl2::EventPump;
use tracing::{info, warn};

use super::DisplaySurface;
use crate::capture::{Frame, FrameSize};
use crate::error::{Error, Result};
use crate::pipeline::{Command, Status};
use crate::DisplayConfig;

/// One-line summary of `command_for_key`, shown at startup.
pub const KEY_HELP: &str = "Space record | B/V brightness +/- | N/M contrast +/- | F flip | G grayscale | T timestamp | Esc quit";

/// Keyboard bindings for the control surface, by physical key.
pub fn command_for_key(key: Scancode) -> Option<Command> {
    let command = match key {
        Scancode::Space => Command::ToggleRecording,
        Scancode::B => Command::IncreaseBrightness,
        Scancode::V => Command::DecreaseBrightness,
        Scancode::N => Command::IncreaseContrast,
        Scancode::M => Command::DecreaseContrast,
        Scancode::F => Command::ToggleFlip,
        Scancode::G => Command::ToggleGrayscale,
        Scancode::T => Command::ToggleTimestamp,
        Scancode::Escape => Command::Quit,
        _ => return None,
    };
    Some(command)
}

/// Preview window height for `width`, keeping the frame's aspect ratio.
pub fn preview_height(width: u32, frame: FrameSize) -> u32 {
    if frame.width == 0 {
        return width;
    }
    ((u64::from(width) * u64::from(frame.height)) / u64::from(frame.width)).max(1) as u32
}

fn sdl_err(e: impl ToString) -> Error {
    Error::Display(e.to_string())
}

/// SDL2 Window Display
pub struct Sdl2Display {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    event_pump: EventPump,
    title: String,
    shown_status: Option<String>,
}

impl Sdl2Display {
    pub fn new(sdl_context: &sdl2::Sdl, config: &DisplayConfig, frame: FrameSize) -> Result<Self> {
        let video_subsystem = sdl_context.video().map_err(sdl_err)?;

        let width = config.width;
        let height = preview_height(width, frame);
        info!("Opening {}x{} preview window for {} frames", width, height, frame);
        info!("Keys: {}", KEY_HELP);

        let window = video_subsystem
            .window(&config.title, width, height)
            .position_centered()
            .resizable()
            .build()
            .map_err(sdl_err)?;

        let canvas = window.into_canvas().present_vsync().build().map_err(sdl_err)?;
        let texture_creator = canvas.texture_creator();
        let event_pump = sdl_context.event_pump().map_err(sdl_err)?;

        Ok(Self {
            canvas,
            texture_creator,
            event_pump,
            title: config.title.clone(),
            shown_status: None,
        })
    }

    fn update_title(&mut self, status: &Status) {
        let text = status.to_string();
        if self.shown_status.as_deref() == Some(text.as_str()) {
            return;
        }
        let title = format!("{} - {}", self.title, text);
        if let Err(e) = self.canvas.window_mut().set_title(&title) {
            warn!("Could not set window title: {}", e);
        }
        self.shown_status = Some(text);
    }
}

impl DisplaySurface for Sdl2Display {
    fn poll_commands(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        for event in self.event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => {
                    info!("Quit event received");
                    commands.push(Command::Quit);
                }
                Event::KeyDown {
                    scancode: Some(key),
                    repeat: false,
                    ..
                } => commands.extend(command_for_key(key)),
                _ => {}
            }
        }
        commands
    }

    fn present(&mut self, frame: &Frame, status: &Status) -> Result<()> {
        self.update_title(status);

        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGB24, frame.width(), frame.height())
            .map_err(sdl_err)?;

        texture
            .update(None, &frame.data, frame.width() as usize * 3)
            .map_err(sdl_err)?;

        self.canvas.clear();
        self.canvas.copy(&texture, None, None).map_err(sdl_err)?;
        self.canvas.present();
        Ok(())
    }
}
