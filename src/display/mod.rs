pub mod sdl;

use crate::capture::Frame;
use crate::error::Result;
use crate::pipeline::{Command, Status};

pub use sdl::{Sdl2Display, KEY_HELP};

/// Where preview frames go and where control commands come from.
pub trait DisplaySurface {
    /// Commands queued since the last call, oldest first.
    fn poll_commands(&mut self) -> Vec<Command>;

    /// Show one overlaid frame together with the current status.
    fn present(&mut self, frame: &Frame, status: &Status) -> Result<()>;
}
