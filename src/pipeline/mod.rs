pub mod command;
pub mod presenter;
pub mod ticker;

pub use command::Command;
pub use presenter::{LoopState, PresentationLoop, Status, TickOutcome};
