pub mod decoder;
pub mod frame;
pub mod pattern;
pub mod source;
pub mod v4l2;

pub use frame::{Frame, FrameSize, PixelFormat};
pub use pattern::PatternSource;
pub use source::{DeviceParams, FrameSource, DEFAULT_FRAME_RATE};
pub use v4l2::V4l2Capture;
