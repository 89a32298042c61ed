use crate::capture::{Frame, FrameSize};
use crate::error::Result;

/// Rate assumed when a device reports a non-positive frame rate.
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// Geometry and cadence read once when the device is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceParams {
    pub size: FrameSize,
    /// Frames per second reported by the device, or the fallback.
    pub declared_rate: f64,
}

impl DeviceParams {
    /// Use `reported_rate` when it is a positive number, otherwise `fallback`.
    pub fn new(size: FrameSize, reported_rate: f64, fallback: f64) -> Self {
        let declared_rate = if reported_rate.is_finite() && reported_rate > 0.0 {
            reported_rate
        } else if fallback.is_finite() && fallback > 0.0 {
            fallback
        } else {
            DEFAULT_FRAME_RATE
        };

        Self {
            size,
            declared_rate,
        }
    }
}

/// Something that yields RGB24 frames at a fixed geometry.
///
/// Implementations hold their device exclusively and release it on drop.
pub trait FrameSource {
    fn params(&self) -> DeviceParams;

    /// Blocking read of the next frame.
    ///
    /// `Error::FrameDropped` is expected under normal jitter; callers skip
    /// the tick.
    fn read_frame(&mut self) -> Result<Frame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn params(&self) -> DeviceParams {
        (**self).params()
    }

    fn read_frame(&mut self) -> Result<Frame> {
        (**self).read_frame()
    }
}
