//! V4L2 webcam capture with memory-mapped buffers

use std::time::Duration;

use tracing::{info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::decoder;
use crate::capture::frame::{Frame, FrameSize, PixelFormat};
use crate::capture::source::{DeviceParams, FrameSource};
use crate::error::{Error, Result};
use crate::CaptureConfig;

impl PixelFormat {
    pub fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
            PixelFormat::Bgr24 => FourCC::new(b"BGR3"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"MJPG" => Some(PixelFormat::Mjpeg),
            b"YUYV" => Some(PixelFormat::Yuyv4),
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"BGR3" => Some(PixelFormat::Bgr24),
            _ => None,
        }
    }
}

/// V4L2 camera held open for the process lifetime
pub struct V4l2Capture {
    // Dropped before the device handle.
    stream: MmapStream<'static>,
    _device: Device,
    format: PixelFormat,
    params: DeviceParams,
    sequence: u64,
}

impl V4l2Capture {
    /// Open the device and negotiate format, geometry and frame interval.
    #[instrument(skip(config), fields(device = %config.device))]
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let unavailable = |what: &str, e: std::io::Error| {
            Error::DeviceUnavailable(format!("{}: {what}: {e}", config.device))
        };

        let device = Device::with_path(&config.device).map_err(|e| unavailable("open", e))?;

        // Query capabilities
        let caps = device.query_caps().map_err(|e| unavailable("query caps", e))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(Error::DeviceUnavailable(format!(
                "{} doesn't support video capture",
                config.device
            )));
        }

        // Set format; the driver may adjust it
        let mut fmt = device.format().map_err(|e| unavailable("get format", e))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = config.format.fourcc();
        let fmt = device
            .set_format(&fmt)
            .map_err(|e| unavailable("set format", e))?;

        let format = PixelFormat::from_fourcc(fmt.fourcc).ok_or_else(|| {
            Error::DeviceUnavailable(format!(
                "{}: unsupported pixel format {}",
                config.device, fmt.fourcc
            ))
        })?;

        if config.fps > 0 {
            if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
                warn!("Device refused {} fps: {}", config.fps, e);
            }
        }

        let reported_rate = match device.params() {
            Ok(p) if p.interval.numerator > 0 => {
                f64::from(p.interval.denominator) / f64::from(p.interval.numerator)
            }
            Ok(_) => 0.0,
            Err(e) => {
                warn!("Could not read frame interval: {}", e);
                0.0
            }
        };

        let params = DeviceParams::new(
            FrameSize::new(fmt.width, fmt.height),
            reported_rate,
            config.fallback_fps,
        );

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count)
            .map_err(|e| unavailable("request buffers", e))?;

        info!(
            "Capture stream ready: {} {:?} at {:.2} fps (reported {:.2}) with {} buffers",
            params.size, format, params.declared_rate, reported_rate, config.buffer_count
        );

        Ok(Self {
            stream,
            _device: device,
            format,
            params,
            sequence: 0,
        })
    }
}

impl FrameSource for V4l2Capture {
    fn params(&self) -> DeviceParams {
        self.params
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| Error::FrameDropped(format!("dequeue: {e}")))?;

        // Some drivers leave bytesused at zero
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };

        let rgb = decoder::decode_frame(&buf[..used], self.format, self.params.size)
            .map_err(|e| Error::FrameDropped(format!("decode: {e}")))?;

        self.sequence += 1;
        let device_timestamp = Duration::from_secs(meta.timestamp.sec as u64)
            + Duration::from_micros(meta.timestamp.usec as u64);

        Ok(Frame::from_rgb(self.params.size, rgb, self.sequence)?
            .with_device_timestamp(device_timestamp))
    }
}
