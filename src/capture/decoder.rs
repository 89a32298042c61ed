use jpeg_decoder::Decoder;

use super::frame::{FrameSize, PixelFormat, CHANNELS};
use crate::error::CodecError;

/// Convert one raw device buffer to tightly packed RGB24.
pub fn decode_frame(data: &[u8], format: PixelFormat, size: FrameSize) -> Result<Vec<u8>, CodecError> {
    let rgb = match format {
        PixelFormat::Mjpeg => {
            let (decoded_size, pixels) = decode_jpeg(data)?;
            if decoded_size != size {
                return Err(CodecError::Malformed(format!(
                    "jpeg is {decoded_size}, device negotiated {size}"
                )));
            }
            pixels
        }
        PixelFormat::Rgb24 => {
            // Already in RGB format
            checked(data, size.rgb_len())?.to_vec()
        }
        PixelFormat::Bgr24 => {
            let data = checked(data, size.rgb_len())?;
            let mut rgb = Vec::with_capacity(data.len());
            for px in data.chunks_exact(CHANNELS) {
                rgb.extend_from_slice(&[px[2], px[1], px[0]]);
            }
            rgb
        }
        PixelFormat::Yuyv4 => {
            let data = checked(data, size.width as usize * size.height as usize * 2)?;
            yuyv_to_rgb(data)
        }
    };

    Ok(rgb)
}

/// Decode a baseline JPEG into RGB24. Grayscale JPEGs are expanded.
pub fn decode_jpeg(data: &[u8]) -> Result<(FrameSize, Vec<u8>), CodecError> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder.decode()?;
    let info = decoder
        .info()
        .ok_or_else(|| CodecError::Malformed("jpeg without frame header".into()))?;
    let size = FrameSize::new(u32::from(info.width), u32::from(info.height));

    match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => Ok((size, pixels)),
        jpeg_decoder::PixelFormat::L8 => {
            let mut rgb = Vec::with_capacity(pixels.len() * CHANNELS);
            for y in pixels {
                rgb.extend_from_slice(&[y, y, y]);
            }
            Ok((size, rgb))
        }
        other => Err(CodecError::Malformed(format!(
            "unsupported jpeg pixel format {other:?}"
        ))),
    }
}

fn checked(data: &[u8], expected: usize) -> Result<&[u8], CodecError> {
    data.get(..expected).ok_or_else(|| {
        CodecError::Malformed(format!("buffer holds {} bytes, need {expected}", data.len()))
    })
}

/// BT.601 studio-swing YUYV (YUY2) to RGB24.
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * CHANNELS);
    for quad in data.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    rgb
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clip = |x: i32| (x >> 8).clamp(0, 255) as u8;
    [
        clip(298 * c + 409 * e + 128),
        clip(298 * c - 100 * d - 208 * e + 128),
        clip(298 * c + 516 * d + 128),
    ]
}
