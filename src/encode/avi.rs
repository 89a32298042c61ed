//! Motion-JPEG in RIFF AVI: one video stream of `00dc` chunks plus an `idx1` index

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use super::{encode_jpeg, SinkSummary, VideoSink, DEFAULT_JPEG_QUALITY};
use crate::capture::decoder::decode_jpeg;
use crate::capture::{Frame, FrameSize};
use crate::error::CodecError;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
/// Rates are stamped as `rate / RATE_SCALE` so fractional rates survive.
const RATE_SCALE: u32 = 1000;
const FRAME_CHUNK: [u8; 4] = *b"00dc";

// RIFF(12) + LIST hdrl(12) + avih(64) + LIST strl(12) + strh(64) + strf(48) + LIST movi(12)
const HEADER_LEN: u64 = 224;
const HDRL_LEN: u32 = 192;
const STRL_LEN: u32 = 116;
const IDX_ENTRY_LEN: u64 = 16;
/// RIFF sizes are 32-bit, so a file (index included) can never grow past this.
pub const MAX_FILE_LEN: u64 = u32::MAX as u64;

/// Geometry and frame rate of the single video stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub size: FrameSize,
    pub frame_rate: f64,
}

impl StreamInfo {
    pub fn new(size: FrameSize, frame_rate: f64) -> Self {
        Self { size, frame_rate }
    }

    fn validate(&self) -> Result<(), CodecError> {
        if self.size.is_empty() || self.size.width > i16::MAX as u32 || self.size.height > i16::MAX as u32 {
            return Err(CodecError::Malformed(format!("unsupported frame size {}", self.size)));
        }
        let scaled = self.frame_rate * f64::from(RATE_SCALE);
        if !scaled.is_finite() || scaled < 1.0 || scaled > f64::from(u32::MAX) {
            return Err(CodecError::Malformed(format!("unsupported frame rate {}", self.frame_rate)));
        }
        Ok(())
    }

    fn rate_fraction(&self) -> (u32, u32) {
        ((self.frame_rate * f64::from(RATE_SCALE)).round() as u32, RATE_SCALE)
    }
}

struct HeaderCounts {
    frames: u32,
    /// `movi` list size field: the list type plus every chunk.
    movi_len: u32,
    riff_len: u32,
    max_chunk: u32,
}

fn put_u16(b: &mut Vec<u8>, v: u16) {
    b.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(b: &mut Vec<u8>, v: u32) {
    b.extend_from_slice(&v.to_le_bytes());
}

fn header(info: &StreamInfo, counts: &HeaderCounts) -> Vec<u8> {
    let (rate, scale) = info.rate_fraction();
    let usec_per_frame = (1_000_000.0 / info.frame_rate).round() as u32;
    let max_bytes_per_sec = (f64::from(counts.max_chunk) * info.frame_rate).min(f64::from(u32::MAX)) as u32;
    let (w, h) = (info.size.width, info.size.height);

    let mut b = Vec::with_capacity(HEADER_LEN as usize);
    b.extend_from_slice(b"RIFF");
    put_u32(&mut b, counts.riff_len);
    b.extend_from_slice(b"AVI ");

    b.extend_from_slice(b"LIST");
    put_u32(&mut b, HDRL_LEN);
    b.extend_from_slice(b"hdrl");

    b.extend_from_slice(b"avih");
    put_u32(&mut b, 56);
    for v in [
        usec_per_frame,
        max_bytes_per_sec,
        0, // padding granularity
        AVIF_HASINDEX,
        counts.frames,
        0, // initial frames
        1, // streams
        counts.max_chunk,
        w,
        h,
        0,
        0,
        0,
        0,
    ] {
        put_u32(&mut b, v);
    }

    b.extend_from_slice(b"LIST");
    put_u32(&mut b, STRL_LEN);
    b.extend_from_slice(b"strl");

    b.extend_from_slice(b"strh");
    put_u32(&mut b, 56);
    b.extend_from_slice(b"vids");
    b.extend_from_slice(b"MJPG");
    put_u32(&mut b, 0); // flags
    put_u16(&mut b, 0); // priority
    put_u16(&mut b, 0); // language
    for v in [0, scale, rate, 0, counts.frames, counts.max_chunk, u32::MAX, 0] {
        put_u32(&mut b, v);
    }
    for v in [0, 0, w as u16, h as u16] {
        put_u16(&mut b, v);
    }

    b.extend_from_slice(b"strf");
    put_u32(&mut b, 40);
    put_u32(&mut b, 40);
    put_u32(&mut b, w);
    put_u32(&mut b, h);
    put_u16(&mut b, 1); // planes
    put_u16(&mut b, 24); // bit count
    b.extend_from_slice(b"MJPG");
    put_u32(&mut b, w * h * 3);
    for _ in 0..4 {
        put_u32(&mut b, 0);
    }

    b.extend_from_slice(b"LIST");
    put_u32(&mut b, counts.movi_len);
    b.extend_from_slice(b"movi");

    debug_assert_eq!(b.len() as u64, HEADER_LEN);
    b
}

/// Streaming AVI writer. Header sizes are patched on `finish`, which also
/// runs on drop if it was never called.
pub struct AviWriter<W: Write + Seek> {
    inner: W,
    info: StreamInfo,
    quality: u8,
    /// (offset from the `movi` list type, payload length)
    index: Vec<(u32, u32)>,
    /// Bytes written after the `movi` list type.
    movi_data: u64,
    max_chunk: u32,
    size_limit: u64,
    finished: bool,
}

impl AviWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, info: StreamInfo) -> Result<Self, CodecError> {
        info.validate()?;
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file), info)
    }
}

impl<W: Write + Seek> AviWriter<W> {
    pub fn new(mut inner: W, info: StreamInfo) -> Result<Self, CodecError> {
        info.validate()?;
        let counts = HeaderCounts {
            frames: 0,
            movi_len: 4,
            riff_len: (HEADER_LEN - 8) as u32,
            max_chunk: 0,
        };
        inner.write_all(&header(&info, &counts))?;

        Ok(Self {
            inner,
            info,
            quality: DEFAULT_JPEG_QUALITY,
            index: Vec::new(),
            movi_data: 0,
            max_chunk: 0,
            size_limit: MAX_FILE_LEN,
            finished: false,
        })
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Cap the finished file length, index and header included. Never above
    /// `MAX_FILE_LEN`.
    pub fn with_size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = bytes.min(MAX_FILE_LEN);
        self
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    pub fn frames(&self) -> u64 {
        self.index.len() as u64
    }

    fn append(&mut self, payload: &[u8]) -> Result<(), CodecError> {
        if self.finished {
            return Err(CodecError::Malformed("writer already finished".into()));
        }
        let len = u32::try_from(payload.len())
            .map_err(|_| CodecError::Malformed("frame larger than 4 GiB".into()))?;

        // The chunk plus its index entry must still fit next to the trailer
        let chunk_len = 8 + u64::from(len) + u64::from(len % 2);
        let entries = self.index.len() as u64 + 1;
        let projected = HEADER_LEN + self.movi_data + chunk_len + 8 + IDX_ENTRY_LEN * entries;
        if projected > self.size_limit {
            return Err(CodecError::Full {
                frames: self.index.len() as u64,
                limit: self.size_limit,
            });
        }
        let offset = (4 + self.movi_data) as u32;

        self.inner.write_all(&FRAME_CHUNK)?;
        self.inner.write_all(&len.to_le_bytes())?;
        self.inner.write_all(payload)?;
        if len % 2 == 1 {
            self.inner.write_all(&[0])?;
        }

        self.movi_data += chunk_len;
        self.index.push((offset, len));
        self.max_chunk = self.max_chunk.max(len);
        Ok(())
    }

    fn summary(&self) -> SinkSummary {
        let idx_len = 8 + IDX_ENTRY_LEN * self.index.len() as u64;
        SinkSummary {
            frames: self.index.len() as u64,
            bytes: HEADER_LEN + self.movi_data + idx_len,
        }
    }

    fn write_trailer(&mut self) -> Result<SinkSummary, CodecError> {
        if self.finished {
            return Ok(self.summary());
        }
        // Never retried, even on failure.
        self.finished = true;

        let mut idx = Vec::with_capacity(8 + IDX_ENTRY_LEN as usize * self.index.len());
        idx.extend_from_slice(b"idx1");
        put_u32(&mut idx, (IDX_ENTRY_LEN as usize * self.index.len()) as u32);
        for &(offset, len) in &self.index {
            idx.extend_from_slice(&FRAME_CHUNK);
            put_u32(&mut idx, AVIIF_KEYFRAME);
            put_u32(&mut idx, offset);
            put_u32(&mut idx, len);
        }
        self.inner.write_all(&idx)?;

        let summary = self.summary();
        let too_big = |_| CodecError::Malformed("recording exceeds 4 GiB".into());
        let counts = HeaderCounts {
            frames: u32::try_from(summary.frames).map_err(too_big)?,
            movi_len: u32::try_from(4 + self.movi_data).map_err(too_big)?,
            riff_len: u32::try_from(summary.bytes - 8).map_err(too_big)?,
            max_chunk: self.max_chunk,
        };

        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.write_all(&header(&self.info, &counts))?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;

        Ok(summary)
    }
}

impl<W: Write + Seek> VideoSink for AviWriter<W> {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), CodecError> {
        if frame.size() != self.info.size {
            return Err(CodecError::Malformed(format!(
                "frame is {}, stream is {}",
                frame.size(),
                self.info.size
            )));
        }
        let jpeg = encode_jpeg(frame, self.quality)?;
        self.append(&jpeg)
    }

    fn write_encoded(&mut self, jpeg: &[u8]) -> Result<(), CodecError> {
        self.append(jpeg)
    }

    fn finish(&mut self) -> Result<SinkSummary, CodecError> {
        self.write_trailer()
    }
}

impl<W: Write + Seek> Drop for AviWriter<W> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Closing AVI stream that was not finished explicitly");
            if let Err(e) = self.write_trailer() {
                warn!("Failed to close AVI stream: {}", e);
            }
        }
    }
}

fn le_u32(buf: &[u8], at: usize) -> Result<u32, CodecError> {
    buf.get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| CodecError::Malformed(format!("header field at {at} is truncated")))
}

fn fourcc(id: &[u8]) -> String {
    String::from_utf8_lossy(id).into_owned()
}

/// Split an in-memory list body into (id, body) chunks.
fn sub_chunks(mut buf: &[u8]) -> Result<Vec<([u8; 4], &[u8])>, CodecError> {
    let mut chunks = Vec::new();
    while buf.len() >= 8 {
        let id = [buf[0], buf[1], buf[2], buf[3]];
        let len = le_u32(buf, 4)? as usize;
        let body = buf
            .get(8..8 + len)
            .ok_or_else(|| CodecError::Malformed(format!("truncated {} chunk", fourcc(&id))))?;
        chunks.push((id, body));
        let next = (8 + len + (len & 1)).min(buf.len());
        buf = &buf[next..];
    }
    Ok(chunks)
}

fn parse_hdrl(body: &[u8]) -> Result<(StreamInfo, u32), CodecError> {
    let mut avih = None;
    let mut strh = None;
    let mut strf = None;

    for (id, chunk) in sub_chunks(body)? {
        match &id {
            b"avih" => {
                avih = Some((
                    le_u32(chunk, 0)?,
                    le_u32(chunk, 16)?,
                    FrameSize::new(le_u32(chunk, 32)?, le_u32(chunk, 36)?),
                ));
            }
            b"LIST" if chunk.starts_with(b"strl") && strh.is_none() => {
                let mut video = false;
                for (id, sub) in sub_chunks(&chunk[4..])? {
                    match &id {
                        b"strh" if sub.starts_with(b"vids") => {
                            video = true;
                            strh = Some((le_u32(sub, 20)?, le_u32(sub, 24)?, le_u32(sub, 32)?));
                        }
                        b"strf" if video => {
                            let height = le_u32(sub, 8)? as i32;
                            strf = Some(FrameSize::new(le_u32(sub, 4)?, height.unsigned_abs()));
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    let (usec_per_frame, avih_frames, avih_size) =
        avih.ok_or_else(|| CodecError::Malformed("missing avih header".into()))?;

    let frame_rate = match strh {
        Some((scale, rate, _)) if scale > 0 && rate > 0 => f64::from(rate) / f64::from(scale),
        _ if usec_per_frame > 0 => 1_000_000.0 / f64::from(usec_per_frame),
        _ => return Err(CodecError::Malformed("no frame rate in header".into())),
    };
    let size = strf.filter(|s| !s.is_empty()).unwrap_or(avih_size);
    if size.is_empty() {
        return Err(CodecError::Malformed("no frame size in header".into()));
    }
    let frames = strh.map(|(_, _, length)| length).unwrap_or(avih_frames);

    Ok((StreamInfo::new(size, frame_rate), frames))
}

fn read_chunk_header<R: Read>(r: &mut R) -> Result<Option<([u8; 4], u32)>, CodecError> {
    let mut hdr = [0u8; 8];
    match r.read_exact(&mut hdr) {
        Ok(()) => Ok(Some((
            [hdr[0], hdr[1], hdr[2], hdr[3]],
            u32::from_le_bytes([hdr[4], hdr[5], hdr[6], hdr[7]]),
        ))),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Sequential reader over the frames of an MJPEG AVI.
pub struct AviReader<R: Read + Seek> {
    inner: R,
    info: StreamInfo,
    declared_frames: u32,
    movi_end: u64,
    frames_read: u64,
}

impl AviReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        Self::new(BufReader::new(File::open(path.as_ref())?))
    }
}

impl<R: Read + Seek> AviReader<R> {
    pub fn new(mut inner: R) -> Result<Self, CodecError> {
        let mut riff = [0u8; 12];
        inner.read_exact(&mut riff)?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"AVI " {
            return Err(CodecError::Malformed("not a RIFF AVI file".into()));
        }

        let mut hdrl = None;
        loop {
            let (id, len) = read_chunk_header(&mut inner)?
                .ok_or_else(|| CodecError::Malformed("no movi list".into()))?;
            let pad = i64::from(len & 1);

            if &id != b"LIST" {
                inner.seek(SeekFrom::Current(i64::from(len) + pad))?;
                continue;
            }

            let mut list_type = [0u8; 4];
            inner.read_exact(&mut list_type)?;
            let body = len
                .checked_sub(4)
                .ok_or_else(|| CodecError::Malformed("LIST shorter than its type".into()))?;

            match &list_type {
                b"hdrl" => {
                    let mut buf = vec![0u8; body as usize];
                    inner.read_exact(&mut buf)?;
                    inner.seek(SeekFrom::Current(pad))?;
                    hdrl = Some(parse_hdrl(&buf)?);
                }
                b"movi" => {
                    let (info, declared_frames) =
                        hdrl.ok_or_else(|| CodecError::Malformed("movi before hdrl".into()))?;
                    let start = inner.stream_position()?;
                    // An unfinished writer leaves the size at zero; read to EOF.
                    let movi_end = if body == 0 {
                        u64::MAX
                    } else {
                        start + u64::from(body)
                    };
                    return Ok(Self {
                        inner,
                        info,
                        declared_frames,
                        movi_end,
                        frames_read: 0,
                    });
                }
                _ => {
                    inner.seek(SeekFrom::Current(i64::from(body) + pad))?;
                }
            }
        }
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// Frame count from the header; zero for unfinished files.
    pub fn declared_frames(&self) -> u32 {
        self.declared_frames
    }

    /// Next compressed frame payload, untouched.
    pub fn next_encoded(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        loop {
            let pos = self.inner.stream_position()?;
            if pos.saturating_add(8) > self.movi_end {
                return Ok(None);
            }
            let Some((id, len)) = read_chunk_header(&mut self.inner)? else {
                return Ok(None);
            };

            // `LIST rec ` groups are transparent
            if &id == b"LIST" {
                let mut list_type = [0u8; 4];
                self.inner.read_exact(&mut list_type)?;
                continue;
            }

            let pad = i64::from(len & 1);
            if id[2..4] != *b"dc" {
                self.inner.seek(SeekFrom::Current(i64::from(len) + pad))?;
                continue;
            }

            let mut payload = vec![0u8; len as usize];
            match self.inner.read_exact(&mut payload) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!("Last frame chunk is truncated; stopping");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
            self.inner.seek(SeekFrom::Current(pad))?;
            self.frames_read += 1;
            return Ok(Some(payload));
        }
    }

    /// Next frame decoded to RGB24.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        let Some(jpeg) = self.next_encoded()? else {
            return Ok(None);
        };
        let (size, rgb) = decode_jpeg(&jpeg)?;
        if size != self.info.size {
            return Err(CodecError::Malformed(format!(
                "frame {} is {size}, stream is {}",
                self.frames_read, self.info.size
            )));
        }
        Frame::from_rgb(size, rgb, self.frames_read)
            .map(Some)
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }
}
