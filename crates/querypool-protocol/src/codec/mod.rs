//! Length-prefixed frame codec.
//!
//! Every frame on the wire looks like this:
//!
//! ```text
//! +----------------+-----------------+----------------------+
//! | len: u32 (BE)  | version: u16 BE | body: compact JSON   |
//! +----------------+-----------------+----------------------+
//! ```
//!
//! `len` counts the version and body bytes. Blocking readers use
//! [`read_frame`]; event loops that receive arbitrary byte chunks feed a
//! [`FrameDecoder`] instead.

use std::io::{self, Read, Write};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: u16 = 1;

/// Largest accepted frame (version plus body), in bytes.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LEN_PREFIX: usize = 4;
const VERSION_PREFIX: usize = 2;

/// Serialises `value` into a complete frame.
///
/// # Errors
///
/// Returns [`CodecError::Serialize`] when the value cannot be encoded and
/// [`CodecError::Oversized`] when the encoded frame exceeds
/// [`MAX_FRAME_LEN`].
#[expect(
    clippy::big_endian_bytes,
    reason = "the wire format is defined in network byte order"
)]
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_vec(value).map_err(|err| CodecError::Serialize(Arc::new(err)))?;
    let len = body.len().saturating_add(VERSION_PREFIX);
    let oversized = CodecError::Oversized {
        len,
        max: MAX_FRAME_LEN,
    };
    if len > MAX_FRAME_LEN {
        return Err(oversized);
    }
    let wire_len = u32::try_from(len).map_err(|_| oversized)?;

    let mut frame = Vec::with_capacity(LEN_PREFIX.saturating_add(len));
    frame.extend_from_slice(&wire_len.to_be_bytes());
    frame.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Encodes `value` and writes it to `writer`, flushing afterwards.
///
/// # Errors
///
/// Returns any encoding error from [`encode_frame`] or [`CodecError::Io`]
/// when the write fails.
pub fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), CodecError>
where
    W: Write + ?Sized,
    T: Serialize,
{
    let frame = encode_frame(value)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame from `reader`, blocking until it is complete.
///
/// Returns `Ok(None)` when the stream ends cleanly before a new frame
/// starts.
///
/// # Errors
///
/// Returns [`CodecError::Oversized`] for a frame larger than
/// [`MAX_FRAME_LEN`] (the stream is then unusable), a recoverable decoding
/// error when a complete frame carries a bad version or body, and
/// [`CodecError::Io`] when the stream fails or ends mid-frame.
pub fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, CodecError>
where
    R: Read + ?Sized,
    T: DeserializeOwned,
{
    let mut header = [0_u8; LEN_PREFIX];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let len = declared_len(header);
    if len > MAX_FRAME_LEN {
        return Err(CodecError::Oversized {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = vec![0_u8; len];
    reader.read_exact(&mut frame)?;
    decode_body(&frame).map(Some)
}

/// Incremental decoder for frames arriving in arbitrary chunks.
///
/// A complete frame with a bad version or body is consumed and reported as
/// an error, leaving the decoder positioned at the next frame. A frame whose
/// declared length exceeds the limit cannot be skipped safely, so the buffer
/// is discarded.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Creates a decoder accepting frames up to [`MAX_FRAME_LEN`].
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    /// Creates a decoder with a custom frame size limit.
    #[must_use]
    pub const fn with_max_len(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_len,
        }
    }

    /// Appends received bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes waiting for a complete frame.
    #[must_use]
    pub const fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next complete frame, if one is buffered.
    pub fn next_frame<T: DeserializeOwned>(&mut self) -> Option<Result<T, CodecError>> {
        let (header, _) = self.buffer.split_first_chunk::<LEN_PREFIX>()?;
        let len = declared_len(*header);
        if len > self.max_len {
            self.buffer.clear();
            return Some(Err(CodecError::Oversized {
                len,
                max: self.max_len,
            }));
        }

        let total = LEN_PREFIX.saturating_add(len);
        if self.buffer.len() < total {
            return None;
        }

        let frame: Vec<u8> = self.buffer.drain(..total).skip(LEN_PREFIX).collect();
        Some(decode_body(&frame))
    }
}

#[expect(
    clippy::big_endian_bytes,
    reason = "the wire format is defined in network byte order"
)]
fn declared_len(header: [u8; LEN_PREFIX]) -> usize {
    usize::try_from(u32::from_be_bytes(header)).unwrap_or(usize::MAX)
}

#[expect(
    clippy::big_endian_bytes,
    reason = "the wire format is defined in network byte order"
)]
fn decode_body<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CodecError> {
    let Some((version_bytes, body)) = frame.split_first_chunk::<VERSION_PREFIX>() else {
        return Err(CodecError::Runt { len: frame.len() });
    };
    let version = u16::from_be_bytes(*version_bytes);
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion { version });
    }
    serde_json::from_slice(body).map_err(|err| CodecError::Malformed(Arc::new(err)))
}
