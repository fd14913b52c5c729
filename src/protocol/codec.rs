//! Length-prefixed framing: `[4-byte big-endian length][UTF-8 JSON body]`

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::PokerError;
use crate::protocol::Envelope;

pub const LENGTH_PREFIX: usize = 4;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Framing failures. Anything but `Io` leaves the stream unusable.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Incomplete frame: expected {expected} bytes, {available} available")]
    IncompleteFrame { expected: usize, available: usize },

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Bad format: {message}")]
    BadFormat { message: String },
}

impl From<CodecError> for PokerError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => PokerError::from(e),
            other => PokerError::Framing {
                message: other.to_string(),
            },
        }
    }
}

/// Encode one envelope as a complete frame
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let body = envelope.to_json_bytes().map_err(|e| CodecError::BadFormat {
        message: e.to_string(),
    })?;
    let len = u32::try_from(body.len()).map_err(|_| CodecError::FrameTooLarge {
        len: body.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` and leaves `buf` untouched while the frame is still
/// incomplete; a frame is only consumed once it is whole.
pub fn decode_frame(buf: &mut BytesMut, max_frame_bytes: usize) -> Result<Option<Envelope>, CodecError> {
    if buf.len() < LENGTH_PREFIX {
        return Ok(None);
    }

    let mut prefix = [0u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&buf[..LENGTH_PREFIX]);
    let len = u32::from_be_bytes(prefix) as usize;

    if len > max_frame_bytes {
        return Err(CodecError::FrameTooLarge {
            len,
            max: max_frame_bytes,
        });
    }

    if buf.len() < LENGTH_PREFIX + len {
        buf.reserve(LENGTH_PREFIX + len - buf.len());
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX);
    let body = buf.split_to(len);
    let text = std::str::from_utf8(&body).map_err(|e| CodecError::BadFormat {
        message: format!("body is not UTF-8: {}", e),
    })?;

    Envelope::from_json_bytes(text.as_bytes())
        .map(Some)
        .map_err(|e| CodecError::BadFormat { message: e.to_string() })
}

/// `tokio_util` codec for envelopes
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for FrameCodec {
    type Item = Envelope;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.max_frame_bytes)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(envelope) => Ok(Some(envelope)),
            None if buf.is_empty() => Ok(None),
            None => {
                let expected = if buf.len() >= LENGTH_PREFIX {
                    LENGTH_PREFIX + u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize
                } else {
                    LENGTH_PREFIX
                };
                Err(CodecError::IncompleteFrame {
                    expected,
                    available: buf.len(),
                })
            }
        }
    }
}

impl Encoder<Envelope> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = encode_frame(&item)?;
        if frame.len() - LENGTH_PREFIX > self.max_frame_bytes {
            return Err(CodecError::FrameTooLarge {
                len: frame.len() - LENGTH_PREFIX,
                max: self.max_frame_bytes,
            });
        }
        dst.reserve(frame.len());
        dst.put_slice(&frame);
        Ok(())
    }
}
