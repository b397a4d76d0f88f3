//! Length-prefixed frame codec
//!
//! Every message on the wire is `[4-byte big-endian length][payload]`. A
//! clean close at the length boundary is end-of-stream, not an error; a
//! close anywhere inside a frame is a protocol violation.

use crate::protocol::{LEN_PREFIX_BYTES, MAX_FRAME_SIZE};
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    /// Peer closed the connection between frames. Normal termination.
    #[error("end of stream")]
    EndOfStream,

    /// Peer closed the connection mid-frame.
    #[error("truncated frame: expected {expected} bytes, got {got}")]
    TruncatedFrame { expected: usize, got: usize },

    /// Declared length exceeds the configured cap. Rejected before any
    /// payload allocation.
    #[error("frame too large: {declared} bytes (max {max})")]
    FrameTooLarge { declared: usize, max: usize },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one frame with the default size cap.
pub fn read_frame<R: Read>(stream: &mut R) -> Result<Vec<u8>, FrameError> {
    read_frame_limited(stream, MAX_FRAME_SIZE)
}

/// Read one frame, rejecting any declared length above `max_size`.
pub fn read_frame_limited<R: Read>(
    stream: &mut R,
    max_size: usize,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; LEN_PREFIX_BYTES];
    let got = fill(stream, &mut len_buf)?;
    if got == 0 {
        return Err(FrameError::EndOfStream);
    }
    if got < LEN_PREFIX_BYTES {
        return Err(FrameError::TruncatedFrame {
            expected: LEN_PREFIX_BYTES,
            got,
        });
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(FrameError::FrameTooLarge {
            declared: len,
            max: max_size,
        });
    }

    let mut payload = vec![0u8; len];
    let got = fill(stream, &mut payload)?;
    if got < len {
        return Err(FrameError::TruncatedFrame { expected: len, got });
    }
    Ok(payload)
}

/// Write one frame: length prefix, payload, flush. All bytes of a frame hit
/// the stream before the call returns, so callers may interleave frames
/// freely as long as they do not interleave calls.
pub fn write_frame<W: Write>(stream: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::FrameTooLarge {
        declared: payload.len(),
        max: u32::MAX as usize,
    })?;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(payload)?;
    stream.flush()?;
    Ok(())
}

/// Read until `buf` is full or the stream ends. Returns bytes read.
fn fill<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match stream.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}
