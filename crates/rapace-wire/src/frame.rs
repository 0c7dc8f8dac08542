//! Length-prefixed frame encoding and decoding.
//!
//! Wire format: `[compressed_flag:1 | length:u32 BE | payload:bytes]`. The
//! compressed flag is reserved and must be zero; compression is out of
//! scope for the core runtime.

use bytes::{Buf, Bytes, BytesMut};
use std::fmt;

/// Size of the frame header: one flag byte plus a big-endian u32 length.
const HEADER_LEN: usize = 5;

/// Default cap on a single frame's payload length (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Errors raised while decoding frames from a byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The compressed flag was nonzero; compression is not implemented.
    UnsupportedCompression,
    /// The declared payload length exceeds the configured maximum.
    MessageTooLarge { len: u32, max: u32 },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::UnsupportedCompression => {
                write!(f, "frame compression flag set but compression is unsupported")
            }
            FrameError::MessageTooLarge { len, max } => {
                write!(f, "message too large: {len} bytes exceeds limit of {max} bytes")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// Encode a single frame: flag byte (always 0) + big-endian length + payload.
pub fn encode_frame(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&[0u8]);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Stateful parser that reassembles frames out of arbitrarily-chunked bytes.
///
/// Feed it byte slices in arrival order; it returns every complete frame it
/// can assemble and retains any trailing partial frame for the next call.
/// Frames are always emitted in the order their bytes were fed.
pub struct FrameParser {
    buf: BytesMut,
    max_len: u32,
}

impl FrameParser {
    /// Create a parser with the default 16 MiB frame-size limit.
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a parser with a custom frame-size limit.
    pub fn with_max_len(max_len: u32) -> Self {
        Self {
            buf: BytesMut::new(),
            max_len,
        }
    }

    /// Feed newly-arrived bytes and return any complete frames they yield.
    ///
    /// On error the parser's internal buffer is left as-is; the caller must
    /// treat the error as terminal for the stream these bytes came from.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Bytes>, FrameError> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }

            let flag = self.buf[0];
            if flag != 0 {
                return Err(FrameError::UnsupportedCompression);
            }

            let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
            if len > self.max_len {
                return Err(FrameError::MessageTooLarge {
                    len,
                    max: self.max_len,
                });
            }

            let total = HEADER_LEN + len as usize;
            if self.buf.len() < total {
                break;
            }

            self.buf.advance(HEADER_LEN);
            out.push(self.buf.split_to(len as usize).freeze());
        }

        Ok(out)
    }

    /// Number of bytes currently buffered (including an incomplete header).
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse_single_frame() {
        let encoded = encode_frame(b"hello");
        let mut parser = FrameParser::new();
        let frames = parser.feed(&encoded).unwrap();
        assert_eq!(frames, vec![Bytes::from_static(b"hello")]);
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn parse_handles_arbitrary_rechunking() {
        let mut all = BytesMut::new();
        all.extend_from_slice(&encode_frame(b"one"));
        all.extend_from_slice(&encode_frame(b"two"));
        all.extend_from_slice(&encode_frame(b"three"));

        // Feed one byte at a time; frames must still come out in order.
        let mut parser = FrameParser::new();
        let mut got = Vec::new();
        for byte in all.iter() {
            got.extend(parser.feed(&[*byte]).unwrap());
        }

        assert_eq!(
            got,
            vec![
                Bytes::from_static(b"one"),
                Bytes::from_static(b"two"),
                Bytes::from_static(b"three"),
            ]
        );
    }

    #[test]
    fn partial_trailing_frame_is_buffered() {
        let encoded = encode_frame(b"payload");
        let mut parser = FrameParser::new();
        let (first, second) = encoded.split_at(3);
        assert!(parser.feed(first).unwrap().is_empty());
        let frames = parser.feed(second).unwrap();
        assert_eq!(frames, vec![Bytes::from_static(b"payload")]);
    }

    #[test]
    fn zero_length_frame_round_trips() {
        let encoded = encode_frame(b"");
        let mut parser = FrameParser::new();
        let frames = parser.feed(&encoded).unwrap();
        assert_eq!(frames, vec![Bytes::new()]);
    }

    #[test]
    fn rejects_compressed_flag() {
        let mut raw = encode_frame(b"x").to_vec();
        raw[0] = 1;
        let mut parser = FrameParser::new();
        assert_eq!(parser.feed(&raw), Err(FrameError::UnsupportedCompression));
    }

    #[test]
    fn rejects_oversize_message() {
        let mut parser = FrameParser::with_max_len(4);
        let encoded = encode_frame(b"toolong");
        assert_eq!(
            parser.feed(&encoded),
            Err(FrameError::MessageTooLarge { len: 7, max: 4 })
        );
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut all = BytesMut::new();
        all.extend_from_slice(&encode_frame(b"a"));
        all.extend_from_slice(&encode_frame(b"bb"));

        let mut parser = FrameParser::new();
        let frames = parser.feed(&all).unwrap();
        assert_eq!(
            frames,
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"bb")]
        );
    }
}
