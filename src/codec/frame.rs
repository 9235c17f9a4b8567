//! ANT serial frame encoder/decoder.
//!
//! # Frame format
//!
//! ```text
//! 0xA4 <len> <msg-id> [<payload>; len] <checksum>
//! ```
//!
//! - `0xA4`: sync byte
//! - `len`: number of payload bytes (excludes sync, length, id and checksum)
//! - `msg-id`: message id, see [`crate::protocol::message_id`]
//! - `checksum`: XOR of every preceding byte, sync included

use bytes::{BufMut, BytesMut};

use crate::protocol::SYNC;
use crate::{AntError, Result};

/// Sync, length and message id.
pub const HEADER_SIZE: usize = 3;

/// Smallest valid frame: header plus checksum, no payload.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 1;

/// A framed ANT message: id plus payload, without sync or checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_id: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(message_id: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self { message_id, payload: payload.into() }
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        MIN_FRAME_SIZE + self.payload.len()
    }

    /// Encode into wire bytes ready for the transport.
    ///
    /// # Example
    ///
    /// ```
    /// use crankset::codec::Frame;
    ///
    /// // open channel 0
    /// let bytes = Frame::new(0x4B, vec![0x00]).encode();
    /// assert_eq!(bytes, vec![0xA4, 0x01, 0x4B, 0x00, 0xEE]);
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= u8::MAX as usize);

        let mut buf = BytesMut::with_capacity(self.wire_size());
        buf.put_u8(SYNC);
        buf.put_u8(self.payload.len() as u8);
        buf.put_u8(self.message_id);
        buf.put_slice(&self.payload);
        let sum = checksum(&buf);
        buf.put_u8(sum);
        buf.to_vec()
    }

    /// Parse wire bytes into a frame.
    ///
    /// Bytes after the checksum are ignored; some transports hand over
    /// zero-padded reads.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < MIN_FRAME_SIZE {
            return Err(AntError::FrameTooShort { len: raw.len() });
        }

        if raw[0] != SYNC {
            return Err(AntError::BadSync { found: raw[0] });
        }

        let declared = raw[1] as usize;
        let end = HEADER_SIZE + declared;
        if raw.len() < end + 1 {
            return Err(AntError::LengthMismatch {
                declared,
                actual: raw.len() - MIN_FRAME_SIZE,
            });
        }

        let expected = checksum(&raw[..end]);
        let found = raw[end];
        if expected != found {
            return Err(AntError::checksum(expected, found));
        }

        Ok(Self { message_id: raw[2], payload: raw[HEADER_SIZE..end].to_vec() })
    }
}

/// XOR checksum over a byte run.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}
