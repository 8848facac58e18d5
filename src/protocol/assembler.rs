use bytes::{BufMut, Bytes, BytesMut};

use super::checksum::{parse_hex, xor_checksum};
use super::{CHECKSUM_DELIMITER, FRAME_END, FRAME_START, MIN_FRAME_LEN, SUFFIX_LEN};
use crate::core::ErrorCode;

/// Outcome of a completed (or abandoned) frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    /// Checksum-validated region between `$` and `*`
    Payload(Bytes),
    /// Frame dropped; the code is reported to the peer
    Rejected(ErrorCode),
}

/// Byte-at-a-time frame assembler.
///
/// Bytes outside a frame are ignored and a `$` always starts a new frame,
/// silently discarding whatever was buffered before it.
#[derive(Debug)]
pub struct FrameAssembler {
    /// Bytes received since the last `$`
    buffer: BytesMut,
    /// Buffered length at which the frame is dropped
    max_frame_len: usize,
    /// Whether a `$` has been seen and the frame is still open
    in_frame: bool,
}

impl FrameAssembler {
    /// Creates an assembler dropping frames of `max_frame_len` bytes or more
    pub fn new(max_frame_len: usize) -> Self {
        FrameAssembler {
            buffer: BytesMut::with_capacity(max_frame_len),
            max_frame_len,
            in_frame: false,
        }
    }

    /// Returns whether a frame is currently being buffered
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Returns the number of buffered bytes
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds one byte, returning an outcome once a frame completes or is dropped
    pub fn feed(&mut self, byte: u8) -> Option<Assembled> {
        if byte == FRAME_START {
            self.buffer.clear();
            self.in_frame = true;
            return None;
        }

        if !self.in_frame {
            return None;
        }

        self.buffer.put_u8(byte);

        if self.buffer.len() >= MIN_FRAME_LEN && self.buffer.ends_with(FRAME_END) {
            let outcome = self.validate();
            self.reset();
            return Some(outcome);
        }

        if self.buffer.len() >= self.max_frame_len {
            self.reset();
            return Some(Assembled::Rejected(ErrorCode::IncomingMessageTooLong));
        }

        None
    }

    /// Drops any buffered bytes and leaves the frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_frame = false;
    }

    fn validate(&self) -> Assembled {
        let len = self.buffer.len();
        let star = len - SUFFIX_LEN;

        if self.buffer[star] != CHECKSUM_DELIMITER {
            return Assembled::Rejected(ErrorCode::RxChecksum);
        }

        let digits = [self.buffer[star + 1], self.buffer[star + 2]];
        let region = &self.buffer[..star];

        match parse_hex(digits) {
            Some(checksum) if checksum == xor_checksum(region) => {
                Assembled::Payload(Bytes::copy_from_slice(region))
            }
            _ => Assembled::Rejected(ErrorCode::RxChecksum),
        }
    }
}
