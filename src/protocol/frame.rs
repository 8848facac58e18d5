use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::checksum::{render_hex, xor_checksum};
use super::{CHECKSUM_DELIMITER, FRAME_END, FRAME_START, SUFFIX_LEN};
use crate::core::ErrorCode;

/// Bounded builder for one outbound frame.
///
/// The text written through [`fmt::Write`] becomes the checksummed region.
/// Writes that would push the frame past its limit fail and latch the
/// overflow flag, so callers can tell a full buffer apart from a formatting
/// failure.
#[derive(Debug)]
pub struct FrameBuilder {
    buffer: BytesMut,
    limit: usize,
    overflowed: bool,
}

impl FrameBuilder {
    /// Creates a builder for frames of at most `limit` bytes, `$` and `*CC\r\n` included
    pub fn new(limit: usize) -> Self {
        FrameBuilder {
            buffer: BytesMut::with_capacity(limit),
            limit,
            overflowed: false,
        }
    }

    /// Discards any previous frame and writes the opening `$`
    pub fn begin(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
        if self.limit > 0 {
            self.buffer.put_u8(FRAME_START);
        } else {
            self.overflowed = true;
        }
    }

    /// Length of the frame built so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true when nothing has been written since `begin`
    pub fn is_empty(&self) -> bool {
        self.buffer.len() <= 1
    }

    /// Whether a write was refused for lack of room
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Appends `*CC\r\n` and returns the complete frame
    pub fn finish(&mut self) -> Result<&[u8], ErrorCode> {
        if self.overflowed || self.buffer.len() + SUFFIX_LEN > self.limit {
            return Err(ErrorCode::MessageBufTooSmall);
        }

        let checksum = xor_checksum(&self.buffer[1..]);
        self.buffer.put_u8(CHECKSUM_DELIMITER);
        self.buffer.put_slice(&render_hex(checksum));
        self.buffer.put_slice(FRAME_END);
        Ok(&self.buffer[..])
    }
}

impl fmt::Write for FrameBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.overflowed || self.buffer.len() + s.len() > self.limit {
            self.overflowed = true;
            return Err(fmt::Error);
        }
        self.buffer.put_slice(s.as_bytes());
        Ok(())
    }
}

/// Frames `region` into `dst` without any length bound
pub fn encode_frame_into(region: &[u8], dst: &mut BytesMut) {
    dst.reserve(region.len() + 1 + SUFFIX_LEN);
    dst.put_u8(FRAME_START);
    dst.put_slice(region);
    dst.put_u8(CHECKSUM_DELIMITER);
    dst.put_slice(&render_hex(xor_checksum(region)));
    dst.put_slice(FRAME_END);
}

/// Frames `region` into a fresh buffer
pub fn encode_frame(region: &[u8]) -> Bytes {
    let mut dst = BytesMut::new();
    encode_frame_into(region, &mut dst);
    dst.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_error_frame() {
        let mut builder = FrameBuilder::new(64);
        builder.begin();
        write!(builder, "DISPATCHER,ERROR,{}", ErrorCode::TxBufferFull.code()).unwrap();
        assert_eq!(builder.finish().unwrap(), b"$DISPATCHER,ERROR,-7*45\r\n");
    }

    #[test]
    fn test_encode_frame() {
        assert_eq!(
            &encode_frame(b"SET_SPIN_STATE,1,ON")[..],
            b"$SET_SPIN_STATE,1,ON*21\r\n"
        );
    }

    #[test]
    fn test_builder_reuse() {
        let mut builder = FrameBuilder::new(64);
        builder.begin();
        builder.write_str("FIRST,FRAME").unwrap();
        builder.finish().unwrap();

        builder.begin();
        assert!(builder.is_empty());
        builder.write_str("SET_SPIN_STATE,1,ON").unwrap();
        assert_eq!(builder.finish().unwrap(), b"$SET_SPIN_STATE,1,ON*21\r\n");
    }

    #[test]
    fn test_region_overflow() {
        let mut builder = FrameBuilder::new(8);
        builder.begin();
        assert!(builder.write_str("1234567").is_ok());
        assert!(builder.write_str("8").is_err());
        assert!(builder.overflowed());
        // Once latched, even writes that would fit are refused
        assert!(builder.write_str("").is_err());
        assert_eq!(builder.finish(), Err(ErrorCode::MessageBufTooSmall));
    }

    #[test]
    fn test_suffix_overflow() {
        let mut builder = FrameBuilder::new(8);
        builder.begin();
        builder.write_str("ABC").unwrap();
        assert!(!builder.overflowed());
        assert_eq!(builder.finish(), Err(ErrorCode::MessageBufTooSmall));

        builder.begin();
        builder.write_str("AB").unwrap();
        assert_eq!(builder.finish().unwrap().len(), 8);
    }
}
