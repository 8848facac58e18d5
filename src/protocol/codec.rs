use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::assembler::{Assembled, FrameAssembler};
use super::frame::encode_frame_into;
use crate::core::{Error, MAX_FRAME_LEN};

/// Line codec for the `$...*CC\r\n` framing, for use with `FramedRead`/`FramedWrite`
#[derive(Debug)]
pub struct LineCodec {
    assembler: FrameAssembler,
}

impl LineCodec {
    /// Creates a codec with the default maximum frame length
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    /// Creates a codec dropping frames of `max_frame_len` bytes or more
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        LineCodec {
            assembler: FrameAssembler::new(max_frame_len),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = Assembled;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut consumed = 0;
        let mut outcome = None;

        for byte in src.iter() {
            consumed += 1;
            outcome = self.assembler.feed(*byte);
            if outcome.is_some() {
                break;
            }
        }

        // The assembler keeps its own copy of a partial frame
        src.advance(consumed);
        Ok(outcome)
    }
}

impl Encoder<&str> for LineCodec {
    type Error = Error;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame_into(item.as_bytes(), dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCode;
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    #[test]
    fn test_codec_roundtrip() {
        let mut codec = LineCodec::new();
        let mut bytes = BytesMut::new();

        codec.encode("1,SPINNER,RET_VAL,0", &mut bytes).unwrap();
        codec.encode("DISPATCHER,ERROR,-7", &mut bytes).unwrap();

        assert_eq!(
            codec.decode(&mut bytes).unwrap(),
            Some(Assembled::Payload(Bytes::from_static(b"1,SPINNER,RET_VAL,0")))
        );
        assert_eq!(
            codec.decode(&mut bytes).unwrap(),
            Some(Assembled::Payload(Bytes::from_static(b"DISPATCHER,ERROR,-7")))
        );
        assert_eq!(codec.decode(&mut bytes).unwrap(), None);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_partial_input() {
        let mut codec = LineCodec::new();
        let mut bytes = BytesMut::from(&b"noise$SET_SPIN_"[..]);
        assert_eq!(codec.decode(&mut bytes).unwrap(), None);
        assert!(bytes.is_empty());

        bytes.extend_from_slice(b"STATE,1,ON*21\r\n");
        assert_eq!(
            codec.decode(&mut bytes).unwrap(),
            Some(Assembled::Payload(Bytes::from_static(b"SET_SPIN_STATE,1,ON")))
        );
    }

    #[tokio::test]
    async fn test_framed_read() {
        let mock = tokio_test::io::Builder::new()
            .read(b"$DISPATCHER,ERROR,-7*45\r\n$1,SPIN")
            .read(b"NER,RET_VAL,0*00\r\n")
            .build();

        let mut frames = FramedRead::new(mock, LineCodec::new());
        assert_eq!(
            frames.next().await.unwrap().unwrap(),
            Assembled::Payload(Bytes::from_static(b"DISPATCHER,ERROR,-7"))
        );
        assert_eq!(
            frames.next().await.unwrap().unwrap(),
            Assembled::Rejected(ErrorCode::RxChecksum)
        );
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_framed_write() {
        let mock = tokio_test::io::Builder::new()
            .write(b"$SET_SPIN_STATE,1,ON*21\r\n")
            .build();

        let mut sink = FramedWrite::new(mock, LineCodec::new());
        sink.send("SET_SPIN_STATE,1,ON").await.unwrap();
    }
}
