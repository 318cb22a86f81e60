//! Frame codec for master/chunk server TCP streams.
//!
//! Wire format: 4-byte big-endian command id + 4-byte big-endian payload
//! length + payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{ProtocolError, HEADER_SIZE, MAX_PAYLOAD_BYTES};

/// One complete wire message. Never handed out partially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(command: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Frame with an empty payload.
    pub fn empty(command: u32) -> Self {
        Self {
            command,
            payload: Bytes::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Codec for framing `Frame` values over a byte stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need at least the header
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Peek at command and length
        let command = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        let length = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;

        if length > MAX_PAYLOAD_BYTES {
            return Err(ProtocolError::MessageTooLarge {
                size: length,
                max: MAX_PAYLOAD_BYTES,
            });
        }

        let total = HEADER_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(length).freeze();
        Ok(Some(Frame { command, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload.len() > MAX_PAYLOAD_BYTES {
            return Err(ProtocolError::MessageTooLarge {
                size: item.payload.len(),
                max: MAX_PAYLOAD_BYTES,
            });
        }

        dst.reserve(HEADER_SIZE + item.payload.len());
        dst.put_u32(item.command);
        dst.put_u32(item.payload.len() as u32);
        dst.extend_from_slice(&item.payload);

        Ok(())
    }
}
