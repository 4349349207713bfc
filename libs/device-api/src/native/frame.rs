//! Frame codecs
//!
//! A plaintext frame is `0x00`, varint payload length, varint message type,
//! then the protobuf payload. Encrypted frames are handled by
//! [`crate::native::noise`]; [`NativeCodec`] lets the client use either
//! through the same `FramedRead` / `FramedWrite` pair.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use snow::StatelessTransportState;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ApiError;
use crate::native::noise::NoiseCodec;

pub(crate) const PLAINTEXT_PREAMBLE: u8 = 0x00;
pub(crate) const NOISE_PREAMBLE: u8 = 0x01;
const MAX_VARINT_LEN: usize = 10;

/// Upper bound on a single payload
pub const MAX_PAYLOAD_LEN: u64 = 1024 * 1024;

/// One API message: type id and protobuf payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u32,
    pub payload: Bytes,
}

impl Frame {
    /// Encode `message` as a frame of type `msg_type`
    pub fn new<M: Message>(msg_type: u32, message: &M) -> Self {
        Self {
            msg_type,
            payload: Bytes::from(message.encode_to_vec()),
        }
    }

    /// Decode the payload as message `M`
    pub fn decode<M: Message + Default>(&self) -> Result<M, ApiError> {
        Ok(M::decode(self.payload.clone())?)
    }
}

/// Codec for the plaintext transport
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCodec;

impl Decoder for PlaintextCodec {
    type Item = Frame;
    type Error = ApiError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ApiError> {
        let Some(&preamble) = src.first() else {
            return Ok(None);
        };
        match preamble {
            PLAINTEXT_PREAMBLE => {}
            NOISE_PREAMBLE => {
                return Err(ApiError::Connection(
                    "Device requires an encrypted connection".to_string(),
                ))
            }
            other => {
                return Err(ApiError::Other(format!("Invalid frame preamble: {other:#04x}")));
            }
        }

        let mut offset = 1;
        let Some((payload_len, len_size)) = read_varint(&src[offset..])? else {
            return Ok(None);
        };
        offset += len_size;
        let Some((msg_type, type_size)) = read_varint(&src[offset..])? else {
            return Ok(None);
        };
        offset += type_size;

        if payload_len > MAX_PAYLOAD_LEN {
            return Err(ApiError::Other(format!("Frame too large: {payload_len} bytes")));
        }
        let msg_type = u32::try_from(msg_type)
            .map_err(|_| ApiError::Other(format!("Invalid message type: {msg_type}")))?;

        let payload_len = payload_len as usize;
        if src.len() < offset + payload_len {
            src.reserve(offset + payload_len - src.len());
            return Ok(None);
        }

        src.advance(offset);
        let payload = src.split_to(payload_len).freeze();
        Ok(Some(Frame { msg_type, payload }))
    }
}

impl Encoder<Frame> for PlaintextCodec {
    type Error = ApiError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ApiError> {
        dst.reserve(1 + 2 * MAX_VARINT_LEN + frame.payload.len());
        dst.put_u8(PLAINTEXT_PREAMBLE);
        prost::encoding::encode_varint(frame.payload.len() as u64, dst);
        prost::encoding::encode_varint(u64::from(frame.msg_type), dst);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

/// Codec of an established connection, plaintext or encrypted
#[derive(Debug)]
pub enum NativeCodec {
    Plaintext(PlaintextCodec),
    Noise(NoiseCodec),
}

impl NativeCodec {
    pub fn plaintext() -> Self {
        NativeCodec::Plaintext(PlaintextCodec)
    }

    /// Codec over a completed noise handshake
    pub fn noise(cipher: Arc<StatelessTransportState>) -> Self {
        NativeCodec::Noise(NoiseCodec::new(cipher))
    }
}

impl Decoder for NativeCodec {
    type Item = Frame;
    type Error = ApiError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ApiError> {
        match self {
            NativeCodec::Plaintext(codec) => codec.decode(src),
            NativeCodec::Noise(codec) => codec.decode(src),
        }
    }
}

impl Encoder<Frame> for NativeCodec {
    type Error = ApiError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ApiError> {
        match self {
            NativeCodec::Plaintext(codec) => codec.encode(frame, dst),
            NativeCodec::Noise(codec) => codec.encode(frame, dst),
        }
    }
}

/// Read a varint from the start of `bytes`; `None` if more bytes are needed
fn read_varint(bytes: &[u8]) -> Result<Option<(u64, usize)>, ApiError> {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return Err(ApiError::Other("Varint too long".to_string()));
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    if bytes.len() >= MAX_VARINT_LEN {
        return Err(ApiError::Other("Varint too long".to_string()));
    }
    Ok(None)
}
