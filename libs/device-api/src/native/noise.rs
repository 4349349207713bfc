//! Encrypted transport
//!
//! `Noise_NNpsk0_25519_ChaChaPoly_SHA256` keyed with the device's base64
//! encryption key. On the wire every frame is `0x01`, a big-endian `u16`
//! length, then the data. Once the handshake completes, each frame carries an
//! encrypted `type (u16) | length (u16) | payload`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use snow::params::NoiseParams;
use snow::{HandshakeState, StatelessTransportState};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tracing::debug;

use crate::error::ApiError;
use crate::native::frame::{Frame, NativeCodec, NOISE_PREAMBLE, PLAINTEXT_PREAMBLE};

pub const NOISE_PROTOCOL: &str = "Noise_NNpsk0_25519_ChaChaPoly_SHA256";

const PROLOGUE: &[u8] = b"NoiseAPIInit\x00\x00";
const PSK_LEN: usize = 32;
const FRAME_HEADER_LEN: usize = 3;
const MAX_FRAME_LEN: usize = u16::MAX as usize;
const TAG_LEN: usize = 16;
const MESSAGE_HEADER_LEN: usize = 4;

/// Protocol id the device must select in its hello
const NOISE_PROTOCOL_ID: u8 = 0x01;
const HANDSHAKE_OK: u8 = 0x00;
const MAC_FAILURE: &str = "Handshake MAC failure";

/// Decode a base64 encryption key
pub fn decode_psk(key: &str) -> Result<[u8; PSK_LEN], ApiError> {
    let bytes = STANDARD
        .decode(key.trim())
        .map_err(|e| ApiError::Connection(format!("Encryption key is not valid base64: {e}")))?;
    <[u8; PSK_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        ApiError::Connection(format!(
            "Encryption key must be {PSK_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}

fn builder_params() -> Result<NoiseParams, ApiError> {
    Ok(NOISE_PROTOCOL.parse()?)
}

fn initiator(psk: &[u8; PSK_LEN]) -> Result<HandshakeState, ApiError> {
    Ok(snow::Builder::new(builder_params()?)
        .psk(0, psk)
        .prologue(PROLOGUE)
        .build_initiator()?)
}

/// Raw noise frames, used while the handshake runs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseFrameCodec;

impl Decoder for NoiseFrameCodec {
    type Item = BytesMut;
    type Error = ApiError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, ApiError> {
        match src.first() {
            None => return Ok(None),
            Some(&NOISE_PREAMBLE) => {}
            Some(&PLAINTEXT_PREAMBLE) => {
                return Err(ApiError::Connection(
                    "Device does not use encryption, remove the encryption key".to_string(),
                ))
            }
            Some(other) => {
                return Err(ApiError::Other(format!("Invalid frame preamble: {other:#04x}")));
            }
        }
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let len = usize::from(u16::from_be_bytes([src[1], src[2]]));
        if src.len() < FRAME_HEADER_LEN + len {
            src.reserve(FRAME_HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_LEN);
        Ok(Some(src.split_to(len)))
    }
}

impl Encoder<Bytes> for NoiseFrameCodec {
    type Error = ApiError;

    fn encode(&mut self, data: Bytes, dst: &mut BytesMut) -> Result<(), ApiError> {
        let len = u16::try_from(data.len())
            .map_err(|_| ApiError::Other(format!("Noise frame too large: {} bytes", data.len())))?;
        dst.reserve(FRAME_HEADER_LEN + data.len());
        dst.put_u8(NOISE_PREAMBLE);
        dst.put_u16(len);
        dst.extend_from_slice(&data);
        Ok(())
    }
}

/// Encrypted API frames over an established noise session.
///
/// Reader and writer each own a codec sharing the session; every codec
/// counts its own direction's nonces.
pub struct NoiseCodec {
    frames: NoiseFrameCodec,
    cipher: Arc<StatelessTransportState>,
    nonce: u64,
}

impl NoiseCodec {
    pub fn new(cipher: Arc<StatelessTransportState>) -> Self {
        Self {
            frames: NoiseFrameCodec,
            cipher,
            nonce: 0,
        }
    }
}

impl fmt::Debug for NoiseCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseCodec")
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

impl Decoder for NoiseCodec {
    type Item = Frame;
    type Error = ApiError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ApiError> {
        let Some(data) = self.frames.decode(src)? else {
            return Ok(None);
        };

        let mut plain = vec![0u8; data.len()];
        let n = self.cipher.read_message(self.nonce, &data, &mut plain)?;
        self.nonce += 1;

        if n < MESSAGE_HEADER_LEN {
            return Err(ApiError::Other(format!("Encrypted frame too short: {n} bytes")));
        }
        let msg_type = u16::from_be_bytes([plain[0], plain[1]]);
        let len = usize::from(u16::from_be_bytes([plain[2], plain[3]]));
        if MESSAGE_HEADER_LEN + len > n {
            return Err(ApiError::Other(format!(
                "Encrypted frame declares {len} bytes, carries {}",
                n - MESSAGE_HEADER_LEN
            )));
        }

        Ok(Some(Frame {
            msg_type: u32::from(msg_type),
            payload: Bytes::copy_from_slice(&plain[MESSAGE_HEADER_LEN..MESSAGE_HEADER_LEN + len]),
        }))
    }
}

impl Encoder<Frame> for NoiseCodec {
    type Error = ApiError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ApiError> {
        let msg_type = u16::try_from(frame.msg_type)
            .map_err(|_| ApiError::Other(format!("Message type {} out of range", frame.msg_type)))?;
        let len = u16::try_from(frame.payload.len())
            .map_err(|_| ApiError::Other(format!("Message too large: {} bytes", frame.payload.len())))?;

        let mut plain = Vec::with_capacity(MESSAGE_HEADER_LEN + frame.payload.len());
        plain.extend_from_slice(&msg_type.to_be_bytes());
        plain.extend_from_slice(&len.to_be_bytes());
        plain.extend_from_slice(&frame.payload);

        let mut sealed = vec![0u8; plain.len() + TAG_LEN];
        let n = self.cipher.write_message(self.nonce, &plain, &mut sealed)?;
        self.nonce += 1;
        sealed.truncate(n);

        self.frames.encode(Bytes::from(sealed), dst)
    }
}

/// Run the client side of the handshake and switch both halves to
/// [`NativeCodec`] once the session keys are established.
pub async fn handshake<R, W>(
    read_half: R,
    write_half: W,
    psk: &[u8; PSK_LEN],
    timeout: Duration,
) -> Result<(FramedRead<R, NativeCodec>, FramedWrite<W, NativeCodec>), ApiError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut noise = initiator(psk)?;
    let mut reader = FramedRead::new(read_half, NoiseFrameCodec);
    let mut writer = FramedWrite::new(write_half, NoiseFrameCodec);

    let mut buf = vec![0u8; MAX_FRAME_LEN];
    let len = noise.write_message(&[], &mut buf)?;
    let mut request = BytesMut::with_capacity(1 + len);
    request.put_u8(HANDSHAKE_OK);
    request.extend_from_slice(&buf[..len]);

    // empty hello frame, then the first handshake message
    writer.feed(Bytes::new()).await?;
    writer.send(request.freeze()).await?;

    let server_hello = next_handshake_frame(&mut reader, timeout).await?;
    match server_hello.split_first() {
        Some((&NOISE_PROTOCOL_ID, rest)) => {
            let name = rest.split(|b| *b == 0).next().unwrap_or_default();
            debug!("Noise hello from {}", String::from_utf8_lossy(name));
        }
        other => {
            return Err(ApiError::Incompatible(format!(
                "Device selected unknown noise protocol {:?}",
                other.map(|(id, _)| *id)
            )));
        }
    }

    let response = next_handshake_frame(&mut reader, timeout).await?;
    match response.split_first() {
        Some((&HANDSHAKE_OK, message)) => {
            noise.read_message(message, &mut buf)?;
        }
        Some((_, reason)) => {
            let reason = String::from_utf8_lossy(reason);
            return Err(if reason == MAC_FAILURE {
                ApiError::Connection("Invalid encryption key".to_string())
            } else {
                ApiError::Connection(format!("Noise handshake failed: {reason}"))
            });
        }
        None => {
            return Err(ApiError::Connection("Empty noise handshake response".to_string()));
        }
    }

    let cipher = Arc::new(noise.into_stateless_transport_mode()?);
    let read_cipher = cipher.clone();
    let reader = reader.map_decoder(move |_| NativeCodec::noise(read_cipher));
    let writer = writer.map_encoder(move |_| NativeCodec::noise(cipher));
    Ok((reader, writer))
}

async fn next_handshake_frame<R>(
    reader: &mut FramedRead<R, NoiseFrameCodec>,
    timeout: Duration,
) -> Result<BytesMut, ApiError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(timeout, reader.next()).await {
        Ok(Some(frame)) => frame,
        Ok(None) => Err(ApiError::Connection(
            "Connection closed during noise handshake".to_string(),
        )),
        Err(_) => Err(ApiError::Connection("Timeout during noise handshake".to_string())),
    }
}
