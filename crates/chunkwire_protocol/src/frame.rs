use std::io::Cursor;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("frame decoding failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("frame left {0} trailing byte(s) unconsumed")]
    TrailingBytes(u64),
}

/// A frame is a self-describing top-level record of exactly two fields, in order:
/// a packet id (bounded to 16 bits) and an opaque body blob. Both the frame itself and
/// the body are independently self-describing MessagePack records, so the body can be
/// decoded into its packet-specific type without any external length table.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct Frame {
    pub packet_id: u16,
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

/// Encodes `packet` as the body of a frame tagged with `packet_id`.
pub fn encode_frame<T: Serialize>(packet_id: u16, packet: &T) -> Result<Vec<u8>, FrameError> {
    let body = rmp_serde::to_vec(packet)?;
    let frame = Frame { packet_id, body };
    Ok(rmp_serde::to_vec(&frame)?)
}

/// Decodes the outer frame, rejecting any trailing bytes left in `bytes` after the frame
/// has been fully read (the EOF check required of the codec).
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, FrameError> {
    let mut cursor = Cursor::new(bytes);
    let mut deserializer = rmp_serde::Deserializer::new(&mut cursor);
    let frame: Frame = serde::Deserialize::deserialize(&mut deserializer)?;

    let consumed = cursor.position();
    if consumed != bytes.len() as u64 {
        return Err(FrameError::TrailingBytes(bytes.len() as u64 - consumed));
    }

    Ok(frame)
}

/// Decodes a frame body into a packet-specific type, applying the same EOF check as
/// `decode_frame` (a body with trailing bytes is a malformed frame, not a forward-compatible
/// extension — extension fields belong inside the packet's own schema).
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, FrameError> {
    let mut cursor = Cursor::new(body);
    let mut deserializer = rmp_serde::Deserializer::new(&mut cursor);
    let value = T::deserialize(&mut deserializer)?;

    let consumed = cursor.position();
    if consumed != body.len() as u64 {
        return Err(FrameError::TrailingBytes(body.len() as u64 - consumed));
    }

    Ok(value)
}
