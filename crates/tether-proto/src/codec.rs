//! Frame encoding: textual JSON by default, MessagePack once negotiated.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::message::Frame;

/// Wire encodings supported by the peer.
///
/// Connections start with [`Encoding::Json`]; after the daemon
/// acknowledges a `config` request announcing an alternate encoding,
/// both directions switch atomically for all subsequent frames.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Encoding {
    /// Textual JSON, the handshake default.
    #[default]
    Json,
    /// MessagePack, negotiated via `config {encoding: "msgpack"}`.
    MsgPack,
}

impl Encoding {
    /// Encodes one outbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the frame cannot be represented in the
    /// selected encoding.
    pub fn encode(self, frame: &Frame) -> Result<Vec<u8>, CodecError> {
        match (self, frame) {
            (Self::Json, Frame::Single(message)) => Ok(serde_json::to_vec(message)?),
            (Self::Json, Frame::Batch(messages)) => Ok(serde_json::to_vec(messages)?),
            (Self::MsgPack, Frame::Single(message)) => Ok(rmp_serde::to_vec_named(message)?),
            (Self::MsgPack, Frame::Batch(messages)) => Ok(rmp_serde::to_vec_named(messages)?),
        }
    }

    /// Decodes one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the bytes are not valid for the
    /// selected encoding.
    pub fn decode(self, raw: &[u8]) -> Result<Frame, CodecError> {
        let value: Value = match self {
            Self::Json => serde_json::from_slice(raw)?,
            Self::MsgPack => rmp_serde::from_slice(raw)?,
        };
        Ok(Frame::from_value(value))
    }
}

/// Frame encode/decode failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization or deserialization failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack serialization failed.
    #[error("MessagePack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization failed.
    #[error("MessagePack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}
