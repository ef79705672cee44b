use thiserror::Error;
use crate::protocol::MessageType;

/// Failures decoding or encoding a protocol frame. A frame that fails to
/// decode is dropped; the connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame has no message type")]
    MissingType,

    #[error("unknown message type {0}")]
    UnknownType(i64),

    #[error("{kind:?} frame is missing field `{field}`")]
    MissingField {
        kind: MessageType,
        field: &'static str,
    },
}
