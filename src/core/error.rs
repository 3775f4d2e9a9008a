use thiserror::Error;

use crate::config::ConfigError;
use crate::core::frame::FrameDecodeError;

/// Top-level error for the bus library.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid endpoint '{endpoint}': {reason}")]
    Endpoint { endpoint: String, reason: String },
}

impl BusError {
    pub fn endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        BusError::Endpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}

/// A frame that cannot be accepted from a client. Always fatal for the
/// connection that sent it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Frame(#[from] FrameDecodeError),

    #[error("frame carries no topic segment")]
    MissingTopic,

    #[error("publish frame must have 2 segments, got {0}")]
    PublishShape(usize),

    #[error("control frame must have 3 segments, got {0}")]
    ControlShape(usize),

    #[error("unknown control verb {0:?}")]
    UnknownVerb(String),

    #[error("payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("topic or prefix of {size} bytes exceeds limit of {limit}")]
    TopicTooLarge { size: usize, limit: usize },
}
