use bytes::{Bytes, BytesMut};
use std::sync::Arc;

use crate::core::frame::{encode_frame, FrameEncodeError};

/// A published message. Immutable once created and shared between all
/// fan-out targets through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Bytes,
    pub payload: Bytes,
}

impl Message {
    pub fn new(topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn shared(topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Arc<Self> {
        Arc::new(Self::new(topic, payload))
    }

    /// Lossy UTF-8 view of the topic, for logs only.
    pub fn topic_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.topic)
    }
}

/// Encodes a delivery frame (`[topic, payload]`) into `buf`.
#[inline]
pub fn encode_message_into(msg: &Message, buf: &mut BytesMut) -> Result<(), FrameEncodeError> {
    encode_frame(&[&msg.topic, &msg.payload], buf)
}
