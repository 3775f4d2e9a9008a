//! Client commands carried in multipart frames.
//!
//! A publish is `[topic, payload]`. A control frame starts with the
//! deployment's reserved marker segment: `[marker, verb, prefix]`, where the
//! verb is `SUB` or `UNSUB`.

use bytes::{Bytes, BytesMut};

use crate::core::error::ProtocolError;
use crate::core::frame::{encode_frame, FrameEncodeError};
use crate::core::message::Message;

pub const VERB_SUBSCRIBE: &[u8] = b"SUB";
pub const VERB_UNSUBSCRIBE: &[u8] = b"UNSUB";

/// Default control marker. Starts with a NUL byte so it never collides with
/// a printable application topic.
pub const DEFAULT_CONTROL_MARKER: &str = "\u{0}ezmb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Publish(Message),
    Subscribe(Bytes),
    Unsubscribe(Bytes),
}

pub fn new_pub(topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Command {
    Command::Publish(Message::new(topic, payload))
}

pub fn new_sub(prefix: impl Into<Bytes>) -> Command {
    Command::Subscribe(prefix.into())
}

pub fn new_unsub(prefix: impl Into<Bytes>) -> Command {
    Command::Unsubscribe(prefix.into())
}

/// Size limits applied while decoding client commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_topic: usize,
    pub max_payload: usize,
}

impl DecodeLimits {
    fn check_topic(&self, topic: &[u8]) -> Result<(), ProtocolError> {
        if topic.len() > self.max_topic {
            return Err(ProtocolError::TopicTooLarge {
                size: topic.len(),
                limit: self.max_topic,
            });
        }
        Ok(())
    }
}

/// Interprets the segments of one decoded frame.
pub fn decode_command(
    mut segments: Vec<Bytes>,
    marker: &[u8],
    limits: &DecodeLimits,
) -> Result<Command, ProtocolError> {
    let Some(first) = segments.first() else {
        return Err(ProtocolError::MissingTopic);
    };

    if &first[..] == marker {
        if segments.len() != 3 {
            return Err(ProtocolError::ControlShape(segments.len()));
        }
        let prefix = segments.pop().unwrap_or_default();
        limits.check_topic(&prefix)?;
        let verb = &segments[1];
        return match &verb[..] {
            VERB_SUBSCRIBE => Ok(Command::Subscribe(prefix)),
            VERB_UNSUBSCRIBE => Ok(Command::Unsubscribe(prefix)),
            other => Err(ProtocolError::UnknownVerb(
                String::from_utf8_lossy(other).into_owned(),
            )),
        };
    }

    if segments.len() != 2 {
        return Err(ProtocolError::PublishShape(segments.len()));
    }

    let payload = segments.pop().unwrap_or_default();
    if payload.len() > limits.max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            limit: limits.max_payload,
        });
    }
    let topic = segments.pop().unwrap_or_default();
    limits.check_topic(&topic)?;

    Ok(Command::Publish(Message { topic, payload }))
}

/// Serialises a command as one frame appended to `buf`.
pub fn encode_command(
    cmd: &Command,
    marker: &[u8],
    buf: &mut BytesMut,
) -> Result<(), FrameEncodeError> {
    match cmd {
        Command::Publish(msg) => encode_frame(&[&msg.topic[..], &msg.payload[..]], buf),
        Command::Subscribe(prefix) => encode_frame(&[marker, VERB_SUBSCRIBE, &prefix[..]], buf),
        Command::Unsubscribe(prefix) => {
            encode_frame(&[marker, VERB_UNSUBSCRIBE, &prefix[..]], buf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::try_decode_frame;

    const MARKER: &[u8] = DEFAULT_CONTROL_MARKER.as_bytes();
    const LIMITS: DecodeLimits = DecodeLimits {
        max_topic: 32,
        max_payload: 64,
    };

    fn segs(parts: &[&'static [u8]]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::from_static(*p)).collect()
    }

    #[test]
    fn two_segments_are_a_publish() {
        let cmd = decode_command(
            segs(&[b"port0_south_topic", b"Message 0 from port0"]),
            MARKER,
            &LIMITS,
        )
        .unwrap();
        assert_eq!(cmd, new_pub("port0_south_topic", "Message 0 from port0"));
    }

    #[test]
    fn marker_frames_are_control() {
        let sub = decode_command(segs(&[MARKER, b"SUB", b"port0_"]), MARKER, &LIMITS).unwrap();
        let unsub = decode_command(segs(&[MARKER, b"UNSUB", b""]), MARKER, &LIMITS).unwrap();
        assert_eq!(sub, new_sub("port0_"));
        assert_eq!(unsub, new_unsub(""));
    }

    #[test]
    fn empty_frame_is_missing_topic() {
        assert!(matches!(
            decode_command(Vec::new(), MARKER, &LIMITS),
            Err(ProtocolError::MissingTopic)
        ));
    }

    #[test]
    fn publish_without_payload_is_rejected() {
        assert!(matches!(
            decode_command(segs(&[b"topic"]), MARKER, &LIMITS),
            Err(ProtocolError::PublishShape(1))
        ));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let tight = DecodeLimits {
            max_topic: 32,
            max_payload: 4,
        };
        let err = decode_command(segs(&[b"t", b"0123456789"]), MARKER, &tight).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::PayloadTooLarge { size: 10, limit: 4 }
        ));
    }

    #[test]
    fn oversized_topic_or_prefix_is_rejected() {
        let long: &'static [u8] = &[b'x'; 33];
        assert!(matches!(
            decode_command(segs(&[long, b"p"]), MARKER, &LIMITS),
            Err(ProtocolError::TopicTooLarge { size: 33, limit: 32 })
        ));
        assert!(matches!(
            decode_command(segs(&[MARKER, b"SUB", long]), MARKER, &LIMITS),
            Err(ProtocolError::TopicTooLarge { size: 33, limit: 32 })
        ));
    }

    #[test]
    fn unknown_verb_and_bad_control_shape_are_rejected() {
        assert!(matches!(
            decode_command(segs(&[MARKER, b"PING", b"x"]), MARKER, &LIMITS),
            Err(ProtocolError::UnknownVerb(v)) if v == "PING"
        ));
        assert!(matches!(
            decode_command(segs(&[MARKER, b"SUB"]), MARKER, &LIMITS),
            Err(ProtocolError::ControlShape(2))
        ));
    }

    #[test]
    fn encoded_subscribe_decodes_back_through_the_frame_layer() {
        let mut buf = BytesMut::new();
        encode_command(&new_sub("abc"), MARKER, &mut buf).unwrap();
        let segments = try_decode_frame(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(decode_command(segments, MARKER, &LIMITS).unwrap(), new_sub("abc"));
    }
}
