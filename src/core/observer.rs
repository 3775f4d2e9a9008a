//! Hook for watching every message the bus routes.

use crate::core::message::Message;
use crate::core::side::Side;

/// Sees each accepted publish before it is fanned out.
///
/// Called on the publisher's reader task, so implementations must be cheap
/// and must not block.
pub trait MessageObserver: Send + Sync + 'static {
    fn on_message(&self, origin: Side, message: &Message);
}

/// Logs topic and payload size of every routed message at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl MessageObserver for TracingObserver {
    fn on_message(&self, origin: Side, message: &Message) {
        tracing::debug!(
            target: "ezmb::tap",
            %origin,
            topic = %message.topic_lossy(),
            payload_len = message.payload.len(),
            "routing message"
        );
    }
}
