//! Per-connection outbound queues.
//!
//! Every connection gets one bounded FIFO between the fan-out path and its
//! writer task. Enqueueing never waits: when the queue is at capacity the
//! configured [`OverflowPolicy`] decides what happens to the new message.

pub mod outbound;

pub use outbound::{outbound_queue, EnqueueOutcome, OutboundQueue, OutboundReceiver};

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// What to do with a message that finds its target queue full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the incoming message and count it. The subscriber stays connected.
    #[default]
    DropNewest,
    /// Drop the incoming message and disconnect the subscriber.
    Disconnect,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop_newest" | "drop-newest" | "drop_new" => Ok(OverflowPolicy::DropNewest),
            "disconnect" => Ok(OverflowPolicy::Disconnect),
            other => Err(format!("unknown overflow policy '{other}'")),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::DropNewest => f.write_str("drop_newest"),
            OverflowPolicy::Disconnect => f.write_str("disconnect"),
        }
    }
}
