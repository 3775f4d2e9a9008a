//! Bus counters.
//!
//! One [`Metrics`] lives in each bridge; counters are relaxed atomics bumped
//! on the hot path and read only for snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped_queue_full: AtomicU64,
    dropped_direction: AtomicU64,
    unrouted: AtomicU64,
    slow_disconnects: AtomicU64,
    protocol_errors: AtomicU64,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    flush_bytes: AtomicU64,
    flush_batches: AtomicU64,
}

/// Plain copy of every counter at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub dropped_queue_full: u64,
    pub dropped_direction: u64,
    pub unrouted: u64,
    pub slow_disconnects: u64,
    pub protocol_errors: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub flush_bytes: u64,
    pub flush_batches: u64,
}

macro_rules! counter {
    ($($inc:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $inc(&self, n: u64) {
                self.$field.fetch_add(n, Ordering::Relaxed);
            }
        )*
    };
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter! {
        inc_published => published,
        inc_delivered => delivered,
        inc_dropped_queue_full => dropped_queue_full,
        inc_dropped_direction => dropped_direction,
        inc_unrouted => unrouted,
        inc_slow_disconnects => slow_disconnects,
        inc_protocol_errors => protocol_errors,
        inc_connections_opened => connections_opened,
        inc_connections_closed => connections_closed,
        inc_flush_bytes => flush_bytes,
        inc_flush_batches => flush_batches,
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            published: load(&self.published),
            delivered: load(&self.delivered),
            dropped_queue_full: load(&self.dropped_queue_full),
            dropped_direction: load(&self.dropped_direction),
            unrouted: load(&self.unrouted),
            slow_disconnects: load(&self.slow_disconnects),
            protocol_errors: load(&self.protocol_errors),
            connections_opened: load(&self.connections_opened),
            connections_closed: load(&self.connections_closed),
            flush_bytes: load(&self.flush_bytes),
            flush_batches: load(&self.flush_batches),
        }
    }

    /// Prometheus-style text, one `name value` line per counter.
    pub fn render(&self) -> String {
        let s = self.snapshot();
        format!(
            "ezmb_published {}\nezmb_delivered {}\nezmb_dropped_queue_full {}\nezmb_dropped_direction {}\nezmb_unrouted {}\nezmb_slow_disconnects {}\nezmb_protocol_errors {}\nezmb_connections_opened {}\nezmb_connections_closed {}\nezmb_flush_bytes {}\nezmb_flush_batches {}\n",
            s.published,
            s.delivered,
            s.dropped_queue_full,
            s.dropped_direction,
            s.unrouted,
            s.slow_disconnects,
            s.protocol_errors,
            s.connections_opened,
            s.connections_closed,
            s.flush_bytes,
            s.flush_batches,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let m = Metrics::new();
        m.inc_published(3);
        m.inc_delivered(5);
        m.inc_dropped_queue_full(2);
        m.inc_published(1);

        let s = m.snapshot();
        assert_eq!(s.published, 4);
        assert_eq!(s.delivered, 5);
        assert_eq!(s.dropped_queue_full, 2);
        assert_eq!(s.unrouted, 0);
    }

    #[test]
    fn render_lists_every_counter() {
        let m = Metrics::new();
        m.inc_slow_disconnects(1);
        let text = m.render();
        assert!(text.contains("ezmb_slow_disconnects 1\n"));
        assert_eq!(text.lines().count(), 11);
        assert!(text.lines().all(|l| l.starts_with("ezmb_")));
    }
}
