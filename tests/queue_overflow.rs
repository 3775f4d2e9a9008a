#[path = "common.rs"]
mod common;

use std::time::Duration;

use common::{recv, wait_until, TestBus};
use ezmb::core::connection::CloseReason;
use ezmb::core::queue::OverflowPolicy;
use ezmb::{Config, Side};
use tokio::time;

const PUBLISHED: usize = 500;

fn config(capacity: usize, policy: OverflowPolicy) -> Config {
    let mut config = Config::default();
    config.queues.capacity = capacity;
    config.queues.overflow_policy = policy;
    config
}

#[tokio::test]
async fn drop_newest_bounds_a_stalled_subscriber_and_keeps_it_connected() {
    let bus = TestBus::new(config(4, OverflowPolicy::DropNewest));
    // A tiny pipe the subscriber does not read from stalls the writer.
    let mut slow = bus.attach_with_pipe(Side::North, 64);
    let mut south = bus.attach(Side::South);

    slow.client.subscribe("").await.unwrap();
    bus.wait_for_subscriptions(1, 0).await;

    for i in 0..PUBLISHED {
        south.client.publish("load", format!("{i:04}")).await.unwrap();
    }
    wait_until(|| bus.bridge.metrics().snapshot().published == PUBLISHED as u64).await;

    let m = bus.bridge.metrics().snapshot();
    assert!(m.dropped_queue_full > 0, "expected drops, got {m:?}");
    assert_eq!(m.delivered + m.dropped_queue_full, PUBLISHED as u64);
    assert_eq!(m.slow_disconnects, 0);
    assert_eq!(bus.bridge.connection_count(), 2);

    // What does arrive is an in-order subsequence of what was published.
    let mut received = Vec::new();
    while received.len() < m.delivered as usize {
        received.push(recv(&mut slow.client).await.payload);
    }
    let mut sorted = received.clone();
    sorted.sort();
    assert_eq!(received, sorted);
    assert_eq!(received[0], "0000");
}

#[tokio::test]
async fn stalled_writer_holds_no_more_than_the_queue_capacity() {
    let bus = TestBus::new(config(4, OverflowPolicy::DropNewest));
    // A one-byte pipe blocks the writer inside its first write for good.
    let mut stalled = bus.attach_with_pipe(Side::North, 1);
    let mut south = bus.attach(Side::South);

    stalled.client.subscribe("").await.unwrap();
    bus.wait_for_subscriptions(1, 0).await;

    for i in 0..100 {
        south.client.publish("load", format!("{i:04}")).await.unwrap();
    }
    wait_until(|| bus.bridge.metrics().snapshot().published == 100).await;

    let m = bus.bridge.metrics().snapshot();
    assert_eq!(m.delivered, 4, "{m:?}");
    assert_eq!(m.dropped_queue_full, 96);
    assert_eq!(bus.bridge.connection_count(), 2);
}

#[tokio::test]
async fn drop_newest_never_affects_fast_subscribers() {
    let bus = TestBus::new(config(4, OverflowPolicy::DropNewest));
    let _slow = {
        let mut slow = bus.attach_with_pipe(Side::North, 64);
        slow.client.subscribe("").await.unwrap();
        slow
    };
    let mut fast = bus.attach(Side::North);
    let mut south = bus.attach(Side::South);
    fast.client.subscribe("").await.unwrap();
    bus.wait_for_subscriptions(2, 0).await;

    for i in 0..50 {
        south.client.publish("t", format!("{i}")).await.unwrap();
        // Stay under the fast subscriber's queue depth.
        assert_eq!(recv(&mut fast.client).await.payload, format!("{i}"));
    }
}

#[tokio::test]
async fn disconnect_policy_closes_the_slow_subscriber() {
    let bus = TestBus::new(config(2, OverflowPolicy::Disconnect));
    let slow = bus.attach_with_pipe(Side::North, 64);
    let mut south = bus.attach(Side::South);

    let mut slow_client = slow.client;
    slow_client.subscribe("").await.unwrap();
    bus.wait_for_subscriptions(1, 0).await;

    for i in 0..PUBLISHED {
        south.client.publish("load", format!("{i:04}")).await.unwrap();
    }

    let reason = time::timeout(Duration::from_secs(5), slow.session)
        .await
        .expect("slow session did not close")
        .unwrap();
    assert_eq!(reason, CloseReason::SlowSubscriber);

    bus.wait_for_connections(1).await;
    assert_eq!(bus.bridge.router().stats().north.subscriptions, 0);
    assert_eq!(bus.bridge.metrics().snapshot().slow_disconnects, 1);

    // Whatever was already in the pipe drains, then the stream ends.
    loop {
        match time::timeout(Duration::from_secs(5), slow_client.next_message())
            .await
            .expect("stream did not end")
        {
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }

    // The publisher is untouched.
    south.client.publish("load", "after").await.unwrap();
    wait_until(|| bus.bridge.metrics().snapshot().unrouted >= 1).await;
}
