#[path = "common.rs"]
mod common;

use common::{assert_silent, recv, TestBus};
use ezmb::{Config, Side};

#[tokio::test]
async fn south_publish_reaches_matching_north_subscriber() {
    let bus = TestBus::new(Config::default());
    let mut other = bus.attach(Side::North);
    let mut north = bus.attach(Side::North);
    let mut south = bus.attach(Side::South);

    other.client.subscribe("port0_north_topic").await.unwrap();
    north.client.subscribe("port0_south_topic").await.unwrap();
    bus.wait_for_subscriptions(2, 0).await;

    south
        .client
        .publish("port0_south_topic", "Message 0 from port0")
        .await
        .unwrap();

    let got = recv(&mut north.client).await;
    assert_eq!(got.topic, "port0_south_topic");
    assert_eq!(got.payload, "Message 0 from port0");
    assert_silent(&mut other.client).await;
    assert_silent(&mut south.client).await;
}

#[tokio::test]
async fn message_is_fanned_out_to_every_matching_prefix() {
    let bus = TestBus::new(Config::default());
    let mut everything = bus.attach(Side::North);
    let mut port0 = bus.attach(Side::North);
    let mut port1 = bus.attach(Side::North);
    let mut south = bus.attach(Side::South);

    everything.client.subscribe("").await.unwrap();
    port0.client.subscribe("port0").await.unwrap();
    port1.client.subscribe("port1").await.unwrap();
    bus.wait_for_subscriptions(3, 0).await;

    south.client.publish("port0_south_topic", "hello").await.unwrap();

    assert_eq!(recv(&mut everything.client).await.payload, "hello");
    assert_eq!(recv(&mut port0.client).await.payload, "hello");
    assert_silent(&mut port1.client).await;
}

#[tokio::test]
async fn publishers_never_hear_their_own_side() {
    let bus = TestBus::new(Config::default());
    let mut north_a = bus.attach(Side::North);
    let mut north_b = bus.attach(Side::North);
    let mut south = bus.attach(Side::South);

    north_b.client.subscribe("").await.unwrap();
    south.client.subscribe("").await.unwrap();
    bus.wait_for_subscriptions(1, 1).await;

    north_a.client.publish("status", "up").await.unwrap();

    assert_eq!(recv(&mut south.client).await.payload, "up");
    assert_silent(&mut north_b.client).await;
}

#[tokio::test]
async fn overlapping_prefixes_deliver_once() {
    let bus = TestBus::new(Config::default());
    let mut north = bus.attach(Side::North);
    let mut south = bus.attach(Side::South);

    for prefix in ["", "p", "port", "port0"] {
        north.client.subscribe(prefix).await.unwrap();
    }
    bus.wait_for_subscriptions(4, 0).await;

    south.client.publish("port0_x", "once").await.unwrap();

    assert_eq!(recv(&mut north.client).await.payload, "once");
    assert_silent(&mut north.client).await;
}

#[tokio::test]
async fn per_publisher_order_is_preserved() {
    let bus = TestBus::new(Config::default());
    let mut north = bus.attach(Side::North);
    let mut south = bus.attach(Side::South);

    north.client.subscribe("seq").await.unwrap();
    bus.wait_for_subscriptions(1, 0).await;

    for i in 0..200 {
        south.client.publish("seq", format!("{i}")).await.unwrap();
    }
    for i in 0..200 {
        assert_eq!(recv(&mut north.client).await.payload, format!("{i}"));
    }
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let bus = TestBus::new(Config::default());
    let mut north = bus.attach(Side::North);
    let mut south = bus.attach(Side::South);

    north.client.subscribe("port0").await.unwrap();
    north.client.subscribe("port").await.unwrap();
    bus.wait_for_subscriptions(2, 0).await;

    north.client.unsubscribe("port0").await.unwrap();
    bus.wait_for_subscriptions(1, 0).await;

    south.client.publish("port0_a", "still via port").await.unwrap();
    assert_eq!(recv(&mut north.client).await.payload, "still via port");

    north.client.unsubscribe("port").await.unwrap();
    // Unknown pairs are ignored without closing the connection.
    north.client.unsubscribe("never-subscribed").await.unwrap();
    bus.wait_for_subscriptions(0, 0).await;

    south.client.publish("port0_b", "nobody").await.unwrap();
    assert_silent(&mut north.client).await;
    assert_eq!(bus.bridge.connection_count(), 2);
}

#[tokio::test]
async fn disconnect_removes_every_subscription() {
    let bus = TestBus::new(Config::default());
    let north = bus.attach(Side::North);
    let mut south = bus.attach(Side::South);

    let mut client = north.client;
    client.subscribe("a").await.unwrap();
    client.subscribe("b").await.unwrap();
    bus.wait_for_subscriptions(2, 0).await;

    drop(client);
    let reason = north.session.await.unwrap();
    assert_eq!(reason, ezmb::core::connection::CloseReason::PeerClosed);

    bus.wait_for_connections(1).await;
    assert_eq!(bus.bridge.router().stats().north.subscriptions, 0);

    south.client.publish("a", "into the void").await.unwrap();
    common::wait_until(|| bus.bridge.metrics().snapshot().unrouted == 1).await;
}
