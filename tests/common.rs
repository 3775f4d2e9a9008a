#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use ezmb::broker::engine::spawn_session;
use ezmb::core::connection::CloseReason;
use ezmb::core::message::Message;
use ezmb::{Bridge, BusClient, Config, Side};
use tokio::io::DuplexStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

pub const PIPE_CAPACITY: usize = 64 * 1024;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        ezmb::logging::init_logging();
    });
}

/// A bridge driven over in-memory pipes instead of sockets.
pub struct TestBus {
    pub bridge: Arc<Bridge>,
    pub shutdown_tx: watch::Sender<bool>,
}

pub struct Attached {
    pub client: BusClient<DuplexStream>,
    pub session: JoinHandle<CloseReason>,
}

impl TestBus {
    pub fn new(config: Config) -> Self {
        init_logging();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            bridge: Arc::new(Bridge::new(config)),
            shutdown_tx,
        }
    }

    pub fn attach(&self, side: Side) -> Attached {
        self.attach_with_pipe(side, PIPE_CAPACITY)
    }

    pub fn attach_with_pipe(&self, side: Side, pipe_capacity: usize) -> Attached {
        let (client_end, bus_end) = tokio::io::duplex(pipe_capacity);
        let session = spawn_session(&self.bridge, side, bus_end, self.shutdown_tx.subscribe());
        Attached {
            client: BusClient::new(client_end),
            session,
        }
    }

    /// Waits until the router holds `north` and `south` subscriptions.
    pub async fn wait_for_subscriptions(&self, north: usize, south: usize) {
        let bridge = Arc::clone(&self.bridge);
        wait_until(move || {
            let stats = bridge.router().stats();
            stats.north.subscriptions == north && stats.south.subscriptions == south
        })
        .await;
    }

    pub async fn wait_for_connections(&self, n: usize) {
        let bridge = Arc::clone(&self.bridge);
        wait_until(move || bridge.connection_count() == n).await;
    }
}

pub async fn wait_until<F>(mut cond: F)
where
    F: FnMut() -> bool,
{
    time::timeout(Duration::from_secs(5), async {
        while !cond() {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn recv(client: &mut BusClient<DuplexStream>) -> Message {
    time::timeout(Duration::from_secs(5), client.next_message())
        .await
        .expect("timed out waiting for delivery")
        .expect("receive failed")
        .expect("connection closed")
}

/// Asserts that nothing arrives within a short window.
pub async fn assert_silent(client: &mut BusClient<DuplexStream>) {
    let res = time::timeout(Duration::from_millis(100), client.next_message()).await;
    assert!(res.is_err(), "unexpected delivery: {res:?}");
}
