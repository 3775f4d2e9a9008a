//! Accept loops for the north and south endpoints.

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, Instrument};

use crate::broker::transport::Listener;
use crate::config::{Config, Endpoint};
use crate::core::connection::CloseReason;
use crate::core::error::BusError;
use crate::core::side::Side;

use super::bridge::Bridge;
use super::session::run_session;

/// Spawns a session for an already-connected stream.
pub fn spawn_session<S>(
    bridge: &Arc<Bridge>,
    side: Side,
    stream: S,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<CloseReason>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(run_session(Arc::clone(bridge), side, stream, shutdown))
}

/// Both endpoints bound and ready to accept.
#[derive(Debug)]
pub struct BusServer {
    bridge: Arc<Bridge>,
    north: Listener,
    south: Listener,
}

impl BusServer {
    /// Binds both endpoints. Nothing is accepted until [`BusServer::run`].
    pub async fn bind(config: Config) -> Result<Self, BusError> {
        config.validate()?;
        let north = Listener::bind(&config.north_endpoint()?).await?;
        let south = Listener::bind(&config.south_endpoint()?).await?;
        Ok(Self {
            bridge: Arc::new(Bridge::new(config)),
            north,
            south,
        })
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    pub fn north_endpoint(&self) -> io::Result<Endpoint> {
        self.north.local_endpoint()
    }

    pub fn south_endpoint(&self) -> io::Result<Endpoint> {
        self.south.local_endpoint()
    }

    /// Accepts on both endpoints until `shutdown` flips to `true` (or its
    /// sender is dropped), then waits for every session to close.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), BusError> {
        let BusServer {
            bridge,
            north,
            south,
        } = self;
        info!(
            north = %north.local_endpoint()?,
            south = %south.local_endpoint()?,
            topology = %bridge.config().routing.topology,
            "ezmb bus listening"
        );

        let reporter = bridge.config().report_interval().map(|every| {
            tokio::spawn(report_metrics(Arc::clone(&bridge), every, shutdown.clone()))
        });

        tokio::join!(
            accept_loop(&north, Side::North, &bridge, shutdown.clone())
                .instrument(tracing::info_span!("accept", side = "north")),
            accept_loop(&south, Side::South, &bridge, shutdown.clone())
                .instrument(tracing::info_span!("accept", side = "south")),
        );

        if let Some(reporter) = reporter {
            let _ = reporter.await;
        }
        info!(target: "ezmb::metrics", "final counters\n{}", bridge.metrics().render());
        info!("ezmb bus stopped");
        Ok(())
    }
}

/// Binds the configured endpoints and runs the bus until `shutdown`.
pub async fn serve(config: Config, shutdown: watch::Receiver<bool>) -> Result<(), BusError> {
    BusServer::bind(config).await?.run(shutdown).await
}

async fn accept_loop(
    listener: &Listener,
    side: Side,
    bridge: &Arc<Bridge>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions: JoinSet<CloseReason> = JoinSet::new();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        let session = run_session(Arc::clone(bridge), side, stream, shutdown.clone());
                        sessions.spawn(session);
                    }
                    Err(err) => {
                        error!("accept error: {}", err);
                    }
                }
            }
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            result = shutdown.changed() => {
                match result {
                    Ok(_) if !*shutdown.borrow() => continue,
                    Ok(_) => info!("shutdown signal received; stopping accept loop"),
                    Err(_) => info!("shutdown sender dropped; stopping accept loop"),
                }
                break;
            }
        }
    }

    while sessions.join_next().await.is_some() {}
}

async fn report_metrics(
    bridge: Arc<Bridge>,
    every: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => bridge.log_metrics(),
            _ = shutdown.changed() => break,
        }
    }
}
