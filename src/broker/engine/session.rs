//! One client connection: a reader loop on the session task and a writer
//! task draining the outbound queue.

use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::core::command::{decode_command, Command};
use crate::core::connection::{CloseReason, ConnectionState};
use crate::core::error::ProtocolError;
use crate::core::frame::try_decode_frame;
use crate::core::message::encode_message_into;
use crate::core::queue::OutboundReceiver;
use crate::core::side::Side;

use super::bridge::{Bridge, ConnectionHandle};

const INITIAL_BUFFER_SIZE: usize = 8 * 1024;
/// Messages coalesced into one write before flushing.
const MAX_WRITE_BATCH: usize = 64;

/// Runs a connection on `side` to completion and returns why it closed.
///
/// The connection is registered before the first read and fully
/// unregistered (subscriptions, registry entry, pending queue) before this
/// returns.
pub async fn run_session<S>(
    bridge: Arc<Bridge>,
    side: Side,
    stream: S,
    shutdown: watch::Receiver<bool>,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (handle, outbound) = bridge.register(side);
    let span = tracing::info_span!("connection", conn_id = handle.id().value(), %side);

    async move {
        let (reader, writer) = tokio::io::split(stream);
        let closes = handle.close_requests();
        handle.touch();
        handle.advance(ConnectionState::Active);
        debug!("connection active");

        let writer_task = tokio::spawn(
            write_loop(writer, outbound, Arc::clone(&handle), Arc::clone(&bridge))
                .in_current_span(),
        );

        let reason = read_loop(reader, &handle, &bridge, closes, shutdown).await;

        handle.advance(ConnectionState::Closing);
        match &reason {
            CloseReason::Protocol(e) => {
                bridge.metrics().inc_protocol_errors(1);
                warn!("closing connection: protocol error: {}", e);
            }
            CloseReason::Transport(e) => error!("closing connection: {}", e),
            other => info!("closing connection: {}", other),
        }

        bridge.unregister(handle.id());
        writer_task.abort();
        let _ = writer_task.await;
        trace!("connection closed");
        reason
    }
    .instrument(span)
    .await
}

async fn read_loop<R>(
    mut reader: ReadHalf<R>,
    handle: &ConnectionHandle,
    bridge: &Bridge,
    mut closes: watch::Receiver<Option<CloseReason>>,
    mut shutdown: watch::Receiver<bool>,
) -> CloseReason
where
    R: AsyncRead + AsyncWrite,
{
    if *shutdown.borrow() {
        return CloseReason::Shutdown;
    }
    if let Some(reason) = closes.borrow().clone() {
        return reason;
    }

    let idle_timeout = bridge.config().idle_timeout();
    let mut read_buf = BytesMut::with_capacity(INITIAL_BUFFER_SIZE);

    loop {
        let idle_check = idle_timeout
            .map(|limit| limit.saturating_sub(handle.idle_for()))
            .unwrap_or(Duration::MAX);

        tokio::select! {
            read_result = reader.read_buf(&mut read_buf) => {
                match read_result {
                    Ok(0) => return CloseReason::PeerClosed,
                    Ok(_) => {
                        handle.touch();
                        if let Err(e) = process_frames(&mut read_buf, handle, bridge) {
                            return CloseReason::Protocol(e.to_string());
                        }
                    }
                    Err(e) => return CloseReason::Transport(e.to_string()),
                }
            }
            changed = closes.changed() => {
                return match changed {
                    Ok(()) => closes.borrow().clone().unwrap_or(CloseReason::Shutdown),
                    Err(_) => CloseReason::Shutdown,
                };
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return CloseReason::Shutdown;
                }
            }
            _ = tokio::time::sleep(idle_check), if idle_timeout.is_some() => {
                if let Some(limit) = idle_timeout {
                    if handle.idle_for() >= limit {
                        return CloseReason::IdleTimeout;
                    }
                }
            }
        }
    }
}

/// Applies every complete frame in `buf`, in arrival order.
fn process_frames(
    buf: &mut BytesMut,
    handle: &ConnectionHandle,
    bridge: &Bridge,
) -> Result<(), ProtocolError> {
    while let Some(segments) = try_decode_frame(buf, bridge.max_frame_len())? {
        let command = decode_command(segments, bridge.control_marker(), bridge.decode_limits())?;
        match command {
            Command::Publish(message) => {
                bridge.publish(handle.side(), message);
            }
            Command::Subscribe(prefix) => {
                bridge.subscribe(handle.id(), handle.side(), prefix);
            }
            Command::Unsubscribe(prefix) => {
                bridge.unsubscribe(handle.id(), &prefix);
            }
        }
    }
    Ok(())
}

async fn write_loop<W>(
    mut writer: WriteHalf<W>,
    outbound: OutboundReceiver,
    handle: Arc<ConnectionHandle>,
    bridge: Arc<Bridge>,
) where
    W: AsyncRead + AsyncWrite,
{
    let mut write_buf = BytesMut::with_capacity(INITIAL_BUFFER_SIZE);
    let max_batch = MAX_WRITE_BATCH.min(bridge.config().queues.capacity).max(1);

    while let Ok(first) = outbound.recv_async().await {
        let mut batch = vec![first];
        while batch.len() < max_batch {
            match outbound.try_recv() {
                Ok(next) => batch.push(next),
                Err(_) => break,
            }
        }

        for message in &batch {
            if let Err(e) = encode_message_into(message, &mut write_buf) {
                warn!(topic = %message.topic_lossy(), "skipping unencodable delivery: {}", e);
            }
        }

        let bytes = write_buf.len();
        let flushed = match writer.write_all(&write_buf).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        write_buf.clear();

        if let Err(e) = flushed {
            let _ = handle.close(CloseReason::Transport(e.to_string()));
            return;
        }

        outbound.release(batch.len());
        handle.touch();
        bridge.metrics().inc_flush_bytes(bytes as u64);
        bridge.metrics().inc_flush_batches(1);
        trace!(messages = batch.len(), bytes, "flushed deliveries");
    }
}
