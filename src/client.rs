//! Minimal client for talking to a running bus.
//!
//! Used by the `ezmb connect` shell and by the integration tests. Any
//! `AsyncRead + AsyncWrite` stream works, so tests can drive a bus over an
//! in-memory duplex pipe.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::broker::transport::Stream;
use crate::config::Endpoint;
use crate::core::command::{
    encode_command, new_pub, new_sub, new_unsub, Command, DEFAULT_CONTROL_MARKER,
};
use crate::core::error::{BusError, ProtocolError};
use crate::core::frame::try_decode_frame;
use crate::core::message::Message;

/// Largest delivery frame the client accepts.
const CLIENT_MAX_FRAME_LEN: usize = 64 * 1024 * 1024;
const INITIAL_BUFFER_SIZE: usize = 8 * 1024;

/// Sending half: publish and manage subscriptions.
#[derive(Debug)]
pub struct BusSender<W> {
    writer: W,
    marker: Bytes,
    buf: BytesMut,
}

/// Receiving half: deliveries routed to this connection.
#[derive(Debug)]
pub struct BusReceiver<R> {
    reader: R,
    buf: BytesMut,
}

#[derive(Debug)]
pub struct BusClient<S> {
    sender: BusSender<WriteHalf<S>>,
    receiver: BusReceiver<ReadHalf<S>>,
}

impl BusClient<Stream> {
    /// Connects to `tcp://` or `ipc://` `endpoint`.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, BusError> {
        Ok(Self::new(Stream::connect(endpoint).await?))
    }
}

impl<S> BusClient<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            sender: BusSender {
                writer,
                marker: Bytes::from_static(DEFAULT_CONTROL_MARKER.as_bytes()),
                buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            },
            receiver: BusReceiver {
                reader,
                buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            },
        }
    }

    /// Uses a non-default control marker.
    pub fn with_marker(mut self, marker: impl Into<Bytes>) -> Self {
        self.sender.marker = marker.into();
        self
    }

    pub async fn publish(
        &mut self,
        topic: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Result<(), BusError> {
        self.sender.publish(topic, payload).await
    }

    pub async fn subscribe(&mut self, prefix: impl Into<Bytes>) -> Result<(), BusError> {
        self.sender.subscribe(prefix).await
    }

    pub async fn unsubscribe(&mut self, prefix: impl Into<Bytes>) -> Result<(), BusError> {
        self.sender.unsubscribe(prefix).await
    }

    pub async fn next_message(&mut self) -> Result<Option<Message>, BusError> {
        self.receiver.next_message().await
    }

    pub fn split(self) -> (BusSender<WriteHalf<S>>, BusReceiver<ReadHalf<S>>) {
        (self.sender, self.receiver)
    }
}

impl<W> BusSender<W>
where
    W: AsyncWrite + Unpin,
{
    pub async fn publish(
        &mut self,
        topic: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Result<(), BusError> {
        self.send(&new_pub(topic, payload)).await
    }

    pub async fn subscribe(&mut self, prefix: impl Into<Bytes>) -> Result<(), BusError> {
        self.send(&new_sub(prefix)).await
    }

    pub async fn unsubscribe(&mut self, prefix: impl Into<Bytes>) -> Result<(), BusError> {
        self.send(&new_unsub(prefix)).await
    }

    /// Writes raw bytes, bypassing command encoding.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<(), BusError> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn send(&mut self, command: &Command) -> Result<(), BusError> {
        self.buf.clear();
        encode_command(command, &self.marker, &mut self.buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        self.writer.write_all(&self.buf).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Half-closes the write direction.
    pub async fn close(&mut self) -> Result<(), BusError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

impl<R> BusReceiver<R>
where
    R: AsyncRead + Unpin,
{
    /// Waits for the next delivery. `Ok(None)` means the bus closed the
    /// connection.
    pub async fn next_message(&mut self) -> Result<Option<Message>, BusError> {
        loop {
            if let Some(mut segments) = try_decode_frame(&mut self.buf, CLIENT_MAX_FRAME_LEN)
                .map_err(ProtocolError::from)?
            {
                if segments.len() != 2 {
                    return Err(ProtocolError::PublishShape(segments.len()).into());
                }
                let payload = segments.pop().unwrap_or_default();
                let topic = segments.pop().unwrap_or_default();
                return Ok(Some(Message { topic, payload }));
            }

            if self.reader.read_buf(&mut self.buf).await? == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed mid-frame",
                )
                .into());
            }
        }
    }
}
