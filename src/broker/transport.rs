//! Stream transports behind the two bus endpoints.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::config::Endpoint;
use crate::core::error::BusError;

/// A bound endpoint.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Ipc { listener: UnixListener, path: PathBuf },
}

impl Listener {
    /// Binds `endpoint`. A leftover socket file at an `ipc://` path is
    /// removed first; any other file there is an error.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, BusError> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str())
                    .await
                    .map_err(|e| BusError::endpoint(endpoint.to_string(), e.to_string()))?;
                Ok(Listener::Tcp(listener))
            }
            #[cfg(unix)]
            Endpoint::Ipc(path) => {
                remove_stale_socket(path)
                    .map_err(|e| BusError::endpoint(endpoint.to_string(), e.to_string()))?;
                let listener = UnixListener::bind(path)
                    .map_err(|e| BusError::endpoint(endpoint.to_string(), e.to_string()))?;
                Ok(Listener::Ipc {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            Endpoint::Ipc(_) => Err(BusError::endpoint(
                endpoint.to_string(),
                "ipc endpoints need a unix platform",
            )),
        }
    }

    /// The address clients should connect to. For a TCP listener bound to
    /// port 0 this carries the assigned port.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Listener::Tcp(l) => Ok(Endpoint::Tcp(l.local_addr()?.to_string())),
            #[cfg(unix)]
            Listener::Ipc { path, .. } => Ok(Endpoint::Ipc(path.clone())),
        }
    }

    pub async fn accept(&self) -> io::Result<(Stream, String)> {
        match self {
            Listener::Tcp(l) => {
                let (stream, addr) = l.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Stream::Tcp(stream), addr.to_string()))
            }
            #[cfg(unix)]
            Listener::Ipc { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Stream::Ipc(stream), path.display().to_string()))
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Listener::Ipc { path, .. } = self {
            match std::fs::remove_file(&*path) {
                Ok(()) => debug!(path = %path.display(), "removed ipc socket"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "failed to remove ipc socket: {}", e),
            }
        }
    }
}

#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) -> io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            info!(path = %path.display(), "removing stale ipc socket");
            std::fs::remove_file(path)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// A connected byte stream on either transport, seen from the bus or from
/// a client.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Ipc(UnixStream),
}

impl Stream {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, BusError> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
            #[cfg(unix)]
            Endpoint::Ipc(path) => Ok(Stream::Ipc(UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            Endpoint::Ipc(_) => Err(BusError::endpoint(
                endpoint.to_string(),
                "ipc endpoints need a unix platform",
            )),
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Ipc(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Ipc(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Stream::Ipc(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Ipc(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
