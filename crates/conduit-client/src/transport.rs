//! Byte transports the client can run over
//!
//! A transport only knows how to open a duplex byte stream to an endpoint.
//! Reading, writing, backpressure and teardown are handled by
//! [`ConnectionLifecycle`](crate::ConnectionLifecycle).

use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite};

/// A connected duplex byte stream
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxStream = Box<dyn Stream>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new stream to `endpoint`
    async fn connect(&self, endpoint: &Path) -> io::Result<BoxStream>;
}

/// Unix domain socket transport
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixTransport;

#[cfg(unix)]
#[async_trait]
impl Transport for UnixTransport {
    async fn connect(&self, endpoint: &Path) -> io::Result<BoxStream> {
        let stream = tokio::net::UnixStream::connect(endpoint).await?;
        Ok(Box::new(stream))
    }
}

/// Windows named pipe transport (`\\.\pipe\name`)
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NamedPipeTransport;

#[cfg(windows)]
#[async_trait]
impl Transport for NamedPipeTransport {
    async fn connect(&self, endpoint: &Path) -> io::Result<BoxStream> {
        use tokio::net::windows::named_pipe::ClientOptions;

        let client = ClientOptions::new().open(endpoint)?;
        Ok(Box::new(client))
    }
}

/// The native transport for the current platform
#[cfg(unix)]
pub fn platform_transport() -> UnixTransport {
    UnixTransport
}

#[cfg(windows)]
pub fn platform_transport() -> NamedPipeTransport {
    NamedPipeTransport
}
