//! Shared fixtures for client integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use conduit_client::{BoxStream, ClientConfig, RpcClient, Transport};
use serde_json::Value;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{mpsc, Notify};

pub const WAIT: Duration = Duration::from_secs(2);

/// Route client logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Server side of one client connection
pub struct Peer<S> {
    stream: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Peer<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Read the next newline-terminated request
    pub async fn next_request(&mut self) -> Value {
        let mut line = String::new();
        let n = tokio::time::timeout(WAIT, self.stream.read_line(&mut line))
            .await
            .expect("timed out waiting for request")
            .expect("read failed");
        assert!(n > 0, "client closed the connection");
        serde_json::from_str(&line).expect("request is not JSON")
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write failed");
        self.stream.flush().await.expect("flush failed");
    }

    pub async fn reply(&mut self, message: Value) {
        let bytes = serde_json::to_vec(&message).unwrap();
        self.send_raw(&bytes).await;
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

/// In-process transport backed by `tokio::io::duplex`
///
/// Every connect hands the server half to the test through a channel.
/// With a gate, connect waits until the test releases it.
pub struct MemoryTransport {
    peers: mpsc::UnboundedSender<DuplexStream>,
    gate: Option<Arc<Notify>>,
    buffer: usize,
}

pub struct MemoryPeers {
    rx: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MemoryPeers {
    pub async fn accept(&mut self) -> Peer<DuplexStream> {
        let stream = tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for connection")
            .expect("transport dropped");
        Peer::new(stream)
    }
}

impl MemoryTransport {
    pub fn new(buffer: usize) -> (Self, MemoryPeers) {
        init_tracing();
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers,
                gate: None,
                buffer,
            },
            MemoryPeers { rx },
        )
    }

    pub fn gated(buffer: usize) -> (Self, MemoryPeers, Arc<Notify>) {
        let (mut transport, peers) = Self::new(buffer);
        let gate = Arc::new(Notify::new());
        transport.gate = Some(gate.clone());
        (transport, peers, gate)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, _endpoint: &Path) -> io::Result<BoxStream> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let (client, server) = tokio::io::duplex(self.buffer);
        self.peers
            .send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "no listener"))?;
        Ok(Box::new(client))
    }
}

pub fn memory_config() -> ClientConfig {
    ClientConfig::new("memory.sock")
}

pub async fn wait_connected(client: &RpcClient) {
    tokio::time::timeout(WAIT, async {
        while !client.connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client never connected");
}
