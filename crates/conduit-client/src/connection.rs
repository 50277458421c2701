//! Physical connection ownership
//!
//! [`ConnectionLifecycle`] owns the one live connection of a client. Each
//! connection gets a driver task that dials the transport, then runs a
//! reader (framing and dispatch, in stream order) and a writer (draining the
//! bounded outbound queue) until the peer closes, an IO error occurs, or the
//! connection is discarded.
//!
//! State moves `Connecting -> Open -> Closed`, with `Errored` reachable from
//! `Connecting` or `Open`. `Closed` and `Errored` are terminal for a given
//! connection; recovering means allocating a new one with
//! [`reconnect`](ConnectionLifecycle::reconnect).

use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{ClientError, Result};
use crate::transport::Transport;
use conduit_protocol::{Framer, FramingPolicy};
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ConnectionState {
    fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored)
    }
}

/// Lifecycle notifications published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport accepted the connection
    Connect,
    /// Reader and writer are running; requests can be sent
    Ready,
    /// Transport failure, or input that could not be framed
    Error(String),
    /// The connection closed, by the peer or by `disconnect`
    Close,
}

/// One physical connection
pub(crate) struct Connection {
    generation: u64,
    state: Mutex<ConnectionState>,
    outbound: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
}

impl Connection {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Move to `next` unless the connection already reached a terminal state
    fn set_state(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    /// Force `Closed` from any state, returning the state it replaced
    fn close(&self) -> ConnectionState {
        std::mem::replace(&mut *self.state.lock(), ConnectionState::Closed)
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.state() == ConnectionState::Open && self.outbound.capacity() > 0
    }

    /// Queue `payload` for the writer without waiting
    pub(crate) fn write(&self, payload: Vec<u8>) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(ClientError::WriteFailure(format!(
                "connection is {:?}",
                state
            )));
        }
        self.outbound.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                ClientError::WriteFailure("write queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                ClientError::WriteFailure("writer has shut down".to_string())
            }
        })
    }
}

pub struct ConnectionLifecycle {
    endpoint: PathBuf,
    transport: Arc<dyn Transport>,
    framing: FramingPolicy,
    write_queue_capacity: usize,
    read_buffer_size: usize,
    dispatcher: Arc<Dispatcher>,
    events: broadcast::Sender<ConnectionEvent>,
    current: Mutex<Option<Arc<Connection>>>,
    generation: AtomicU64,
}

impl ConnectionLifecycle {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            endpoint: config.endpoint.clone(),
            transport,
            framing: config.framing,
            write_queue_capacity: config.write_queue_capacity,
            read_buffer_size: config.read_buffer_size,
            dispatcher,
            events,
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    /// Allocate a connection in `Connecting` and start dialing
    ///
    /// Any previous connection is discarded silently. Must be called from
    /// within a tokio runtime.
    pub fn connect(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound, outbound_rx) = mpsc::channel(self.write_queue_capacity);
        let conn = Arc::new(Connection {
            generation,
            state: Mutex::new(ConnectionState::Connecting),
            outbound,
            cancel: CancellationToken::new(),
        });

        let previous = self.current.lock().replace(conn.clone());
        if let Some(previous) = previous {
            debug!(generation = previous.generation, "Discarding connection");
            previous.set_state(ConnectionState::Closed);
            previous.cancel.cancel();
        }

        debug!(generation, endpoint = ?self.endpoint, "Connecting");
        let driver = Driver {
            conn,
            transport: self.transport.clone(),
            endpoint: self.endpoint.clone(),
            framing: self.framing,
            read_buffer_size: self.read_buffer_size,
            dispatcher: self.dispatcher.clone(),
            events: self.events.clone(),
        };
        tokio::spawn(driver.run(outbound_rx));
    }

    /// Replace the current connection with a fresh one
    ///
    /// Returns immediately; the new connection starts in `Connecting`, so a
    /// write issued right after this call can still be refused.
    pub fn reconnect(&self) {
        info!(endpoint = ?self.endpoint, "Reconnecting");
        self.connect();
    }

    /// Terminate the current connection, leaving it `Closed` whatever its
    /// state. Idempotent.
    pub fn disconnect(&self) {
        let current = self.current.lock().clone();
        if let Some(conn) = current {
            if conn.close() != ConnectionState::Closed {
                info!(generation = conn.generation, "Disconnected");
                let _ = self.events.send(ConnectionEvent::Close);
            }
            conn.cancel.cancel();
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.current
            .lock()
            .as_ref()
            .map(|conn| conn.state())
            .unwrap_or(ConnectionState::Closed)
    }

    pub fn is_writable(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|conn| conn.is_writable())
    }

    /// Number of connections allocated so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn current(&self) -> Option<Arc<Connection>> {
        self.current.lock().clone()
    }
}

impl Drop for ConnectionLifecycle {
    fn drop(&mut self) {
        if let Some(conn) = self.current.get_mut().take() {
            conn.set_state(ConnectionState::Closed);
            conn.cancel.cancel();
        }
    }
}

/// Background task state for a single connection
struct Driver {
    conn: Arc<Connection>,
    transport: Arc<dyn Transport>,
    endpoint: PathBuf,
    framing: FramingPolicy,
    read_buffer_size: usize,
    dispatcher: Arc<Dispatcher>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Driver {
    async fn run(self, outbound_rx: mpsc::Receiver<Vec<u8>>) {
        let cancel = self.conn.cancel.clone();
        let generation = self.conn.generation;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, "Connection task stopped");
                return;
            }
            outcome = self.serve(outbound_rx) => outcome,
        };

        match outcome {
            Ok(()) => {
                if self.conn.set_state(ConnectionState::Closed) {
                    info!(generation, "Connection closed by peer");
                    let _ = self.events.send(ConnectionEvent::Close);
                }
            }
            Err(e) => {
                if self.conn.set_state(ConnectionState::Errored) {
                    warn!(generation, error = %e, "Connection failed");
                    let _ = self.events.send(ConnectionEvent::Error(e.to_string()));
                }
            }
        }
    }

    /// Returns `Ok` when the peer closes the stream
    async fn serve(&self, outbound_rx: mpsc::Receiver<Vec<u8>>) -> io::Result<()> {
        let stream = self.transport.connect(&self.endpoint).await?;
        let _ = self.events.send(ConnectionEvent::Connect);

        if !self.conn.set_state(ConnectionState::Open) {
            return Ok(());
        }
        info!(generation = self.conn.generation, endpoint = ?self.endpoint, "Connection open");
        let _ = self.events.send(ConnectionEvent::Ready);

        let (reader, writer) = tokio::io::split(stream);
        tokio::select! {
            outcome = self.read_loop(reader) => outcome,
            outcome = write_loop(writer, outbound_rx) => outcome,
        }
    }

    async fn read_loop<R: AsyncRead + Unpin>(&self, mut reader: R) -> io::Result<()> {
        let mut framer = Framer::new(self.framing);
        let mut buf = vec![0u8; self.read_buffer_size];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                if framer.buffered() > 0 {
                    debug!(
                        generation = self.conn.generation,
                        bytes = framer.buffered(),
                        "Peer closed with a partial message buffered"
                    );
                }
                return Ok(());
            }

            for frame in framer.push(&buf[..n]) {
                // A discarded connection must not resolve waiters of its successor
                if self.conn.cancel.is_cancelled() {
                    return Ok(());
                }
                match frame {
                    Ok(message) => {
                        self.dispatcher.dispatch(message);
                    }
                    Err(e) => {
                        warn!(generation = self.conn.generation, error = %e, "Discarding unreadable input");
                        let _ = self.events.send(ConnectionEvent::Error(e.to_string()));
                    }
                }
            }
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
) -> io::Result<()> {
    while let Some(payload) = outbound_rx.recv().await {
        writer.write_all(&payload).await?;
        writer.flush().await?;
    }
    // The sender lives as long as the connection, so this only happens on teardown
    std::future::pending().await
}
