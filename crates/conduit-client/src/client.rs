//! Client façade

use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionLifecycle, ConnectionState};
use crate::dispatcher::Dispatcher;
use crate::error::{ClientError, Result};
use crate::pending::{PendingRequestTable, Waiter};
use crate::transport::{platform_transport, Transport};
use conduit_protocol::{JsonRpcMapper, Message, PayloadMapper, RequestId};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Messages that did not answer any pending request
pub type NotificationReceiver = mpsc::UnboundedReceiver<Message>;

/// Sends requests over one socket connection and matches up the responses
///
/// Requests may be issued concurrently from many tasks; responses are routed
/// by id and can arrive in any order.
///
/// # Example
///
/// ```ignore
/// let (client, mut notifications) = RpcClient::connect_to("/tmp/node.ipc")?;
///
/// let block = client.call("eth_blockNumber", vec![]).await?;
///
/// while let Some(message) = notifications.recv().await {
///     println!("unsolicited: {:?}", message);
/// }
/// ```
pub struct RpcClient {
    lifecycle: ConnectionLifecycle,
    pending: Arc<PendingRequestTable>,
    mapper: Arc<dyn PayloadMapper>,
}

impl RpcClient {
    /// Connect to `endpoint` with default settings and the platform transport
    pub fn connect_to(endpoint: impl Into<PathBuf>) -> Result<(Self, NotificationReceiver)> {
        Self::connect(ClientConfig::new(endpoint))
    }

    /// Connect with the platform transport (Unix socket or named pipe)
    pub fn connect(config: ClientConfig) -> Result<(Self, NotificationReceiver)> {
        Self::with_transport(config, Arc::new(platform_transport()))
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<(Self, NotificationReceiver)> {
        Self::with_parts(config, transport, Arc::new(JsonRpcMapper::new()))
    }

    /// Build a client from explicit collaborators and start connecting
    ///
    /// Returns immediately with the connection in `Connecting`; subscribe to
    /// events and wait for [`ConnectionEvent::Ready`] before sending. Must be
    /// called from within a tokio runtime.
    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        mapper: Arc<dyn PayloadMapper>,
    ) -> Result<(Self, NotificationReceiver)> {
        config.validate()?;

        let pending = Arc::new(PendingRequestTable::new());
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(pending.clone(), notify_tx));
        let lifecycle = ConnectionLifecycle::new(&config, transport, dispatcher);
        lifecycle.connect();

        Ok((
            Self {
                lifecycle,
                pending,
                mapper,
            },
            notify_rx,
        ))
    }

    /// Send a request with a client-generated id
    ///
    /// Never waits: the returned future is already failed when the request
    /// could not be written.
    pub fn send(&self, method: &str, params: Vec<Value>) -> PendingResponse {
        let id = self.mapper.next_id();
        self.start(id, method, &params)
    }

    /// Send a request with a caller-chosen id
    ///
    /// Fails with [`ClientError::DuplicateId`] while a request with the same
    /// id is still pending; nothing is written in that case.
    pub fn send_with_id(
        &self,
        id: impl Into<RequestId>,
        method: &str,
        params: Vec<Value>,
    ) -> PendingResponse {
        self.start(id.into(), method, &params)
    }

    /// Send a request and unwrap its JSON-RPC `result`
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let response = self.send(method, params).await?;

        if let Some(error) = response.error() {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result().cloned().unwrap_or(Value::Null))
    }

    fn start(&self, id: RequestId, method: &str, params: &[Value]) -> PendingResponse {
        match self.try_start(&id, method, params) {
            Ok(waiter) => PendingResponse::waiting(id, waiter),
            Err(e) => PendingResponse::failed(id, e),
        }
    }

    fn try_start(&self, id: &RequestId, method: &str, params: &[Value]) -> Result<Waiter> {
        let conn = self.lifecycle.current();

        if conn.as_ref().map(|c| c.state()) == Some(ConnectionState::Connecting) {
            debug!(%id, method, "Refusing request while connecting");
            return Err(ClientError::NotReady);
        }
        if self.pending.contains(id) {
            return Err(ClientError::DuplicateId(id.clone()));
        }

        // Best effort only: this request still goes to the connection
        // observed above
        if !conn.as_ref().is_some_and(|c| c.is_writable()) {
            self.reconnect();
        }

        let payload = self.mapper.to_payload(id, method, params)?;

        // Register before writing so a fast response cannot beat the waiter
        let waiter = self.pending.register(id.clone())?;
        let written = match conn {
            Some(conn) => conn.write(payload),
            None => Err(ClientError::WriteFailure("not connected".to_string())),
        };

        if let Err(e) = written {
            self.pending.remove(id);
            warn!(%id, method, error = %e, "Request not written");
            return Err(e);
        }

        debug!(%id, method, "Request sent");
        Ok(waiter)
    }

    /// Close the connection and fail every pending request
    pub fn disconnect(&self) {
        self.lifecycle.disconnect();
        let dropped = self.pending.clear();
        if dropped > 0 {
            debug!(dropped, "Failed pending requests on disconnect");
        }
    }

    /// Replace the connection and fail every pending request
    ///
    /// Does not wait for the new connection to open.
    pub fn reconnect(&self) {
        self.lifecycle.reconnect();
        let dropped = self.pending.clear();
        if dropped > 0 {
            debug!(dropped, "Failed pending requests on reconnect");
        }
    }

    pub fn connected(&self) -> bool {
        self.lifecycle.state() == ConnectionState::Open
    }

    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    pub fn endpoint(&self) -> &Path {
        self.lifecycle.endpoint()
    }

    /// Number of requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.lifecycle.subscribe()
    }

    /// Number of connections allocated since construction
    pub fn connection_generation(&self) -> u64 {
        self.lifecycle.generation()
    }
}

/// The eventual response to one request
///
/// Resolves to the response message, or to the error that stopped the
/// request. There is no built-in timeout; wrap in `tokio::time::timeout` if
/// one is needed.
#[derive(Debug)]
pub struct PendingResponse {
    id: RequestId,
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Waiting(Waiter),
    Failed(Option<ClientError>),
}

impl PendingResponse {
    fn waiting(id: RequestId, waiter: Waiter) -> Self {
        Self {
            id,
            inner: Inner::Waiting(waiter),
        }
    }

    fn failed(id: RequestId, error: ClientError) -> Self {
        Self {
            id,
            inner: Inner::Failed(Some(error)),
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Future for PendingResponse {
    type Output = Result<Message>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            // A dropped sender means the table itself went away
            Inner::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|outcome| outcome.unwrap_or(Err(ClientError::ConnectionLost))),
            Inner::Failed(error) => {
                Poll::Ready(Err(error.take().unwrap_or(ClientError::ConnectionLost)))
            }
        }
    }
}
