//! Request/response correlation over one persistent socket connection
//!
//! [`RpcClient`] writes JSON requests to a Unix domain socket or named pipe
//! and routes each response back to its caller by the `id` it carries.
//! Many requests may be in flight at once and responses may arrive in any
//! order. Messages that answer no pending request are delivered on the
//! notification channel returned at construction.
//!
//! Connection problems are reported as [`ConnectionEvent`]s rather than as
//! errors on unrelated requests. `disconnect` and `reconnect` fail every
//! pending request with [`ClientError::ConnectionLost`].

mod client;
mod config;
mod connection;
mod dispatcher;
mod error;
mod pending;
pub mod transport;

pub use client::{NotificationReceiver, PendingResponse, RpcClient};
pub use config::ClientConfig;
pub use connection::{ConnectionEvent, ConnectionLifecycle, ConnectionState};
pub use dispatcher::{Dispatcher, Routed};
pub use error::{ClientError, Result};
pub use pending::PendingRequestTable;
pub use transport::{BoxStream, Transport};

pub use conduit_protocol::{FramingPolicy, Message, RequestId, RpcError};
