//! Error types for client operations

use conduit_protocol::RequestId;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors returned through a request's result
///
/// Connection-level failures are not represented here; they are published as
/// [`ConnectionEvent`](crate::ConnectionEvent)s.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection is still being established
    #[error("Connection error: the socket is still trying to connect")]
    NotReady,

    /// The transport refused the payload (queue full or connection gone)
    #[error("Connection error: couldn't write on the socket: {0}")]
    WriteFailure(String),

    /// The pending request was dropped by disconnect or reconnect
    #[error("Connection lost before a response arrived")]
    ConnectionLost,

    /// A request with this id is still waiting for its response
    #[error("Request id {0} is already pending")]
    DuplicateId(RequestId),

    /// The peer answered with a JSON-RPC error member
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors from the transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}
