use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl RequestId {
    /// Read a correlation id out of a JSON value.
    ///
    /// Integral numbers and strings are accepted; anything else (null,
    /// floats, objects) cannot name a pending request.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(RequestId::Number),
            Value::String(s) => Some(RequestId::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RequestId {
    fn from(n: u64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

/// JSON-RPC error member of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// A complete value recovered from the stream
///
/// Either a single object (a response or a notification) or a batch array.
/// A batch is correlated through the id of its first element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Value);

impl Message {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The id used to route this message to a pending request
    pub fn id(&self) -> Option<RequestId> {
        let head = match &self.0 {
            Value::Array(items) => items.first()?,
            other => other,
        };
        head.get("id").and_then(RequestId::from_value)
    }

    pub fn is_batch(&self) -> bool {
        self.0.is_array()
    }

    /// The `method` member, present on server-initiated notifications
    pub fn method(&self) -> Option<&str> {
        self.0.get("method").and_then(Value::as_str)
    }

    pub fn result(&self) -> Option<&Value> {
        self.0.get("result")
    }

    /// Parse the `error` member if the message carries one
    pub fn error(&self) -> Option<RpcError> {
        let raw = self.0.get("error")?;
        match serde_json::from_value(raw.clone()) {
            Ok(err) => Some(err),
            Err(_) => Some(RpcError {
                code: INTERNAL_ERROR,
                message: raw.to_string(),
                data: None,
            }),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Turns a call into bytes for the wire
///
/// Implementations only need to guarantee that the encoded payload carries
/// `id` so the peer can echo it back.
pub trait PayloadMapper: Send + Sync {
    fn to_payload(
        &self,
        id: &RequestId,
        method: &str,
        params: &[Value],
    ) -> Result<Vec<u8>, serde_json::Error>;

    /// Produce a fresh id for a client-generated request
    fn next_id(&self) -> RequestId;
}

#[derive(Serialize)]
struct RequestPayload<'a> {
    jsonrpc: &'static str,
    id: &'a RequestId,
    method: &'a str,
    params: &'a [Value],
}

/// JSON-RPC 2.0 request encoding with a numeric id counter starting at 1
#[derive(Debug)]
pub struct JsonRpcMapper {
    next_id: AtomicU64,
}

impl JsonRpcMapper {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for JsonRpcMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadMapper for JsonRpcMapper {
    fn to_payload(
        &self,
        id: &RequestId,
        method: &str,
        params: &[Value],
    ) -> Result<Vec<u8>, serde_json::Error> {
        let payload = RequestPayload {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };
        let mut bytes = serde_json::to_vec(&payload)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}
