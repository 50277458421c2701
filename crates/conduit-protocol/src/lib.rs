//! Wire types and stream framing shared by Conduit clients.
//!
//! Messages travel as JSON values over a byte stream with no length prefix or
//! delimiter, so [`Framer`] recovers message boundaries from content.
//! Correlation relies solely on the `id` member carried in each message.

mod framer;
mod lifecycle;
mod protocol;

pub use framer::{FrameError, Framer, FramingPolicy};
pub use lifecycle::{default_endpoint, ENDPOINT_ENV};
pub use protocol::{
    JsonRpcMapper, Message, PayloadMapper, RequestId, RpcError, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
