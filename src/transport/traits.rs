//! Transport trait definitions.

use std::future::Future;

use crate::protocol::{JsonRpcMessage, JsonRpcResponse, McpError};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Item yielded by a [`MessageSource`]: a well-formed protocol message, or
/// the decode error for one malformed frame.
pub type SourceItem = std::result::Result<JsonRpcMessage, serde_json::Error>;

/// Server-side transport: receive incoming messages and send responses.
///
/// Uses `&mut self` to avoid locks - a transport is owned by a single task.
pub trait ServerTransport: Send {
    /// Receive the next incoming message. `None` means the peer closed the
    /// connection.
    fn recv(&mut self) -> impl Future<Output = Result<Option<JsonRpcMessage>>> + Send;

    /// Send a response to a request.
    fn respond(&mut self, response: JsonRpcResponse) -> impl Future<Output = Result<()>> + Send;
}

/// Readable half of a relayed transport.
pub trait MessageSource: Send {
    /// Next item from the stream.
    ///
    /// `Ok(Some(Err(_)))` is a malformed frame the caller may skip.
    /// `Ok(None)` is a clean end of stream. `Err(_)` is fatal to the
    /// transport.
    fn next(&mut self) -> impl Future<Output = Result<Option<SourceItem>>> + Send;
}

/// Writable half of a relayed transport.
pub trait MessageSink: Send {
    /// Deliver one message.
    fn send(&mut self, message: JsonRpcMessage) -> impl Future<Output = Result<()>> + Send;

    /// Close the sink; nothing is delivered afterwards.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}
