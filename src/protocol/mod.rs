//! JSON-RPC envelope types and protocol-level errors.
//!
//! Only the envelope is typed here. MCP payloads (initialize results, tool
//! listings, call results) are built and consumed as raw [`serde_json::Value`]
//! by the server; the relay never looks past the envelope at all.

mod error;
mod message;

pub use error::{ErrorCode, JsonRpcError, McpError};
pub use message::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
