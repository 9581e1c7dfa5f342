//! Protocol server exposing the `bash` tool.
//!
//! One loop over a [`ServerTransport`]: requests are answered, notifications
//! acknowledged, per-request failures logged and reported to the caller.
//! Only transport failures end the loop. Because the loop is strictly
//! sequential, tool invocations are serialized - which is exactly the
//! one-call-at-a-time contract the shell session requires.

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::bash::{self, BashArgs, BashTool};
use crate::protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, McpError,
};
use crate::transport::{ServerTransport, StdioTransport};

/// MCP protocol version implemented by this server.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tools exposed by this server, parsed once from the wire name instead of
/// string-matching at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolCommand {
    Bash,
}

impl ToolCommand {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            bash::TOOL_NAME => Some(Self::Bash),
            _ => None,
        }
    }
}

/// MCP server bound to one transport and one [`BashTool`].
pub struct McpServer<T: ServerTransport> {
    transport: T,
    bash: BashTool,
    name: String,
    version: String,
    initialized: bool,
}

impl<T: ServerTransport> std::fmt::Debug for McpServer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("name", &self.name)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl McpServer<StdioTransport> {
    /// Create a server over stdio, the standard way an agent host runs it.
    ///
    /// # Errors
    ///
    /// Returns an error if stdio cannot be initialized.
    pub fn stdio(name: impl Into<String>, version: impl Into<String>) -> Result<Self, McpError> {
        let transport = StdioTransport::new()?;
        Ok(Self::new(transport, name, version))
    }
}

impl<T: ServerTransport> McpServer<T> {
    /// Create a server with a custom transport.
    #[must_use]
    pub fn new(transport: T, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            transport,
            bash: BashTool::new(),
            name: name.into(),
            version: version.into(),
            initialized: false,
        }
    }

    /// Run the server main loop until the connection closes.
    ///
    /// # Errors
    ///
    /// Returns an error only on a fatal transport failure.
    pub async fn run(&mut self) -> Result<(), McpError> {
        debug!(name = %self.name, "server starting");

        while let Some(message) = self.transport.recv().await? {
            match message {
                JsonRpcMessage::Request(request) => {
                    let response = self.handle_request(request).await;
                    self.transport.respond(response).await?;
                }
                JsonRpcMessage::Notification(notification) => {
                    debug!(method = %notification.method, "received notification");
                }
                JsonRpcMessage::Response(_) => {
                    warn!("unexpected response message, ignoring");
                }
            }
        }

        debug!("connection closed");
        Ok(())
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        debug!(method = %request.method, "handling request");

        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "tools/list" => Self::handle_list_tools(request),
            "tools/call" => self.handle_call_tool(request).await,
            method => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(method)),
        }
    }

    fn handle_initialize(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        self.initialized = true;
        JsonRpcResponse::success(
            request.id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": self.name, "version": self.version },
            }),
        )
    }

    fn handle_list_tools(request: JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(
            request.id,
            json!({
                "tools": [{
                    "name": bash::TOOL_NAME,
                    "description": bash::DESCRIPTION,
                    "inputSchema": bash::input_schema(),
                }],
            }),
        )
    }

    async fn handle_call_tool(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let Some(params) = request.params else {
            return JsonRpcResponse::error(request.id, JsonRpcError::invalid_params("missing params"));
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_params("missing tool name"),
            );
        };
        let Some(tool) = ToolCommand::from_name(name) else {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_params(format!("unknown tool: {name}")),
            );
        };

        match tool {
            ToolCommand::Bash => {
                let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
                let args: BashArgs = match serde_json::from_value(arguments) {
                    Ok(args) => args,
                    Err(err) => {
                        return JsonRpcResponse::error(
                            request.id,
                            JsonRpcError::invalid_params(err.to_string()),
                        );
                    }
                };

                let (text, is_error) = match self.bash.invoke(args).await {
                    Ok(result) => {
                        let is_error = result.is_error();
                        (result.into_text(), is_error)
                    }
                    Err(err) => {
                        warn!(error = %err, "bash tool call failed");
                        (err.to_string(), true)
                    }
                };

                JsonRpcResponse::success(
                    request.id,
                    json!({
                        "content": [{ "type": "text", "text": text }],
                        "isError": is_error,
                    }),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::protocol::ErrorCode;
    use crate::transport::Result as TransportResult;

    /// Scripted transport: pops queued incoming messages, records responses.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        incoming: VecDeque<JsonRpcMessage>,
        responses: Vec<JsonRpcResponse>,
    }

    impl ServerTransport for ScriptedTransport {
        async fn recv(&mut self) -> TransportResult<Option<JsonRpcMessage>> {
            Ok(self.incoming.pop_front())
        }

        async fn respond(&mut self, response: JsonRpcResponse) -> TransportResult<()> {
            self.responses.push(response);
            Ok(())
        }
    }

    fn request(id: i64, method: &str, params: Option<Value>) -> JsonRpcMessage {
        JsonRpcMessage::Request(match params {
            Some(params) => JsonRpcRequest::with_params(id, method, params),
            None => JsonRpcRequest::new(id, method),
        })
    }

    async fn serve(messages: Vec<JsonRpcMessage>) -> Vec<JsonRpcResponse> {
        let transport = ScriptedTransport {
            incoming: messages.into(),
            responses: Vec::new(),
        };
        let mut server = McpServer::new(transport, "test-server", "0.0.0");
        server.run().await.unwrap();
        server.transport.responses
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let responses = serve(vec![request(1, "initialize", Some(json!({})))]).await;
        let result = responses[0].clone().into_result().unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "test-server");
    }

    #[tokio::test]
    async fn list_tools_exposes_bash() {
        let responses = serve(vec![request(1, "tools/list", None)]).await;
        let result = responses[0].clone().into_result().unwrap();
        assert_eq!(result["tools"][0]["name"], "bash");
        assert!(result["tools"][0]["inputSchema"]["properties"]["command"].is_object());
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let responses = serve(vec![request(1, "resources/list", None)]).await;
        let err = responses[0].clone().into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let responses = serve(vec![request(
            1,
            "tools/call",
            Some(json!({ "name": "edit", "arguments": {} })),
        )])
        .await;
        let err = responses[0].clone().into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn call_without_arguments_reports_missing_command() {
        let responses = serve(vec![request(
            1,
            "tools/call",
            Some(json!({ "name": "bash" })),
        )])
        .await;
        let result = responses[0].clone().into_result().unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "no command provided");
    }

    #[tokio::test]
    async fn call_runs_command_and_returns_text() {
        let responses = serve(vec![request(
            1,
            "tools/call",
            Some(json!({ "name": "bash", "arguments": { "command": "echo hello" } })),
        )])
        .await;
        let result = responses[0].clone().into_result().unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let responses = serve(vec![JsonRpcMessage::Notification(
            crate::protocol::JsonRpcNotification::new("notifications/initialized"),
        )])
        .await;
        assert!(responses.is_empty());
    }
}
