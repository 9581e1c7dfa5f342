//! Standard IO transport.
//!
//! The standard way this server is reached: the parent process (the agent
//! host) talks newline-delimited JSON over our stdin/stdout. Logging must go
//! to stderr, never stdout.

use std::io::{Stdin, Stdout};

use async_io::Async;
use futures_lite::io::BufReader;
use tracing::warn;

use super::traits::{MessageSink, MessageSource, Result, ServerTransport, SourceItem};
use super::{read_frame, write_frame};
use crate::protocol::{JsonRpcMessage, JsonRpcResponse, McpError};

/// Transport over this process's stdin/stdout.
pub struct StdioTransport {
    stdin: BufReader<Async<Stdin>>,
    stdout: Async<Stdout>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport").finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Take over stdin/stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin/stdout cannot be registered with the
    /// reactor.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            stdin: BufReader::new(Async::new(std::io::stdin())?),
            stdout: Async::new(std::io::stdout())?,
        })
    }

    /// Split into relay halves.
    #[must_use]
    pub fn into_split(self) -> (StdioSource, StdioSink) {
        (
            StdioSource { stdin: self.stdin },
            StdioSink {
                stdout: self.stdout,
            },
        )
    }
}

impl ServerTransport for StdioTransport {
    async fn recv(&mut self) -> Result<Option<JsonRpcMessage>> {
        // Malformed frames are logged and skipped; the server keeps serving.
        loop {
            match read_frame(&mut self.stdin).await? {
                Some(Ok(message)) => return Ok(Some(message)),
                Some(Err(err)) => warn!(error = %err, "skipping malformed frame on stdin"),
                None => return Ok(None),
            }
        }
    }

    async fn respond(&mut self, response: JsonRpcResponse) -> Result<()> {
        write_frame(&mut self.stdout, &JsonRpcMessage::Response(response)).await
    }
}

/// Readable half of [`StdioTransport`].
pub struct StdioSource {
    stdin: BufReader<Async<Stdin>>,
}

impl std::fmt::Debug for StdioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioSource").finish_non_exhaustive()
    }
}

impl MessageSource for StdioSource {
    async fn next(&mut self) -> Result<Option<SourceItem>> {
        read_frame(&mut self.stdin).await
    }
}

/// Writable half of [`StdioTransport`].
pub struct StdioSink {
    stdout: Async<Stdout>,
}

impl std::fmt::Debug for StdioSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioSink").finish_non_exhaustive()
    }
}

impl MessageSink for StdioSink {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        write_frame(&mut self.stdout, &message).await
    }

    async fn close(&mut self) -> Result<()> {
        use futures_lite::io::AsyncWriteExt;
        self.stdout.flush().await.map_err(McpError::Io)
    }
}
