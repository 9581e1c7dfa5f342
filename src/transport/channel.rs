//! In-memory channel transport.
//!
//! Wires protocol sessions inside one process; also the relay's test
//! harness. A closed or dropped peer surfaces as a clean end of stream on
//! the source side and as [`McpError::ConnectionClosed`] on the sink side.

use async_channel::{Receiver, Sender};

use super::traits::{MessageSink, MessageSource, Result, SourceItem};
use crate::protocol::{JsonRpcMessage, McpError};

/// Source backed by an [`async_channel::Receiver`].
#[derive(Debug)]
pub struct ChannelSource {
    receiver: Receiver<SourceItem>,
}

impl ChannelSource {
    /// Wrap a receiver of protocol items.
    #[must_use]
    pub const fn new(receiver: Receiver<SourceItem>) -> Self {
        Self { receiver }
    }
}

impl MessageSource for ChannelSource {
    async fn next(&mut self) -> Result<Option<SourceItem>> {
        Ok(self.receiver.recv().await.ok())
    }
}

/// Sink backed by an [`async_channel::Sender`].
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<JsonRpcMessage>,
}

impl ChannelSink {
    /// Wrap a sender of protocol messages.
    #[must_use]
    pub const fn new(sender: Sender<JsonRpcMessage>) -> Self {
        Self { sender }
    }
}

impl MessageSink for ChannelSink {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| McpError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.sender.close();
        Ok(())
    }
}
