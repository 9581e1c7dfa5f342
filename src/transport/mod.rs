//! Message transports.
//!
//! Every transport speaks newline-delimited JSON. The server side uses an
//! unsplit transport ([`ServerTransport`]); the relay works on split halves
//! ([`MessageSource`] / [`MessageSink`]) so the two directions can be pumped
//! independently.

mod channel;
mod stdio;
mod tcp;
mod traits;

pub use channel::{ChannelSource, ChannelSink};
pub use stdio::{StdioSink, StdioSource, StdioTransport};
pub use tcp::{TcpSink, TcpSource, TcpTransport};
pub use traits::{MessageSink, MessageSource, Result, ServerTransport, SourceItem};

use futures_lite::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::protocol::{JsonRpcMessage, McpError};

/// Read the next frame: one non-empty line, decoded as a message.
///
/// A malformed line comes back as `Ok(Some(Err(_)))` so callers can decide
/// whether to skip it; only IO failures are fatal.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Option<SourceItem>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => return Ok(None),
            Ok(_) => {
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                debug!("RX: {frame}");
                return Ok(Some(serde_json::from_str(frame)));
            }
            Err(err) => return Err(McpError::Io(err)),
        }
    }
}

/// Write one frame: the message as JSON followed by a newline, flushed.
pub(crate) async fn write_frame<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)?;
    debug!("TX: {json}");
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
