//! TCP transport to a remote protocol backend.
//!
//! The remote end is an opaque execution backend reachable by URL; it speaks
//! the same newline-delimited JSON framing as the stdio transport. Nothing
//! here inspects message payloads.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use async_io::Async;
use futures_lite::io::{self as aio, BufReader, ReadHalf, WriteHalf};
use tracing::debug;
use url::Url;

use super::traits::{MessageSink, MessageSource, Result, SourceItem};
use super::{read_frame, write_frame};
use crate::protocol::{JsonRpcMessage, McpError};

/// Transport over a TCP connection to a remote backend.
pub struct TcpTransport {
    stream: Async<TcpStream>,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport").finish_non_exhaustive()
    }
}

impl TcpTransport {
    /// Connect to `tcp://host:port` (a bare `host:port` also works).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or resolved, or the
    /// connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let addr = resolve(url)?;
        debug!(%addr, "connecting to remote backend");
        let stream = Async::<TcpStream>::connect(addr).await?;
        Ok(Self { stream })
    }

    /// Split into relay halves.
    #[must_use]
    pub fn into_split(self) -> (TcpSource, TcpSink) {
        let (reader, writer) = aio::split(self.stream);
        (
            TcpSource {
                reader: BufReader::new(reader),
            },
            TcpSink { writer },
        )
    }
}

/// Readable half of [`TcpTransport`].
pub struct TcpSource {
    reader: BufReader<ReadHalf<Async<TcpStream>>>,
}

impl std::fmt::Debug for TcpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSource").finish_non_exhaustive()
    }
}

impl MessageSource for TcpSource {
    async fn next(&mut self) -> Result<Option<SourceItem>> {
        read_frame(&mut self.reader).await
    }
}

/// Writable half of [`TcpTransport`].
pub struct TcpSink {
    writer: WriteHalf<Async<TcpStream>>,
}

impl std::fmt::Debug for TcpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSink").finish_non_exhaustive()
    }
}

impl MessageSink for TcpSink {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        write_frame(&mut self.writer, &message).await
    }

    async fn close(&mut self) -> Result<()> {
        use futures_lite::io::AsyncWriteExt;
        self.writer.close().await.map_err(McpError::Io)
    }
}

/// Turn a backend URL into a socket address.
fn resolve(url: &str) -> Result<SocketAddr> {
    let parsed = if url.contains("://") {
        Url::parse(url)?
    } else {
        Url::parse(&format!("tcp://{url}"))?
    };

    let host = parsed
        .host_str()
        .ok_or_else(|| McpError::Transport(format!("backend url has no host: {url}")))?;
    let port = parsed
        .port()
        .ok_or_else(|| McpError::Transport(format!("backend url has no port: {url}")))?;

    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| McpError::Transport(format!("backend url did not resolve: {url}")))
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use futures_lite::future;
    use futures_lite::io::AsyncWriteExt;

    use super::*;
    use crate::protocol::JsonRpcNotification;

    #[test]
    fn resolve_accepts_bare_and_scheme_urls() {
        assert!(resolve("127.0.0.1:4000").is_ok());
        assert!(resolve("tcp://127.0.0.1:4000").is_ok());
        assert!(resolve("127.0.0.1").is_err());
        assert!(resolve("not a url at all").is_err());
    }

    #[tokio::test]
    async fn malformed_frame_is_isolated_from_later_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let listener = Async::new(listener).unwrap();

        let server = async {
            let (mut peer, _) = listener.accept().await.unwrap();
            peer.write_all(b"this is not json\n").await.unwrap();
            peer.write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\n")
                .await
                .unwrap();
            peer.flush().await.unwrap();
            peer
        };
        let url = format!("tcp://{addr}");
        let client = TcpTransport::connect(&url);
        let (_peer, transport) = future::zip(server, client).await;
        let transport = transport.unwrap();
        let (mut source, _sink) = transport.into_split();

        let first = source.next().await.unwrap().unwrap();
        assert!(first.is_err());

        let second = source.next().await.unwrap().unwrap().unwrap();
        assert!(matches!(
            second,
            JsonRpcMessage::Notification(JsonRpcNotification { ref method, .. })
                if method == "ping"
        ));
    }
}
