//! Bidirectional protocol relay.
//!
//! Pumps an entire protocol session between two transports, one forwarding
//! loop per direction. The loops are independent in flow but share one
//! logical session: the first fatal error in either direction cancels the
//! other, and both destinations end up closed. Message order within a
//! direction is preserved exactly; nothing is guaranteed across directions.

use futures_lite::future;
use tracing::{debug, info, warn};

use crate::protocol::McpError;
use crate::transport::{MessageSink, MessageSource, StdioTransport, TcpTransport};

/// Direction label for the client-to-server loop.
pub const CLIENT_TO_SERVER: &str = "client -> server";

/// Direction label for the server-to-client loop.
pub const SERVER_TO_CLIENT: &str = "server -> client";

/// Forward items from `source` to `sink` until the source ends, then close
/// the sink.
///
/// A malformed frame is logged with its direction and skipped; it never
/// closes the stream. Fatal source errors and sink failures are returned.
///
/// # Errors
///
/// Returns the first transport-fatal error from either end.
pub async fn forward<S, D>(mut source: S, mut sink: D, direction: &str) -> Result<(), McpError>
where
    S: MessageSource,
    D: MessageSink,
{
    loop {
        match source.next().await? {
            Some(Ok(message)) => {
                debug!(direction, ?message, "forwarding message");
                sink.send(message).await?;
            }
            Some(Err(err)) => {
                warn!(direction, error = %err, "skipping malformed message");
            }
            None => {
                debug!(direction, "source exhausted");
                break;
            }
        }
    }
    sink.close().await
}

/// Relay a whole session between two endpoints.
///
/// `source_a`/`dest_a` are the two halves of endpoint A, likewise for B;
/// items read from A are written to B and vice versa. Runs both directions
/// concurrently and returns when both sources are exhausted, or with the
/// first fatal error - at which point the other direction is cancelled and
/// its destination is closed by drop.
///
/// # Errors
///
/// Returns the first transport-fatal error from either direction.
pub async fn relay<SA, DB, SB, DA>(
    source_a: SA,
    dest_b: DB,
    source_b: SB,
    dest_a: DA,
) -> Result<(), McpError>
where
    SA: MessageSource,
    DB: MessageSink,
    SB: MessageSource,
    DA: MessageSink,
{
    future::try_zip(
        forward(source_a, dest_b, CLIENT_TO_SERVER),
        forward(source_b, dest_a, SERVER_TO_CLIENT),
    )
    .await?;
    Ok(())
}

/// Proxy mode: relay the local stdio session to a remote backend.
///
/// # Errors
///
/// Returns an error if the remote connection cannot be established or the
/// relay ends with a transport-fatal failure.
pub async fn run_proxy(remote_url: &str) -> Result<(), McpError> {
    info!(url = remote_url, "proxying session to remote backend");

    let remote = TcpTransport::connect(remote_url).await?;
    let local = StdioTransport::new()?;

    let (local_source, local_sink) = local.into_split();
    let (remote_source, remote_sink) = remote.into_split();

    relay(local_source, remote_sink, remote_source, local_sink).await
}
