//! # mcp-shell
//!
//! An MCP (Model Context Protocol) server that exposes a persistent
//! interactive shell to an automated agent, plus a proxy mode that relays an
//! entire protocol session to a remote execution backend.
//!
//! ## Overview
//!
//! Two problems make up the core of this crate, both about imposing
//! structure on unreliable streams:
//!
//! - [`session::ShellSession`] turns the unstructured byte stream of an OS
//!   shell into discrete, ordered command/response units using a sentinel
//!   echoed after every command, with timeout handling and crash
//!   self-healing layered on top.
//! - [`relay`] pumps a whole protocol session between two transports, one
//!   forwarding loop per direction, isolating per-message decode errors
//!   from transport-fatal failures.
//!
//! [`bash::BashTool`] is the thin façade binding a session to the protocol
//! layer, and [`server::McpServer`] is the dispatcher that exposes it.
//!
//! ## Serving over stdio
//!
//! ```ignore
//! let mut server = McpServer::stdio("mcp-shell", env!("CARGO_PKG_VERSION"))?;
//! futures_lite::future::block_on(server.run())?;
//! ```
//!
//! ## Proxying to a remote backend
//!
//! ```ignore
//! futures_lite::future::block_on(relay::run_proxy("tcp://10.0.0.5:9100"))?;
//! ```

pub mod bash;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod transport;

pub use bash::{BashArgs, BashTool, ToolError, ToolResult};
pub use protocol::McpError;
pub use relay::run_proxy;
pub use server::McpServer;
pub use session::{SessionError, ShellSession};
