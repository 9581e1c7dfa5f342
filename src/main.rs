//! mcp-shell server binary.
//!
//! Serves MCP over stdio by default. With `--proxy <URL>` the local stdio
//! session is relayed verbatim to a remote backend instead of being handled
//! here.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcp_shell::relay::run_proxy;
use mcp_shell::server::McpServer;

#[derive(Debug, Parser)]
#[command(
    name = "mcp-shell",
    version,
    about = "MCP server exposing a persistent interactive shell"
)]
struct Cli {
    /// Relay the whole session to a remote backend instead of serving
    /// locally, e.g. `tcp://10.0.0.5:9100`.
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,
}

fn main() -> Result<()> {
    // Stdout carries the protocol; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    futures_lite::future::block_on(async {
        match cli.proxy {
            Some(url) => run_proxy(&url).await?,
            None => {
                let mut server = McpServer::stdio("mcp-shell", env!("CARGO_PKG_VERSION"))?;
                server.run().await?;
            }
        }
        Ok(())
    })
}
