//! OpIndex CLI: crawl a ledger node for OP_RETURN payloads and manage the index.
//!
//! # Commands
//! ```text
//! opindex errored
//! opindex last-indexed
//! opindex reindex-errored
//! opindex monitor   [START]
//! opindex index     START [END]
//! opindex serve     [--monitor] [--port <PORT>]
//! opindex node-info
//! opindex migrate
//! opindex rpc       METHOD [PARAMS...]
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use opindex_core::{BlockFetcher, BlockRange, CrawlController, CrawlerBuilder, RecordStore};
use opindex_rpc::HttpNodeClient;
use opindex_storage::open_store;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod logging;
mod server;
mod settings;

use settings::Settings;

#[derive(Parser)]
#[command(
    name = "opindex",
    about = "OpIndex: OP_RETURN payload indexer",
    long_about = "
OpIndex crawls a ledger node over JSON-RPC, extracts the data pushed by
OP_RETURN outputs and stores it for lookup by payload.

Settings are read from --config, or ./opindex.toml when present.
RUST_LOG overrides the configured log level.
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List blocks whose indexing is not confirmed complete
    Errored,

    /// Print the highest fully indexed block height
    #[command(name = "last-indexed")]
    LastIndexed,

    /// Re-attempt every errored block
    #[command(name = "reindex-errored")]
    ReindexErrored,

    /// Follow the chain tip until interrupted
    Monitor {
        /// Height to start the first pass from (default: resume point)
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        start: Option<u64>,
    },

    /// Index an inclusive range of block heights
    Index {
        /// First height
        start: String,
        /// Last height (default: START)
        end: Option<String>,
    },

    /// Serve payload lookups over HTTP
    Serve {
        /// Also run the monitor loop in this process
        #[arg(long)]
        monitor: bool,
        /// Listen port (overrides the settings file)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show the node's chain height and sync state
    #[command(name = "node-info")]
    NodeInfo,

    /// Create the database tables
    Migrate,

    /// Send a raw JSON-RPC call to the node
    Rpc {
        /// RPC method, e.g. getblockhash
        method: String,
        /// Parameters; each is parsed as JSON, falling back to a string
        params: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    logging::init_tracing(&settings.log, cli.verbose);

    match cli.command {
        Commands::Errored => cmd_errored(&settings).await,
        Commands::LastIndexed => cmd_last_indexed(&settings).await,
        Commands::ReindexErrored => cmd_reindex_errored(&settings).await,
        Commands::Monitor { start } => cmd_monitor(&settings, start).await,
        Commands::Index { start, end } => cmd_index(&settings, &start, end.as_deref()).await,
        Commands::Serve { monitor, port } => cmd_serve(&settings, monitor, port).await,
        Commands::NodeInfo => cmd_node_info(&settings).await,
        Commands::Migrate => cmd_migrate(&settings).await,
        Commands::Rpc { method, params } => cmd_rpc(&settings, &method, &params).await,
    }
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

fn node_client(settings: &Settings) -> Result<Arc<HttpNodeClient>> {
    let client = HttpNodeClient::from_config(&settings.node).context("invalid [node] settings")?;
    Ok(Arc::new(client))
}

async fn store(settings: &Settings) -> Result<Arc<dyn RecordStore>> {
    open_store(&settings.store)
        .await
        .context("cannot open record store")
}

fn controller(settings: &Settings, store: Arc<dyn RecordStore>) -> Result<CrawlController> {
    Ok(CrawlerBuilder::new()
        .config(settings.index.clone())
        .node(node_client(settings)?)
        .store(store)
        .build()?)
}

/// Cancelled on ctrl-c.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Cannot listen for ctrl-c"),
        }
        trigger.cancel();
    });
    token
}

// ─── Command implementations ─────────────────────────────────────────────────

async fn cmd_errored(settings: &Settings) -> Result<()> {
    let marks = store(settings).await?.list_errored().await?;
    if marks.is_empty() {
        println!("There are no errored blocks.");
        return Ok(());
    }
    for (i, mark) in marks.iter().enumerate() {
        println!(
            "{}. Block height: {} timestamp: {}",
            i + 1,
            mark.block_height,
            mark.timestamp.to_rfc3339()
        );
    }
    Ok(())
}

async fn cmd_last_indexed(settings: &Settings) -> Result<()> {
    let height = store(settings)
        .await?
        .last_indexed_height()
        .await?
        .unwrap_or_else(|| settings.index.fallback_indexed_height());
    println!("{height}");
    Ok(())
}

async fn cmd_reindex_errored(settings: &Settings) -> Result<()> {
    let ctl = controller(settings, store(settings).await?)?;
    let report = ctl.index_errored_blocks().await?;
    println!(
        "Re-indexed {} errored block(s), {} record(s).",
        report.indexed(),
        report.total_records()
    );
    Ok(())
}

async fn cmd_monitor(settings: &Settings, start: Option<u64>) -> Result<()> {
    let ctl = controller(settings, store(settings).await?)?;
    ctl.run_monitor(start, shutdown_on_ctrl_c()).await;
    Ok(())
}

async fn cmd_index(settings: &Settings, start: &str, end: Option<&str>) -> Result<()> {
    let range = BlockRange::parse(start, end)?;
    let ctl = controller(settings, store(settings).await?)?;
    let report = ctl.index_range(range).await?;

    println!(
        "Indexed {}/{} block(s) in {range}, {} record(s).",
        report.indexed(),
        range.len(),
        report.total_records()
    );
    let failed = report.failed_heights();
    if !failed.is_empty() {
        warn!(heights = ?failed, "Blocks left for the errored sweep");
        println!("Left errored: {failed:?}");
    }
    Ok(())
}

async fn cmd_serve(settings: &Settings, monitor: bool, port: Option<u16>) -> Result<()> {
    let host = settings
        .server
        .host
        .parse()
        .with_context(|| format!("invalid [server] host '{}'", settings.server.host))?;
    let addr = SocketAddr::new(host, port.unwrap_or(settings.server.port));

    let store = store(settings).await?;
    let shutdown = shutdown_on_ctrl_c();

    let monitor_task = if monitor {
        let ctl = Arc::new(controller(settings, store.clone())?);
        Some(ctl.spawn_monitor(None, shutdown.clone()))
    } else {
        None
    };

    let served = server::serve(store, addr, shutdown.clone()).await;
    shutdown.cancel();
    if let Some(task) = monitor_task {
        task.await.context("monitor task panicked")?;
    }
    served
}

async fn cmd_node_info(settings: &Settings) -> Result<()> {
    let fetcher = BlockFetcher::new(node_client(settings)?);
    let info = fetcher.chain_info().await?;
    println!("Endpoint:      {}", settings.node.url());
    println!("Chain height:  {}", info.blocks);
    println!("Header height: {}", info.headers);
    println!(
        "Synced:        {}",
        if info.is_synced() { "yes" } else { "no (initial download in progress)" }
    );
    Ok(())
}

async fn cmd_migrate(settings: &Settings) -> Result<()> {
    // opening a store creates any missing tables
    store(settings).await?;
    println!("Schema ready ({} backend).", settings.store.backend);
    Ok(())
}

async fn cmd_rpc(settings: &Settings, method: &str, params: &[String]) -> Result<()> {
    let params = params.iter().map(|p| parse_param(p)).collect();
    let result = node_client(settings)?.request(method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_index_range() {
        let cli = Cli::try_parse_from(["opindex", "index", "100", "200"]).unwrap();
        match cli.command {
            Commands::Index { start, end } => {
                assert_eq!(start, "100");
                assert_eq!(end.as_deref(), Some("200"));
            }
            _ => panic!("expected index command"),
        }
    }

    #[test]
    fn monitor_start_must_be_positive() {
        assert!(Cli::try_parse_from(["opindex", "monitor", "0"]).is_err());
        let cli = Cli::try_parse_from(["opindex", "monitor", "42", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Monitor { start: Some(42) }));
    }

    #[test]
    fn serve_flags() {
        let cli = Cli::try_parse_from(["opindex", "serve", "--monitor", "--port", "8080"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve { monitor: true, port: Some(8080) }
        ));
    }

    #[test]
    fn rpc_params_parse_as_json_or_string() {
        assert_eq!(parse_param("600000"), json!(600000));
        assert_eq!(parse_param("true"), json!(true));
        assert_eq!(parse_param("00000000abc"), json!("00000000abc"));
        assert_eq!(parse_param("\"quoted\""), json!("quoted"));
    }
}
