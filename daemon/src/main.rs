//! BURST peer transport daemon — entry point for running a standalone node.

use std::path::PathBuf;
use std::sync::Arc;

use burst_node::{LogFormat, NodeConfig, NodeMetrics, PeerTransportNode};
use burst_types::NetworkId;
use clap::Parser;

#[derive(Parser)]
#[command(name = "burst-daemon", about = "BURST peer transport node daemon")]
struct Cli {
    /// Network to connect to.
    #[arg(long, default_value = "dev")]
    network: String,

    /// Port for peer connections.
    #[arg(long)]
    port: Option<u16>,

    /// Path to this node's persistent identity key file.
    #[arg(long)]
    identity_key_path: Option<PathBuf>,

    /// Bootstrap peer addresses to dial on startup ("ip:port").
    #[arg(long)]
    bootstrap_peer: Vec<String>,

    /// Enable the Prometheus metrics registry.
    #[arg(long)]
    metrics: bool,

    /// Log format: "human" or "json".
    #[arg(long, default_value = "human")]
    log_format: String,

    /// Log level filter.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Subcommand.
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Start the node.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let network = match cli.network.as_str() {
        "live" => NetworkId::Live,
        "test" => NetworkId::Test,
        _ => NetworkId::Dev,
    };

    let log_format = if cli.log_format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Human
    };
    burst_node::init_logging(log_format, &cli.log_level);

    let config = NodeConfig {
        network,
        port: cli.port.unwrap_or(network.default_port()),
        identity_key_path: cli.identity_key_path,
        bootstrap_peers: cli.bootstrap_peer,
        enable_metrics: cli.metrics,
        log_format: cli.log_format,
        log_level: cli.log_level,
        ..Default::default()
    };

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Run => {
                tracing::info!(network = network.as_str(), port = config.port, "starting peer transport node");
                let metrics = Arc::new(NodeMetrics::new());
                let node = PeerTransportNode::new(config, metrics)?;
                node.run().await?;
            }
        },
    }

    Ok(())
}
