use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{self, Duration};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use trackerless::constants::{DEFAULT_BOOTSTRAP_ROUTER, DEFAULT_PORT, USER_AGENT};
use trackerless::{DhtConfig, DhtEngine, InfoHash, NodeId};

/// A node given on the command line as `ID@IP:PORT`.
#[derive(Clone, Debug)]
struct NodeHint {
    id: NodeId,
    addr: SocketAddr,
}

impl FromStr for NodeHint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (id_part, addr_part) = s
            .split_once('@')
            .context("node must be given as ID@IP:PORT")?;

        let id = id_part
            .parse()
            .context("node id must be 40 hex characters")?;
        let addr = addr_part.parse().context("invalid socket address")?;

        Ok(NodeHint { id, addr })
    }
}

#[derive(Parser, Debug)]
#[command(name = "trackerless")]
#[command(author, version, about = "Find BitTorrent peers through the DHT", long_about = None)]
struct Args {
    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Our node id as 40 hex characters (random if omitted)
    #[arg(long)]
    node_id: Option<NodeId>,

    /// Bootstrap router pinged on startup
    #[arg(short, long, default_value = DEFAULT_BOOTSTRAP_ROUTER)]
    router: String,

    /// Skip the bootstrap ping
    #[arg(long)]
    no_bootstrap: bool,

    /// Nodes asked per discovery round
    #[arg(long)]
    fan_out: Option<usize>,

    /// Keep expanding the search until this many peers are known
    #[arg(long)]
    min_peers: Option<usize>,

    /// Info hash to search for (repeatable)
    #[arg(short = 'i', long = "info-hash", value_name = "HASH")]
    info_hashes: Vec<InfoHash>,

    /// Known DHT node as ID@IP:PORT (repeatable)
    #[arg(short = 'n', long = "node", value_name = "NODE")]
    nodes: Vec<NodeHint>,

    /// Seconds between stats reports and repeated peer requests
    #[arg(short, long, default_value = "60")]
    stats_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    info!("{} starting", USER_AGENT);

    let node_id = args.node_id.unwrap_or_else(NodeId::generate);
    let router = (!args.no_bootstrap).then(|| args.router.clone());

    let mut config = DhtConfig::new(node_id, args.port).with_bootstrap_router(router);
    if let Some(fan_out) = args.fan_out {
        config = config.with_fan_out(fan_out);
    }
    if let Some(min_peers) = args.min_peers {
        config = config.with_min_info_hash_peers(min_peers);
    }

    let (engine, handle, mut results) = DhtEngine::bind(config)
        .await
        .with_context(|| format!("failed to bind DHT port {}", args.port))?;
    info!("Node id: {}", handle.our_id());
    info!("Listening on {}", handle.local_addr());

    let engine_task = tokio::spawn(engine.run());

    for node in &args.nodes {
        handle
            .add_node(node.id, node.addr)
            .await
            .context("DHT engine stopped")?;
    }

    for info_hash in &args.info_hashes {
        info!("Searching peers for {}", info_hash);
        handle
            .request_peers(*info_hash)
            .await
            .context("DHT engine stopped")?;
    }

    let mut interval = time::interval(Duration::from_secs(args.stats_interval.max(1)));
    interval.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, exiting gracefully");
                break;
            }
            batch = results.recv() => {
                let Some(batch) = batch else {
                    warn!("DHT engine stopped");
                    break;
                };
                for (info_hash, peers) in batch {
                    for peer in &peers {
                        info!(%info_hash, %peer, "peer found");
                    }
                }
            }
            _ = interval.tick() => {
                let stats = handle.stats();
                info!(
                    nodes = stats.nodes_created,
                    duplicate_nodes = stats.duplicate_nodes,
                    peers = stats.peers_found,
                    get_peers_sent = stats.get_peers_sent,
                    pings_sent = stats.pings_sent,
                    responses = stats.responses_matched,
                    stale = stats.stale_responses,
                    "dht stats"
                );
                for info_hash in &args.info_hashes {
                    if let Err(e) = handle.request_peers(*info_hash).await {
                        warn!(error = %e, "Peer request failed");
                    }
                }
            }
        }
    }

    drop(handle);
    drop(results);
    engine_task.await.context("DHT engine task failed")?;
    Ok(())
}
