//! Naming server daemon.
//!
//! Usage:
//!   naming-server [OPTIONS]
//!
//! Serves the client Service interface and the storage Registration
//! interface until interrupted with Ctrl-C.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use dfs_naming::{NamingNode, NamingServer, NoReplication, ReadThreshold, ReplicationPolicy};
use dfs_proto::constants::{REGISTRATION_PORT, SERVICE_PORT};

/// Distributed file system naming server
#[derive(Parser, Debug)]
#[command(name = "naming-server", version, about = "Distributed file system naming server")]
struct Args {
    /// Listen address
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    bind_addr: String,

    /// Client service port
    #[arg(long, default_value_t = SERVICE_PORT)]
    service_port: u16,

    /// Storage server registration port
    #[arg(long, default_value_t = REGISTRATION_PORT)]
    registration_port: u16,

    /// Replicate a file every N shared locks (0 to disable)
    #[arg(long, default_value_t = 0)]
    replicate_every: u64,

    /// Maximum number of storage servers hosting one file
    #[arg(long, default_value_t = 3)]
    max_replicas: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("naming-server v{} starting", env!("CARGO_PKG_VERSION"));

    let bind_addr: IpAddr = args.bind_addr.parse().unwrap_or_else(|_| {
        warn!("invalid bind address {:?}, using 0.0.0.0", args.bind_addr);
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    });

    let policy: Arc<dyn ReplicationPolicy> = if args.replicate_every == 0 {
        Arc::new(NoReplication)
    } else {
        info!(
            "replicating every {} reads, up to {} replicas",
            args.replicate_every, args.max_replicas
        );
        Arc::new(ReadThreshold {
            every: args.replicate_every,
            max_replicas: args.max_replicas,
        })
    };

    let node = NamingNode::bind(
        Arc::new(NamingServer::with_policy(policy)),
        bind_addr,
        args.service_port,
        args.registration_port,
    );
    if let Err(e) = node.start().await {
        error!("failed to start naming server: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to wait for shutdown signal: {}", e);
    }
    info!("shutting down");
    node.stop().await;
}
