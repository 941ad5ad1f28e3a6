//! Storage server daemon.
//!
//! Usage:
//!   storage-server [OPTIONS] <ROOT>
//!
//! Serves the files below ROOT, registers them with the naming server, and
//! runs until interrupted with Ctrl-C.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use dfs_api::RegistrationStub;
use dfs_proto::constants::REGISTRATION_PORT;
use dfs_rmi::{RemoteAddr, Stub};
use dfs_storage::{StorageNode, StorageServer};

/// Distributed file system storage server
#[derive(Parser, Debug)]
#[command(name = "storage-server", version, about = "Distributed file system storage server")]
struct Args {
    /// Local directory holding the served files
    #[arg(value_name = "ROOT")]
    root: PathBuf,

    /// Naming server host
    #[arg(short = 'n', long, default_value = "127.0.0.1")]
    naming_host: String,

    /// Naming server registration port
    #[arg(long, default_value_t = REGISTRATION_PORT)]
    registration_port: u16,

    /// Host name under which clients and peers reach this server
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Listen address
    #[arg(short = 'b', long, default_value = "0.0.0.0")]
    bind_addr: String,

    /// Client (Storage interface) port, 0 to let the system choose
    #[arg(long, default_value_t = 0)]
    client_port: u16,

    /// Command interface port, 0 to let the system choose
    #[arg(long, default_value_t = 0)]
    command_port: u16,

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

    info!("storage-server v{} starting", env!("CARGO_PKG_VERSION"));

    let bind_addr: IpAddr = args.bind_addr.parse().unwrap_or_else(|_| {
        warn!("invalid bind address {:?}, using 0.0.0.0", args.bind_addr);
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    });

    if let Err(e) = tokio::fs::create_dir_all(&args.root).await {
        error!("failed to create root directory {}: {}", args.root.display(), e);
        std::process::exit(1);
    }

    let node = StorageNode::bind(
        Arc::new(StorageServer::new(args.root.clone())),
        bind_addr,
        args.client_port,
        args.command_port,
    );
    let naming: RegistrationStub =
        Stub::new(RemoteAddr::new(args.naming_host.clone(), args.registration_port));
    if let Err(e) = node.start(&args.hostname, &naming).await {
        error!("failed to start storage server: {}", e);
        std::process::exit(1);
    }
    info!(
        "serving {} (client {:?}, command {:?})",
        args.root.display(),
        node.client_addr(),
        node.command_addr()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to wait for shutdown signal: {}", e);
    }
    info!("shutting down");
    node.stop().await;
}
