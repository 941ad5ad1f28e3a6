//! Async TCP socket helpers and the host + port address type.

use std::fmt;
use std::net::SocketAddr;

use dfs_proto::RmiError;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

/// Network address of a remote endpoint: a host name or IP literal plus a
/// port. Resolution is deferred until a connection is made.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteAddr {
    pub host: String,
    pub port: u16,
}

impl RemoteAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl From<SocketAddr> for RemoteAddr {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for RemoteAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Resolve `addr` and connect to the first address that accepts.
pub async fn connect_to(addr: &RemoteAddr) -> Result<TcpStream, RmiError> {
    debug!("connecting to {}", addr);

    let candidates: Vec<SocketAddr> = tokio::net::lookup_host((addr.host.as_str(), addr.port))
        .await
        .map_err(|_| RmiError::Unresolved(addr.to_string()))?
        .collect();
    if candidates.is_empty() {
        return Err(RmiError::Unresolved(addr.to_string()));
    }

    let mut last_err = None;
    for candidate in candidates {
        match TcpStream::connect(candidate).await {
            Ok(stream) => {
                stream.set_nodelay(true).ok();
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(RmiError::Connect {
        addr: addr.to_string(),
        reason: last_err.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// Create a TCP listener on the given address.
pub async fn create_listen_socket(bind_addr: SocketAddr) -> Result<TcpListener, RmiError> {
    let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
        error!("failed to bind to {}: {}", bind_addr, e);
        RmiError::Bind {
            addr: bind_addr.to_string(),
            reason: e.to_string(),
        }
    })?;

    debug!("listening on {}", bind_addr);
    Ok(listener)
}
