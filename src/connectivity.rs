//! Point-in-time connectivity check consulted before each load.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Whether a network path to the remote is usable right now.
    async fn is_available(&self) -> bool;
}

/// Treats a successful TCP handshake with `addr` as connectivity.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_available(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(addr = %self.addr, error = %e, "Connectivity probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(
                    addr = %self.addr,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Connectivity probe timed out"
                );
                false
            }
        }
    }
}

/// Fixed answer, used for `--offline`.
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity(pub bool);

#[async_trait]
impl Connectivity for StaticConnectivity {
    async fn is_available(&self) -> bool {
        self.0
    }
}
