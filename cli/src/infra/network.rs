//! Network infrastructure: port probing and HTTP health checks.

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::{HealthProbe, PortProbe};
use crate::domain::error::TimeoutError;

/// Binds `127.0.0.1:<port>` and releases it immediately.
pub struct TcpPortProbe;

impl PortProbe for TcpPortProbe {
    fn is_free(&self, port: u16) -> bool {
        TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).is_ok()
    }
}

/// Health probe using a blocking `ureq` GET on `spawn_blocking`.
pub struct UreqHealthProbe;

impl HealthProbe for UreqHealthProbe {
    async fn get_status(&self, url: &str, timeout: Duration) -> Result<u16> {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            let agent = ureq::AgentBuilder::new().timeout(timeout).build();
            match agent.get(&url).call() {
                Ok(resp) => Ok(resp.status()),
                Err(ureq::Error::Status(code, _)) => Ok(code),
                Err(ureq::Error::Transport(t)) => {
                    let reason = t.to_string();
                    if reason.to_ascii_lowercase().contains("timed out") {
                        Err(TimeoutError {
                            operation: format!("GET {url}"),
                            limit: timeout,
                        }
                        .into())
                    } else {
                        Err(anyhow::anyhow!(reason))
                    }
                }
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking panicked: {e}"))?
    }
}
