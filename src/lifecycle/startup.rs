//! Startup orchestration.
//!
//! # Order
//! ```text
//! parse target URI → resolve peer → bind shared context → build request
//! ```
//!
//! Any failure here is fatal; nothing has been launched yet.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;

use crate::config::SwarmConfig;
use crate::transport::{CoapContext, CoapUri, Request, UriError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid target: {0}")]
    Target(#[from] UriError),

    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the swarm needs, ready to launch.
///
/// The swarm shares `context` between its probes by cloning the `Arc`.
pub struct Prepared {
    pub uri: CoapUri,
    pub context: Arc<CoapContext>,
    pub request: Request,
}

pub async fn prepare(config: &SwarmConfig) -> Result<Prepared, StartupError> {
    let uri = CoapUri::parse(&config.target.uri)?;
    let peer = uri.resolve().await?;

    let local = match &config.target.bind_address {
        Some(addr) => addr
            .parse::<SocketAddr>()
            .map_err(|_| StartupError::BindAddress(addr.clone()))?,
        None => unspecified_for(peer),
    };

    let context = CoapContext::bind(local)
        .await
        .map_err(|source| StartupError::Bind { addr: local, source })?;

    tracing::info!(
        uri = %uri,
        peer = %peer,
        local = %context.local_addr().unwrap_or(local),
        method = %config.target.method,
        "Request context ready"
    );

    let request = Request::new(config.target.method, &uri, peer);
    Ok(Prepared {
        uri,
        context: Arc::new(context),
        request,
    })
}

/// Wildcard local address matching the peer's address family.
fn unspecified_for(peer: SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}
