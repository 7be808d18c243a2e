//! API gateway configuration.
//!
//! This only configures the HTTP listen address; everything else (mining,
//! auth, rate limits, persistence) comes from `ledger::NodeConfig`.

use std::net::SocketAddr;

/// Configuration for the API gateway HTTP server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        // Bind to all interfaces so a container port mapping is reachable
        // from the host.
        let addr: SocketAddr = "0.0.0.0:8080"
            .parse()
            .expect("hard-coded API listen address should parse");
        Self { listen_addr: addr }
    }
}

impl ApiConfig {
    /// Reads `PORT` from the environment, keeping the default otherwise.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(port) = std::env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok()) {
            cfg.listen_addr.set_port(port);
        }
        cfg
    }
}
