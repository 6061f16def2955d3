//! HTTP server configuration object.

use std::net::SocketAddr;

use crate::inbound::http::spa::SpaAssets;

/// Builder-style configuration for creating the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) assets: SpaAssets,
}

impl ServerConfig {
    /// Serve on `bind_addr` with the SPA fallback disabled.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            assets: SpaAssets::disabled(),
        }
    }

    /// Serve the single-page app from `assets` for non-API paths.
    #[must_use]
    pub fn with_assets(mut self, assets: SpaAssets) -> Self {
        self.assets = assets;
        self
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}
