//! `[bridge]` section configuration.
//!
//! Where the WebSocket endpoint for the embedding frame listens.
//!
//! # Example
//!
//! ```toml
//! [bridge]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 0                    # 0 picks a free port
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub interface: IpAddr,
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
        }
    }
}

impl BridgeConfig {
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.interface, self.port)
    }
}
