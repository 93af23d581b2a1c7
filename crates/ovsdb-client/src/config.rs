//! Client configuration
//!
//! Environment overrides, on top of the transport's own:
//!
//! - `OVSDB_SOCKET`: path of the server's unix socket
//! - `OVSDB_MAP_MIN_DEFAULT`: `1` (RFC 7047) or `0` for map columns that
//!   omit `min`

use std::path::{Path, PathBuf};

use ovsdb_jsonrpc::TransportConfig;
use tracing::warn;

use crate::schema::{MapMinDefault, ParseOptions};

/// Where Open vSwitch puts its database socket, most common first
pub const SOCKET_CANDIDATES: [&str; 2] = ["/var/run/openvswitch/db.sock", "/run/openvswitch/db.sock"];

/// Configuration for an `OvsdbClient`
#[derive(Debug, Clone)]
pub struct OvsdbClientConfig {
    pub socket_path: PathBuf,
    pub transport: TransportConfig,
    pub parse_options: ParseOptions,
}

impl Default for OvsdbClientConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            transport: TransportConfig::default(),
            parse_options: ParseOptions::default(),
        }
    }
}

impl OvsdbClientConfig {
    /// Defaults overridden by `OVSDB_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self {
            transport: TransportConfig::from_env(),
            ..Self::default()
        };

        if let Ok(path) = std::env::var("OVSDB_SOCKET") {
            config.socket_path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var("OVSDB_MAP_MIN_DEFAULT") {
            match raw.parse::<MapMinDefault>() {
                Ok(default) => config.parse_options.map_min_default = default,
                Err(e) => warn!("Ignoring OVSDB_MAP_MIN_DEFAULT: {}", e),
            }
        }

        config
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_map_min_default(mut self, default: MapMinDefault) -> Self {
        self.parse_options.map_min_default = default;
        self
    }
}

/// First candidate socket that exists, else the conventional path
pub fn default_socket_path() -> PathBuf {
    SOCKET_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .unwrap_or_else(|| Path::new(SOCKET_CANDIDATES[0]))
        .to_path_buf()
}
