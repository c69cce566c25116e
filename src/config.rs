//! Server configuration loaded from environment variables

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::registry::DuplicatePolicy;

pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind (CHAT_HOST)
    pub host: String,
    /// TCP port (CHAT_PORT)
    pub port: u16,
    /// What to do when a username is claimed twice (CHAT_DUPLICATE_USERNAMES)
    pub duplicate_policy: DuplicatePolicy,
    /// Close connections that stay silent this long (CHAT_IDLE_TIMEOUT_SECS, 0 = never)
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            duplicate_policy: DuplicatePolicy::default(),
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("CHAT_HOST")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.host);

        let port = std::env::var("CHAT_PORT")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.port);

        let duplicate_policy = match std::env::var("CHAT_DUPLICATE_USERNAMES") {
            Ok(v) => DuplicatePolicy::parse(&v).unwrap_or_else(|| {
                tracing::warn!(
                    value = %v,
                    "Unknown CHAT_DUPLICATE_USERNAMES value, expected 'replace' or 'reject'"
                );
                defaults.duplicate_policy
            }),
            Err(_) => defaults.duplicate_policy,
        };

        let idle_timeout = std::env::var("CHAT_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        tracing::info!(
            host = %host,
            port,
            duplicate_policy = ?duplicate_policy,
            idle_timeout = ?idle_timeout,
            "Server config loaded"
        );

        Self {
            host,
            port,
            duplicate_policy,
            idle_timeout,
        }
    }

    /// Socket address to listen on
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = self.host.parse::<IpAddr>().unwrap_or_else(|_| {
            tracing::warn!(host = %self.host, "Invalid CHAT_HOST, binding to 0.0.0.0");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });
        SocketAddr::new(ip, self.port)
    }
}
