use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live connections, owned for the lifetime of the server
    pub registry: Arc<ConnectionRegistry>,
    /// Silence after which a connection is closed (None = never)
    pub idle_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new(config.duplicate_policy)),
            idle_timeout: config.idle_timeout,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(&ServerConfig::default())
    }
}
