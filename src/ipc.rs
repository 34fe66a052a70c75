//! IPC Connection Module
//!
//! Handles connection to a blockchain node via Unix IPC socket so the monitor
//! can follow new blocks. Reconnects with exponential backoff when the node
//! goes away.

use std::path::Path;
use std::time::Duration;

use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::pubsub::PubSubFrontend;
use alloy::transports::ipc::IpcConnect;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Default IPC socket paths to try
pub const DEFAULT_IPC_PATHS: &[&str] = &[
    "/var/run/geth.ipc",
    "~/.ethereum/geth.ipc",
    "/tmp/anvil.ipc",
    "~/.foundry/anvil.ipc",
];

/// Maximum number of reconnection attempts before giving up
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Initial backoff delay for reconnection
pub const INITIAL_BACKOFF_MS: u64 = 100;

/// Maximum backoff delay for reconnection
pub const MAX_BACKOFF_MS: u64 = 30000;

/// Errors that can occur during IPC operations
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IPC socket not found at path: {0}")]
    SocketNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Max reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),

    #[error("Invalid IPC path: {0}")]
    InvalidPath(String),
}

/// Configuration for IPC connection
#[derive(Debug, Clone)]
pub struct IpcConfig {
    /// Path to the IPC socket
    pub socket_path: String,
    /// Maximum reconnection attempts
    pub max_reconnect_attempts: u32,
    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_IPC_PATHS[0].to_string(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }
}

impl IpcConfig {
    /// Create a new config with the specified socket path
    pub fn with_path(socket_path: impl Into<String>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    /// Calculate backoff delay for a given attempt number
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_backoff_ms * 2u64.pow(attempt.min(10));
        Duration::from_millis(delay_ms.min(self.max_backoff_ms))
    }
}

/// Check if an IPC socket exists at the given path
pub fn socket_exists(path: &str) -> bool {
    let expanded = expand_path(path);
    Path::new(&expanded).exists()
}

/// Expand ~ to home directory in path
pub fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// Find the first available IPC socket from default paths
pub fn find_ipc_socket() -> Option<String> {
    for path in DEFAULT_IPC_PATHS {
        if socket_exists(path) {
            return Some(expand_path(path));
        }
    }
    None
}

/// Validate that a path looks like a valid IPC socket path
pub fn validate_ipc_path(path: &str) -> Result<(), IpcError> {
    if path.is_empty() {
        return Err(IpcError::InvalidPath("Path cannot be empty".to_string()));
    }

    let expanded = expand_path(path);
    if !expanded.ends_with(".ipc") && !expanded.contains("geth") && !expanded.contains("anvil") {
        warn!("IPC path '{}' may not be a valid socket path", path);
    }

    Ok(())
}

/// Node connection manager with reconnection support
pub struct NodeConnection {
    config: IpcConfig,
    reconnect_attempts: u32,
}

impl NodeConnection {
    /// Create a new node connection manager
    pub fn new(config: IpcConfig) -> Self {
        Self {
            config,
            reconnect_attempts: 0,
        }
    }

    /// Create with default configuration
    pub fn with_default_config() -> Self {
        Self::new(IpcConfig::default())
    }

    /// Create with a specific socket path
    pub fn with_path(socket_path: impl Into<String>) -> Self {
        Self::new(IpcConfig::with_path(socket_path))
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &str {
        &self.config.socket_path
    }

    /// Check if the socket exists
    pub fn socket_exists(&self) -> bool {
        socket_exists(&self.config.socket_path)
    }

    /// Reset reconnection counter
    pub fn reset_reconnect_counter(&mut self) {
        self.reconnect_attempts = 0;
    }

    /// Get current reconnection attempt count
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Calculate delay before next reconnection attempt
    pub fn next_backoff_delay(&self) -> Duration {
        self.config.backoff_delay(self.reconnect_attempts)
    }

    /// Attempt to connect to the IPC socket
    ///
    /// Returns a pub/sub provider ready for block subscriptions
    pub async fn connect(&mut self) -> Result<RootProvider<PubSubFrontend>, IpcError> {
        let expanded_path = expand_path(&self.config.socket_path);

        if !Path::new(&expanded_path).exists() {
            return Err(IpcError::SocketNotFound(expanded_path));
        }

        info!("Connecting to node IPC socket at {}", expanded_path);

        let ipc: IpcConnect<String> = IpcConnect::new(expanded_path);
        let provider = ProviderBuilder::new()
            .on_ipc(ipc)
            .await
            .map_err(|e| IpcError::ConnectionFailed(e.to_string()))?;

        self.reset_reconnect_counter();
        info!("Connected to node");

        Ok(provider)
    }

    /// Attempt to reconnect with exponential backoff
    ///
    /// Returns a provider if successful, or an error if max attempts exceeded
    pub async fn reconnect(&mut self) -> Result<RootProvider<PubSubFrontend>, IpcError> {
        while self.reconnect_attempts < self.config.max_reconnect_attempts {
            let delay = self.next_backoff_delay();
            warn!(
                "Attempting to reconnect (attempt {}/{}), waiting {:?}",
                self.reconnect_attempts + 1,
                self.config.max_reconnect_attempts,
                delay
            );

            sleep(delay).await;
            self.reconnect_attempts += 1;

            match self.connect().await {
                Ok(provider) => return Ok(provider),
                Err(e) => {
                    error!(
                        "Reconnection attempt {} failed: {}",
                        self.reconnect_attempts, e
                    );
                }
            }
        }

        Err(IpcError::MaxReconnectAttemptsExceeded(
            self.config.max_reconnect_attempts,
        ))
    }
}
