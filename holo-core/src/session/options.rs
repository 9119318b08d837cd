//! Connection options for the remote session.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HANDSHAKE_PORT: u16 = 8265;
pub const DEFAULT_TRANSPORT_PORT: u16 = 8266;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

/// How the session is established and whether it heals itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Listen for the peer instead of connecting to it.
    pub is_listener: bool,
    /// Host name or IP address to connect to or listen on.
    pub address: String,
    pub handshake_port: u16,
    pub transport_port: u16,
    /// Let the runtime pick the listening ports. The chosen transport
    /// port is reported through the Listening event.
    pub use_ephemeral_port: bool,
    /// Reconnect after a recoverable disconnect.
    pub auto_reconnect: bool,
    /// Delay before retrying a connect the runtime rejected synchronously.
    pub retry_delay_ms: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            is_listener: false,
            address: "127.0.0.1".to_string(),
            handshake_port: DEFAULT_HANDSHAKE_PORT,
            transport_port: DEFAULT_TRANSPORT_PORT,
            use_ephemeral_port: false,
            auto_reconnect: true,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl SessionOptions {
    /// Connect to a listening peer.
    pub fn connect_to(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            handshake_port: port,
            ..Self::default()
        }
    }

    /// Listen for an incoming peer.
    pub fn listen_on(address: impl Into<String>, handshake_port: u16, transport_port: u16) -> Self {
        Self {
            is_listener: true,
            address: address.into(),
            handshake_port,
            transport_port,
            ..Self::default()
        }
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_ephemeral_port(mut self, enabled: bool) -> Self {
        self.use_ephemeral_port = enabled;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Ports passed to Listen. Ephemeral mode asks for 0/0.
    pub fn listen_ports(&self) -> (u16, u16) {
        if self.use_ephemeral_port {
            (0, 0)
        } else {
            (self.handshake_port, self.transport_port)
        }
    }
}
