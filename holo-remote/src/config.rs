//! Host configuration.

use std::path::Path;
use std::time::Duration;

use holo_core::SessionOptions;
use holo_core::camera::{CameraDescriptor, RenderTargetSize};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the remoting host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// How the remote session is established.
    pub session: SessionConfig,
    /// Simulated display surfaces.
    pub display: DisplayConfig,
    /// Behavior of the headless device and peer.
    pub simulation: SimulationConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Listen for the peer instead of connecting to it.
    pub listen: bool,
    /// Peer host name or IP (connect), or bind address (listen).
    pub address: String,
    pub handshake_port: u16,
    pub transport_port: u16,
    /// Let the runtime pick the listening ports.
    pub ephemeral_port: bool,
    /// Reconnect after a recoverable disconnect.
    pub auto_reconnect: bool,
    /// Delay before retrying a rejected connect, in milliseconds.
    pub retry_delay_ms: u64,
}

/// Display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Number of cameras attached at startup.
    pub camera_count: u32,
    /// Render-target width per camera.
    pub width: u32,
    /// Render-target height per camera.
    pub height: u32,
    /// Render both eyes.
    pub stereo: bool,
    /// Back buffers each camera rotates through.
    pub buffers_per_camera: u32,
    /// Target frame time in milliseconds.
    pub frame_interval_ms: u64,
}

/// Simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Delay before the simulated peer accepts a session.
    pub connect_latency_ms: u64,
    /// Lose the graphics device every N frames. 0 disables.
    pub device_loss_every_frames: u64,
    /// Drop each established session after this long. 0 disables.
    pub drop_connection_after_ms: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for SessionConfig {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            listen: options.is_listener,
            address: options.address,
            handshake_port: options.handshake_port,
            transport_port: options.transport_port,
            ephemeral_port: options.use_ephemeral_port,
            auto_reconnect: options.auto_reconnect,
            retry_delay_ms: options.retry_delay_ms,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            camera_count: 1,
            width: 1440,
            height: 936,
            stereo: true,
            buffers_per_camera: 2,
            frame_interval_ms: 16,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            connect_latency_ms: 250,
            device_loss_every_frames: 0,
            drop_connection_after_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────

impl RemoteConfig {
    pub fn session_options(&self) -> SessionOptions {
        let s = &self.session;
        SessionOptions {
            is_listener: s.listen,
            address: s.address.clone(),
            handshake_port: s.handshake_port,
            transport_port: s.transport_port,
            use_ephemeral_port: s.ephemeral_port,
            auto_reconnect: s.auto_reconnect,
            retry_delay_ms: s.retry_delay_ms,
        }
    }

    pub fn camera_descriptor(&self) -> CameraDescriptor {
        CameraDescriptor::new(
            RenderTargetSize::new(self.display.width, self.display.height),
            self.display.stereo,
        )
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.display.frame_interval_ms)
    }

    pub fn connect_latency(&self) -> Duration {
        Duration::from_millis(self.simulation.connect_latency_ms)
    }

    pub fn drop_connection_after(&self) -> Option<Duration> {
        match self.simulation.drop_connection_after_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn device_loss_every(&self) -> Option<u64> {
        match self.simulation.device_loss_every_frames {
            0 => None,
            n => Some(n),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl RemoteConfig {
    /// Read a TOML file. A missing or unreadable file yields `Ok(None)`
    /// so the caller can fall back to defaults; a malformed one is an
    /// error.
    pub fn read(path: &Path) -> Result<Option<Self>, toml::de::Error> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map(Some),
            Err(_) => Ok(None),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
