//! Domain-specific error types for the holographic frame pipeline.
//!
//! All fallible operations return `Result<T, HoloError>`. The narrower
//! [`DeviceError`], [`RuntimeError`] and [`RenderError`] are produced at
//! the seams (graphics backend, remoting runtime, content renderers) and
//! convert into `HoloError` with `?`.

use thiserror::Error;

use crate::camera::CameraId;

/// The canonical error type for the holographic core.
#[derive(Debug, Error)]
pub enum HoloError {
    // ── Device Errors ────────────────────────────────────────────
    /// The graphics backend reported an error.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Device recreation failed during recovery. Fatal for the pipeline.
    #[error("graphics device unavailable: {0}")]
    DeviceUnavailable(String),

    // ── Camera Errors ────────────────────────────────────────────
    /// A camera id was used that the resource table does not know.
    #[error("unknown camera {0}")]
    UnknownCamera(CameraId),

    // ── Platform Errors ──────────────────────────────────────────
    /// Frame acquisition or readiness wait failed.
    #[error("platform error: {0}")]
    Platform(String),

    // ── Session Errors ───────────────────────────────────────────
    /// The remoting runtime rejected a command.
    #[error("remoting runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// A session operation was requested in a state that does not allow it.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    // ── Serialization Errors ─────────────────────────────────────
    /// Encoding or decoding of a data-channel message failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl HoloError {
    /// Returns `true` if this error means the graphics device was lost
    /// and must go through recovery.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, HoloError::Device(e) if e.is_device_lost())
    }
}

// ── DeviceError ──────────────────────────────────────────────────

/// Why a device was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceLossReason {
    /// The adapter was physically removed or the driver was upgraded.
    Removed,
    /// The device was reset (e.g. TDR).
    Reset,
}

impl std::fmt::Display for DeviceLossReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Removed => write!(f, "removed"),
            Self::Reset => write!(f, "reset"),
        }
    }
}

/// Errors produced by a graphics backend.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The device was removed or reset; every resource created from it
    /// is invalid.
    #[error("device lost ({0})")]
    DeviceLost(DeviceLossReason),

    /// A device or resource could not be created.
    #[error("creation failed: {0}")]
    CreationFailed(String),

    /// No device is currently available.
    #[error("no device available")]
    Unavailable,
}

impl DeviceError {
    /// The distinguished device-loss predicate.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, DeviceError::DeviceLost(_))
    }
}

// ── RuntimeError ─────────────────────────────────────────────────

/// Errors reported synchronously by the remoting runtime.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The address could not be resolved or parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The runtime refused the command.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// There is no connected session to carry the command.
    #[error("not connected")]
    NotConnected,

    /// The named data channel is not open.
    #[error("data channel {0} is not open")]
    ChannelClosed(u8),
}

// ── RenderError ──────────────────────────────────────────────────

/// Errors raised by content renderers while drawing one camera.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer's device-dependent resources are not ready.
    #[error("renderer resources not ready")]
    NotReady,

    /// Generic renderer failure.
    #[error("render failed: {0}")]
    Failed(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for HoloError {
    fn from(s: String) -> Self {
        HoloError::Other(s)
    }
}

impl From<&str> for HoloError {
    fn from(s: &str) -> Self {
        HoloError::Other(s.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for HoloError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        HoloError::Encoding(e.to_string())
    }
}
