//! Per-camera GPU resources.
//!
//! A *camera* is a platform-provided rendering target (one per display
//! surface, mono or stereo). Each attached camera owns exactly one
//! [`CameraResourceRecord`], stored in the [`CameraResourceTable`] and
//! reached only through its scoped-access primitive.

pub mod record;
pub mod table;

pub use record::{BackBufferBinding, CameraResourceRecord};
pub use table::{CameraMap, CameraResourceTable};

use serde::{Deserialize, Serialize};

// ── CameraId ─────────────────────────────────────────────────────

/// Opaque camera identity handed out by the platform.
///
/// Stable for the lifetime of the display surface and never reused
/// while the surface is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CameraId(pub u32);

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── RenderTargetSize ─────────────────────────────────────────────

/// Pixel dimensions of a camera's render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RenderTargetSize {
    pub width: u32,
    pub height: u32,
}

impl RenderTargetSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

// ── CameraDescriptor ─────────────────────────────────────────────

/// Surface description delivered with a camera-added notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Initial render-target size.
    pub render_target_size: RenderTargetSize,
    /// `true` for a two-eye surface rendered as a texture array.
    pub stereo: bool,
}

impl CameraDescriptor {
    pub fn new(render_target_size: RenderTargetSize, stereo: bool) -> Self {
        Self {
            render_target_size,
            stereo,
        }
    }
}
