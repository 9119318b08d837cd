//! The platform side of frame pacing.
//!
//! These are the primitives the holographic platform gives us each tick:
//! wait for readiness, acquire a frame with its camera-pose predictions,
//! and present it. Device loss surfaces only as
//! [`PresentOutcome::DeviceLost`] or as a [`DeviceError::DeviceLost`]
//! from a resource-creation call.
//!
//! [`DeviceError::DeviceLost`]: crate::error::DeviceError::DeviceLost

use std::time::Instant;

use crate::camera::{CameraId, RenderTargetSize};
use crate::device::DeviceInfo;
use crate::error::{DeviceLossReason, HoloError};

// ── Handles ──────────────────────────────────────────────────────

/// Platform handle of the back buffer a camera renders into this frame.
///
/// The platform rotates through a small set of buffers; a change of
/// handle means the cached render-target view must be recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackBufferHandle(pub u64);

/// Monotonic frame number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

/// Column-major 4×4 matrix.
pub type Matrix4 = [[f32; 4]; 4];

/// The identity matrix.
pub const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

// ── Viewport ─────────────────────────────────────────────────────

/// Pixel rectangle a camera renders into.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// A viewport covering the whole render target.
    pub fn covering(size: RenderTargetSize) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size.width as f32,
            height: size.height as f32,
        }
    }
}

// ── ViewProjection ───────────────────────────────────────────────

/// Per-eye view-projection matrices uploaded to the camera's constant
/// buffer every frame. Mono cameras use the same matrix for both eyes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewProjection {
    pub left: Matrix4,
    pub right: Matrix4,
}

impl ViewProjection {
    /// Size of the GPU constant buffer holding both matrices.
    pub const BYTE_LEN: usize = 2 * 16 * std::mem::size_of::<f32>();

    pub fn stereo(left: Matrix4, right: Matrix4) -> Self {
        Self { left, right }
    }

    pub fn mono(matrix: Matrix4) -> Self {
        Self {
            left: matrix,
            right: matrix,
        }
    }

    /// Little-endian byte image of both matrices, left eye first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::BYTE_LEN);
        for matrix in [&self.left, &self.right] {
            for column in matrix {
                for value in column {
                    out.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        out
    }
}

// ── CameraPose ───────────────────────────────────────────────────

/// One camera's prediction for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraPose {
    pub camera_id: CameraId,
    /// Back buffer the platform wants this camera rendered into.
    pub back_buffer: BackBufferHandle,
    pub render_target_size: RenderTargetSize,
    pub viewport: Viewport,
    /// `None` when the view transform could not be located this frame
    /// (e.g. tracking loss); the camera is then not drawn.
    pub view_projection: Option<ViewProjection>,
}

// ── CoordinateSystem ─────────────────────────────────────────────

/// Read-only handle to the coordinate system content is placed in.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateSystem {
    pub id: u64,
    pub to_world: Matrix4,
}

impl CoordinateSystem {
    /// A stationary frame of reference at the world origin.
    pub fn stationary(id: u64) -> Self {
        Self {
            id,
            to_world: IDENTITY,
        }
    }
}

// ── FrameHandle ──────────────────────────────────────────────────

/// The frame acquired for the current tick.
#[derive(Debug, Clone)]
pub struct FrameHandle {
    pub id: FrameId,
    pub poses: Vec<CameraPose>,
    pub acquired_at: Instant,
}

impl FrameHandle {
    pub fn new(id: FrameId, poses: Vec<CameraPose>) -> Self {
        Self {
            id,
            poses,
            acquired_at: Instant::now(),
        }
    }

    /// The pose predicted for `camera`, if it is part of this frame.
    pub fn pose(&self, camera: CameraId) -> Option<&CameraPose> {
        self.poses.iter().find(|p| p.camera_id == camera)
    }
}

// ── PresentOutcome ───────────────────────────────────────────────

/// Result of presenting a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentOutcome {
    Presented,
    /// The device was removed or reset; recovery is required.
    DeviceLost(DeviceLossReason),
    /// Any other presentation failure. Logged, never recovered from.
    Failed(String),
}

// ── HolographicPlatform ──────────────────────────────────────────

/// Frame pacing primitives consumed by the [`FramePipeline`].
///
/// All calls happen on the rendering thread.
///
/// [`FramePipeline`]: crate::frame::FramePipeline
pub trait HolographicPlatform: Send {
    /// Hand the (re)created device to the platform so it can allocate
    /// back buffers from it.
    fn bind_device(&mut self, _device: &DeviceInfo) {}

    /// Block until the platform signals that the next frame may start.
    fn wait_for_frame_ready(&mut self) -> Result<(), HoloError>;

    /// Acquire the next frame and its camera-pose predictions.
    fn acquire_frame(&mut self) -> Result<FrameHandle, HoloError>;

    /// Present the frame.
    fn present(&mut self, frame: &FrameHandle) -> PresentOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_projection_byte_image() {
        let vp = ViewProjection::mono(IDENTITY);
        let bytes = vp.to_bytes();
        assert_eq!(bytes.len(), ViewProjection::BYTE_LEN);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0.0f32.to_le_bytes());
        // The right eye starts after 16 floats.
        assert_eq!(&bytes[64..68], &1.0f32.to_le_bytes());
    }

    #[test]
    fn viewport_covers_target() {
        let vp = Viewport::covering(RenderTargetSize::new(1280, 720));
        assert_eq!(vp.width, 1280.0);
        assert_eq!(vp.height, 720.0);
        assert_eq!(vp.x, 0.0);
    }

    #[test]
    fn frame_pose_lookup() {
        let pose = CameraPose {
            camera_id: CameraId(3),
            back_buffer: BackBufferHandle(1),
            render_target_size: RenderTargetSize::new(64, 64),
            viewport: Viewport::default(),
            view_projection: None,
        };
        let frame = FrameHandle::new(FrameId(1), vec![pose]);
        assert!(frame.pose(CameraId(3)).is_some());
        assert!(frame.pose(CameraId(4)).is_none());
    }
}
