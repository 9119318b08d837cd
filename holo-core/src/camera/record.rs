//! Per-camera GPU resource bundle.

use crate::camera::{CameraDescriptor, CameraId, RenderTargetSize};
use crate::device::{DeviceResource, GraphicsDevice, OwnedResource, ResourceId};
use crate::error::DeviceError;
use crate::frame::{BackBufferHandle, CameraPose, ViewProjection, Viewport};

/// A render-target view bound to one platform back buffer.
#[derive(Debug)]
pub struct BackBufferBinding {
    handle: BackBufferHandle,
    view: OwnedResource,
}

impl BackBufferBinding {
    pub fn handle(&self) -> BackBufferHandle {
        self.handle
    }

    pub fn view(&self) -> &dyn DeviceResource {
        self.view.as_ref()
    }
}

/// GPU resources owned by a single camera.
///
/// Created empty when the camera is added; the device-backed bindings
/// are filled in lazily by [`create_or_update`](Self::create_or_update)
/// and dropped on removal or device loss.
///
/// Invariant: when the record is ready for draw, both the back-buffer
/// binding and the depth buffer exist.
#[derive(Debug)]
pub struct CameraResourceRecord {
    id: CameraId,
    descriptor: CameraDescriptor,
    /// Device generation this record was created under.
    device_generation: u64,

    back_buffer: Option<BackBufferBinding>,
    depth_buffer: Option<OwnedResource>,
    view_projection_buffer: Option<OwnedResource>,

    viewport: Viewport,
    frame_pending: bool,
    render_target_size: RenderTargetSize,
    stereo: bool,
}

impl CameraResourceRecord {
    pub fn new(id: CameraId, descriptor: CameraDescriptor, device_generation: u64) -> Self {
        Self {
            id,
            render_target_size: descriptor.render_target_size,
            stereo: descriptor.stereo,
            viewport: Viewport::covering(descriptor.render_target_size),
            descriptor,
            device_generation,
            back_buffer: None,
            depth_buffer: None,
            view_projection_buffer: None,
            frame_pending: false,
        }
    }

    // ── Per-frame update ─────────────────────────────────────────

    /// Bring the record up to date with this frame's pose.
    ///
    /// Rebinds the back buffer when the platform handle changed (and
    /// drops the depth buffer if the render-target size changed too),
    /// then makes sure the depth and view-projection buffers exist and
    /// uploads the view-projection matrices. Calling it again with the
    /// same back buffer creates nothing new.
    ///
    /// `frame_pending` is set only when every step succeeded and the
    /// pose carried a view transform.
    pub(crate) fn create_or_update(
        &mut self,
        device: &mut dyn GraphicsDevice,
        pose: &CameraPose,
    ) -> Result<(), DeviceError> {
        self.frame_pending = false;

        if self.back_buffer_handle() != Some(pose.back_buffer) {
            // Release the stale view before creating its replacement.
            self.back_buffer = None;
            let view = device.create_render_target_view(pose.back_buffer, pose.render_target_size)?;
            self.back_buffer = Some(BackBufferBinding {
                handle: pose.back_buffer,
                view,
            });

            if pose.render_target_size != self.render_target_size {
                self.render_target_size = pose.render_target_size;
                self.depth_buffer = None;
            }
        }

        if self.depth_buffer.is_none() {
            let depth = device.create_depth_stencil(self.render_target_size, self.stereo)?;
            self.depth_buffer = Some(depth);
        }

        if self.view_projection_buffer.is_none() {
            let buffer = device.create_constant_buffer(ViewProjection::BYTE_LEN)?;
            self.view_projection_buffer = Some(buffer);
        }

        self.viewport = pose.viewport;

        if let (Some(view_projection), Some(buffer)) =
            (&pose.view_projection, self.view_projection_buffer.as_deref())
        {
            device.write_constant_buffer(buffer, &view_projection.to_bytes())?;
            self.frame_pending = true;
        }

        Ok(())
    }

    /// Drop every device-backed binding.
    pub(crate) fn release_bindings(&mut self) {
        self.frame_pending = false;
        self.back_buffer = None;
        self.depth_buffer = None;
        self.view_projection_buffer = None;
    }

    /// Consume the pending-frame flag for the draw step.
    ///
    /// Returns `true` only if the record is ready for draw.
    pub(crate) fn take_frame_pending(&mut self) -> bool {
        let ready = self.is_ready_for_draw();
        self.frame_pending = false;
        ready
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    pub fn device_generation(&self) -> u64 {
        self.device_generation
    }

    pub fn back_buffer(&self) -> Option<&BackBufferBinding> {
        self.back_buffer.as_ref()
    }

    pub fn back_buffer_handle(&self) -> Option<BackBufferHandle> {
        self.back_buffer.as_ref().map(BackBufferBinding::handle)
    }

    pub fn depth_buffer(&self) -> Option<ResourceId> {
        self.depth_buffer.as_ref().map(|r| r.id())
    }

    pub fn view_projection_buffer(&self) -> Option<ResourceId> {
        self.view_projection_buffer.as_ref().map(|r| r.id())
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn is_frame_pending(&self) -> bool {
        self.frame_pending
    }

    pub fn render_target_size(&self) -> RenderTargetSize {
        self.render_target_size
    }

    pub fn is_stereo(&self) -> bool {
        self.stereo
    }

    /// `true` when all bindings exist and this frame's update succeeded.
    pub fn is_ready_for_draw(&self) -> bool {
        self.frame_pending
            && self.back_buffer.is_some()
            && self.depth_buffer.is_some()
            && self.view_projection_buffer.is_some()
    }

    /// `true` when no device-backed resource is held.
    pub fn is_empty(&self) -> bool {
        self.back_buffer.is_none()
            && self.depth_buffer.is_none()
            && self.view_projection_buffer.is_none()
    }
}

// ── Tests ────────────────────────────────────────────────────────
