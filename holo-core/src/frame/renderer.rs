//! Content renderer seam.
//!
//! Scene content (holograms, overlays, status text) lives outside the
//! core. Each renderer gets the coordinate system and frame once per
//! tick, then draws into every ready camera through a read-only
//! [`CameraRenderTarget`]; it can never mutate the camera table.

use crate::camera::{CameraId, CameraResourceRecord, RenderTargetSize};
use crate::device::{DeviceInfo, ResourceId};
use crate::error::RenderError;
use crate::frame::{BackBufferHandle, CameraPose, CoordinateSystem, FrameHandle, ViewProjection, Viewport};

/// Read-only view of one camera, ready for draw.
#[derive(Debug, Clone, Copy)]
pub struct CameraRenderTarget<'a> {
    record: &'a CameraResourceRecord,
    pose: &'a CameraPose,
}

impl<'a> CameraRenderTarget<'a> {
    pub(crate) fn new(record: &'a CameraResourceRecord, pose: &'a CameraPose) -> Self {
        Self { record, pose }
    }

    pub fn camera_id(&self) -> CameraId {
        self.record.id()
    }

    pub fn viewport(&self) -> Viewport {
        self.record.viewport()
    }

    pub fn render_target_size(&self) -> RenderTargetSize {
        self.record.render_target_size()
    }

    pub fn is_stereo(&self) -> bool {
        self.record.is_stereo()
    }

    pub fn back_buffer(&self) -> Option<BackBufferHandle> {
        self.record.back_buffer_handle()
    }

    pub fn depth_buffer(&self) -> Option<ResourceId> {
        self.record.depth_buffer()
    }

    pub fn view_projection(&self) -> Option<&'a ViewProjection> {
        self.pose.view_projection.as_ref()
    }
}

/// Scene content drawn by the pipeline.
pub trait ContentRenderer: Send {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Advance content for this frame.
    fn update(&mut self, coordinate_system: &CoordinateSystem, frame: &FrameHandle);

    /// Draw into one camera. An error skips this camera for the tick.
    fn render(&mut self, target: &CameraRenderTarget<'_>) -> Result<(), RenderError>;

    /// The device is about to be lost.
    fn release_device_resources(&mut self) {}

    /// A (new) device is available.
    fn create_device_resources(&mut self, _device: &DeviceInfo) {}
}
