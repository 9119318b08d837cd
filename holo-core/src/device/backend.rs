//! Graphics backend seam.
//!
//! The owner never talks to a concrete graphics API; it drives a
//! [`GraphicsDevice`] created by a [`DeviceFactory`]. Resources are
//! returned as owned boxes: dropping an [`OwnedResource`] releases the
//! GPU allocation, so every resource has exactly one owner and is freed
//! deterministically when that owner lets go of it.

use crate::camera::RenderTargetSize;
use crate::error::DeviceError;
use crate::frame::BackBufferHandle;

/// Identity of a GPU resource, unique per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

/// What a resource is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Render-target view over a platform back buffer.
    RenderTargetView,
    /// Depth-stencil texture and view.
    DepthStencil,
    /// Constant buffer (view-projection matrices).
    ConstantBuffer,
}

/// A GPU-side resource. Dropping it releases the allocation.
pub trait DeviceResource: Send + std::fmt::Debug {
    fn id(&self) -> ResourceId;
    fn kind(&self) -> ResourceKind;
}

/// Exclusive ownership of a GPU resource.
pub type OwnedResource = Box<dyn DeviceResource>;

/// Identity of the current device, handed to collaborators that must
/// create device-backed state (frame sinks, renderer resources).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Incremented every time the device is (re)created.
    pub generation: u64,
    /// Human-readable adapter name.
    pub adapter: String,
}

/// A live graphics device and its immediate context.
///
/// Every method may report [`DeviceError::DeviceLost`].
pub trait GraphicsDevice: Send {
    fn adapter_name(&self) -> &str;

    /// Create a render-target view over the platform back buffer.
    fn create_render_target_view(
        &mut self,
        back_buffer: BackBufferHandle,
        size: RenderTargetSize,
    ) -> Result<OwnedResource, DeviceError>;

    /// Create a depth-stencil buffer matching the render target.
    fn create_depth_stencil(
        &mut self,
        size: RenderTargetSize,
        stereo: bool,
    ) -> Result<OwnedResource, DeviceError>;

    /// Create a constant buffer of `byte_len` bytes.
    fn create_constant_buffer(&mut self, byte_len: usize) -> Result<OwnedResource, DeviceError>;

    /// Upload `data` into a constant buffer created by this device.
    fn write_constant_buffer(
        &mut self,
        buffer: &dyn DeviceResource,
        data: &[u8],
    ) -> Result<(), DeviceError>;

    /// Submit pending work and drop deferred references to released
    /// resources.
    fn flush(&mut self);
}

/// Creates graphics devices. Called once at startup and again for each
/// device-loss recovery.
pub trait DeviceFactory: Send {
    fn create_device(&mut self) -> Result<Box<dyn GraphicsDevice>, DeviceError>;
}
