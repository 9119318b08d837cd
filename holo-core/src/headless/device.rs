//! In-memory graphics device with fault injection.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::camera::RenderTargetSize;
use crate::device::{
    DeviceFactory, DeviceResource, GraphicsDevice, OwnedResource, ResourceId, ResourceKind,
};
use crate::error::{DeviceError, DeviceLossReason};
use crate::frame::{BackBufferHandle, FrameId, PresentOutcome, ViewProjection};

// ── DeviceControl ────────────────────────────────────────────────

#[derive(Default)]
struct Faults {
    fail_device_creations: u32,
    lose_on_next_resource: Option<DeviceLossReason>,
    next_present: Option<PresentOutcome>,
    failing_sizes: HashSet<RenderTargetSize>,
    lose_every_frames: Option<u64>,
    fail_next_acquire: Option<String>,
}

/// Shared counters and fault switches for the headless device and
/// platform. Cloned into every device the factory creates.
#[derive(Default)]
pub struct DeviceControl {
    devices_created: AtomicU64,
    resources_created: AtomicU64,
    live_resources: Arc<AtomicUsize>,
    flushes: AtomicU64,
    next_resource: AtomicU64,
    faults: Mutex<Faults>,
}

impl DeviceControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn devices_created(&self) -> u64 {
        self.devices_created.load(Ordering::SeqCst)
    }

    pub fn resources_created(&self) -> u64 {
        self.resources_created.load(Ordering::SeqCst)
    }

    /// Resources created and not yet dropped, across all devices.
    pub fn live_resources(&self) -> usize {
        self.live_resources.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::SeqCst)
    }

    /// The next `count` device creations fail.
    pub fn fail_device_creation(&self, count: u32) {
        self.faults.lock().fail_device_creations = count;
    }

    /// The next resource creation reports device loss.
    pub fn lose_device_on_next_resource(&self, reason: DeviceLossReason) {
        self.faults.lock().lose_on_next_resource = Some(reason);
    }

    /// The next present reports device loss.
    pub fn lose_device_on_present(&self, reason: DeviceLossReason) {
        self.faults.lock().next_present = Some(PresentOutcome::DeviceLost(reason));
    }

    /// The next present fails without losing the device.
    pub fn fail_next_present(&self, message: &str) {
        self.faults.lock().next_present = Some(PresentOutcome::Failed(message.to_string()));
    }

    /// Render-target views of this size can never be created.
    pub fn fail_render_target_size(&self, size: RenderTargetSize) {
        self.faults.lock().failing_sizes.insert(size);
    }

    /// The next frame acquisition fails with a platform error.
    pub fn fail_next_acquire(&self, message: &str) {
        self.faults.lock().fail_next_acquire = Some(message.to_string());
    }

    /// Report device loss on every `frames`-th present. `None` disables.
    pub fn lose_device_every(&self, frames: Option<u64>) {
        self.faults.lock().lose_every_frames = frames.filter(|n| *n > 0);
    }

    pub(crate) fn present_outcome(&self, frame: FrameId) -> PresentOutcome {
        let mut faults = self.faults.lock();
        if let Some(outcome) = faults.next_present.take() {
            return outcome;
        }
        match faults.lose_every_frames {
            Some(n) if frame.0 > 0 && frame.0 % n == 0 => {
                PresentOutcome::DeviceLost(DeviceLossReason::Reset)
            }
            _ => PresentOutcome::Presented,
        }
    }

    pub(crate) fn take_acquire_failure(&self) -> Option<String> {
        self.faults.lock().fail_next_acquire.take()
    }

    fn take_device_creation_failure(&self) -> bool {
        let mut faults = self.faults.lock();
        if faults.fail_device_creations > 0 {
            faults.fail_device_creations -= 1;
            true
        } else {
            false
        }
    }

    fn check_resource(&self, size: Option<RenderTargetSize>) -> Result<(), DeviceError> {
        let mut faults = self.faults.lock();
        if let Some(reason) = faults.lose_on_next_resource.take() {
            return Err(DeviceError::DeviceLost(reason));
        }
        match size {
            Some(size) if faults.failing_sizes.contains(&size) => Err(DeviceError::CreationFailed(
                format!("{}x{} render target", size.width, size.height),
            )),
            _ => Ok(()),
        }
    }

    fn allocate(&self, kind: ResourceKind) -> OwnedResource {
        let id = ResourceId(self.next_resource.fetch_add(1, Ordering::SeqCst) + 1);
        self.resources_created.fetch_add(1, Ordering::SeqCst);
        self.live_resources.fetch_add(1, Ordering::SeqCst);
        Box::new(HeadlessResource {
            id,
            kind,
            live: self.live_resources.clone(),
        })
    }
}

// ── HeadlessResource ─────────────────────────────────────────────

#[derive(Debug)]
struct HeadlessResource {
    id: ResourceId,
    kind: ResourceKind,
    live: Arc<AtomicUsize>,
}

impl DeviceResource for HeadlessResource {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }
}

impl Drop for HeadlessResource {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── HeadlessDevice ───────────────────────────────────────────────

struct HeadlessDevice {
    control: Arc<DeviceControl>,
    adapter: String,
}

impl GraphicsDevice for HeadlessDevice {
    fn adapter_name(&self) -> &str {
        &self.adapter
    }

    fn create_render_target_view(
        &mut self,
        _back_buffer: BackBufferHandle,
        size: RenderTargetSize,
    ) -> Result<OwnedResource, DeviceError> {
        self.control.check_resource(Some(size))?;
        Ok(self.control.allocate(ResourceKind::RenderTargetView))
    }

    fn create_depth_stencil(
        &mut self,
        size: RenderTargetSize,
        _stereo: bool,
    ) -> Result<OwnedResource, DeviceError> {
        self.control.check_resource(Some(size))?;
        Ok(self.control.allocate(ResourceKind::DepthStencil))
    }

    fn create_constant_buffer(&mut self, _byte_len: usize) -> Result<OwnedResource, DeviceError> {
        self.control.check_resource(None)?;
        Ok(self.control.allocate(ResourceKind::ConstantBuffer))
    }

    fn write_constant_buffer(
        &mut self,
        buffer: &dyn DeviceResource,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        if buffer.kind() != ResourceKind::ConstantBuffer {
            return Err(DeviceError::CreationFailed(format!(
                "resource {:?} is not a constant buffer",
                buffer.id()
            )));
        }
        if data.len() > ViewProjection::BYTE_LEN {
            return Err(DeviceError::CreationFailed(format!(
                "{} bytes do not fit the constant buffer",
                data.len()
            )));
        }
        Ok(())
    }

    fn flush(&mut self) {
        self.control.flushes.fetch_add(1, Ordering::SeqCst);
    }
}

// ── HeadlessDeviceFactory ────────────────────────────────────────

/// Produces [`HeadlessDevice`]s sharing one [`DeviceControl`].
pub struct HeadlessDeviceFactory {
    control: Arc<DeviceControl>,
}

impl HeadlessDeviceFactory {
    pub fn new(control: Arc<DeviceControl>) -> Self {
        Self { control }
    }
}

impl DeviceFactory for HeadlessDeviceFactory {
    fn create_device(&mut self) -> Result<Box<dyn GraphicsDevice>, DeviceError> {
        if self.control.take_device_creation_failure() {
            return Err(DeviceError::CreationFailed("adapter not found".into()));
        }
        let n = self.control.devices_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(HeadlessDevice {
            control: self.control.clone(),
            adapter: format!("headless adapter {n}"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: RenderTargetSize = RenderTargetSize::new(64, 64);

    #[test]
    fn resources_are_counted_until_dropped() {
        let control = DeviceControl::new();
        let mut device = HeadlessDeviceFactory::new(control.clone()).create_device().unwrap();

        let a = device.create_depth_stencil(SIZE, false).unwrap();
        let b = device.create_constant_buffer(128).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(control.live_resources(), 2);

        drop(a);
        assert_eq!(control.live_resources(), 1);
        assert_eq!(control.resources_created(), 2);
    }

    #[test]
    fn injected_loss_fires_once() {
        let control = DeviceControl::new();
        let mut device = HeadlessDeviceFactory::new(control.clone()).create_device().unwrap();
        control.lose_device_on_next_resource(DeviceLossReason::Removed);

        let err = device.create_constant_buffer(128).unwrap_err();
        assert!(err.is_device_lost());
        assert!(device.create_constant_buffer(128).is_ok());
    }

    #[test]
    fn creation_failures_are_counted_down() {
        let control = DeviceControl::new();
        let mut factory = HeadlessDeviceFactory::new(control.clone());
        control.fail_device_creation(2);
        assert!(factory.create_device().is_err());
        assert!(factory.create_device().is_err());
        assert!(factory.create_device().is_ok());
        assert_eq!(control.devices_created(), 1);
    }

    #[test]
    fn periodic_loss_on_present() {
        let control = DeviceControl::new();
        control.lose_device_every(Some(3));
        assert_eq!(control.present_outcome(FrameId(2)), PresentOutcome::Presented);
        assert!(matches!(
            control.present_outcome(FrameId(3)),
            PresentOutcome::DeviceLost(_)
        ));
    }

    #[test]
    fn constant_buffer_write_checks_kind() {
        let control = DeviceControl::new();
        let mut device = HeadlessDeviceFactory::new(control).create_device().unwrap();
        let depth = device.create_depth_stencil(SIZE, true).unwrap();
        assert!(device.write_constant_buffer(depth.as_ref(), &[0; 4]).is_err());
    }
}
