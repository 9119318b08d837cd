//! Owner of the graphics device and the camera-resource table.
//!
//! ```text
//!   Active ──(device lost)──► Recovering ──(device + records rebuilt)──► Active
//!                                 │
//!                                 └──(device recreation fails)──► Unavailable
//! ```
//!
//! Lock order is always camera table, then device slot. Subscriber
//! callbacks run with no lock held.

use std::sync::Weak;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::camera::{CameraDescriptor, CameraId, CameraMap, CameraResourceTable};
use crate::device::{DeviceFactory, DeviceInfo, GraphicsDevice};
use crate::error::{DeviceError, HoloError};
use crate::frame::CameraPose;

// ── DeviceState ──────────────────────────────────────────────────

/// Lifecycle of the owned device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Active,
    Recovering,
    /// Device recreation failed. Terminal; the host must restart.
    Unavailable,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Recovering => write!(f, "Recovering"),
            Self::Unavailable => write!(f, "Unavailable"),
        }
    }
}

// ── DeviceNotify ─────────────────────────────────────────────────

/// Subscriber to device loss / restore.
///
/// Registered as a weak reference: a subscriber that has been dropped is
/// simply skipped.
pub trait DeviceNotify: Send + Sync {
    /// The device is about to be torn down; release anything created
    /// from it.
    fn on_device_lost(&self);

    /// A new device exists; rebuild device-backed state.
    fn on_device_restored(&self, device: &DeviceInfo);
}

// ── Internal state ───────────────────────────────────────────────

struct DeviceSlot {
    device: Option<Box<dyn GraphicsDevice>>,
    info: DeviceInfo,
}

struct Recovery {
    state: DeviceState,
    /// A loss was reported while recovering; rerun once finished.
    loss_queued: bool,
    completed: u64,
}

// ── GraphicsDeviceOwner ──────────────────────────────────────────

/// Owns the graphics device and every camera's GPU resources.
///
/// Shared between the rendering thread and platform notification
/// threads behind an `Arc`; every method takes `&self`.
pub struct GraphicsDeviceOwner {
    factory: Mutex<Box<dyn DeviceFactory>>,
    slot: Mutex<DeviceSlot>,
    cameras: CameraResourceTable,
    recovery: Mutex<Recovery>,
    notify: Mutex<Option<Weak<dyn DeviceNotify>>>,
}

impl GraphicsDeviceOwner {
    /// Create the initial device.
    ///
    /// Fails with [`HoloError::DeviceUnavailable`] if the factory cannot
    /// produce one.
    pub fn new(mut factory: Box<dyn DeviceFactory>) -> Result<Self, HoloError> {
        let device = factory
            .create_device()
            .map_err(|e| HoloError::DeviceUnavailable(e.to_string()))?;
        let info = DeviceInfo {
            generation: 1,
            adapter: device.adapter_name().to_string(),
        };
        info!(adapter = %info.adapter, "graphics device created");

        Ok(Self {
            factory: Mutex::new(factory),
            slot: Mutex::new(DeviceSlot {
                device: Some(device),
                info,
            }),
            cameras: CameraResourceTable::new(),
            recovery: Mutex::new(Recovery {
                state: DeviceState::Active,
                loss_queued: false,
                completed: 0,
            }),
            notify: Mutex::new(None),
        })
    }

    pub fn state(&self) -> DeviceState {
        self.recovery.lock().state
    }

    /// Identity of the current device.
    pub fn device_info(&self) -> DeviceInfo {
        self.slot.lock().info.clone()
    }

    /// Number of completed device-loss recoveries.
    pub fn recoveries(&self) -> u64 {
        self.recovery.lock().completed
    }

    /// Register the loss/restore subscriber, replacing any previous one.
    pub fn set_device_notify(&self, notify: Weak<dyn DeviceNotify>) {
        *self.notify.lock() = Some(notify);
    }

    // ── Camera lifecycle ─────────────────────────────────────────

    /// Camera-added notification. Safe from any thread.
    pub fn add_camera(&self, id: CameraId, descriptor: CameraDescriptor) -> bool {
        let added = self.cameras.with_table(|table| {
            let generation = self.slot.lock().info.generation;
            table.add(id, descriptor, generation)
        });
        if added {
            info!(camera = %id, "camera added");
        } else {
            debug!(camera = %id, "camera already known");
        }
        added
    }

    /// Camera-removed notification. Safe from any thread.
    ///
    /// Releases the record's bindings and flushes the device so the
    /// platform may reuse the surface.
    pub fn remove_camera(&self, id: CameraId) -> bool {
        let removed = self.cameras.with_table(|table| {
            let removed = table.remove(id);
            if removed {
                if let Some(device) = self.slot.lock().device.as_deref_mut() {
                    device.flush();
                }
            }
            removed
        });
        if removed {
            info!(camera = %id, "camera removed");
        }
        removed
    }

    /// Read-only access to the camera records.
    pub fn with_cameras<R>(&self, f: impl FnOnce(&CameraMap) -> R) -> R {
        self.cameras.with_table(|table| f(table))
    }

    pub(crate) fn with_cameras_mut<R>(&self, f: impl FnOnce(&mut CameraMap) -> R) -> R {
        self.cameras.with_table(f)
    }

    pub fn camera_ids(&self) -> Vec<CameraId> {
        self.cameras.with_table(|table| table.ids())
    }

    // ── Per-frame resources ──────────────────────────────────────

    /// Make sure the camera's resources match this frame's pose.
    ///
    /// Idempotent per frame. A device-loss error is returned to the
    /// caller, which must call [`handle_device_lost`](Self::handle_device_lost)
    /// after this returns.
    pub fn create_or_update_camera_resources(&self, pose: &CameraPose) -> Result<(), HoloError> {
        if self.state() == DeviceState::Unavailable {
            return Err(HoloError::DeviceUnavailable("device was not recovered".into()));
        }

        self.cameras.with_table(|table| {
            let record = table
                .get_mut(pose.camera_id)
                .ok_or(HoloError::UnknownCamera(pose.camera_id))?;
            let mut slot = self.slot.lock();
            let device = slot.device.as_deref_mut().ok_or(DeviceError::Unavailable)?;
            record.create_or_update(device, pose)?;
            Ok(())
        })
    }

    /// Drop the camera's bindings and flush the device so no reference
    /// to the released back buffer survives.
    pub fn release_camera_resources(&self, id: CameraId) -> Result<(), HoloError> {
        self.cameras.with_table(|table| {
            let record = table.get_mut(id).ok_or(HoloError::UnknownCamera(id))?;
            record.release_bindings();
            if let Some(device) = self.slot.lock().device.as_deref_mut() {
                device.flush();
            }
            Ok(())
        })
    }

    // ── Device loss ──────────────────────────────────────────────

    /// Tear down and rebuild the device and every camera record.
    ///
    /// 1. notify the subscriber that the device is about to be lost,
    /// 2. release every camera record,
    /// 3. recreate the device,
    /// 4. notify the subscriber that the device was restored.
    ///
    /// A loss reported while this runs (e.g. from a subscriber callback)
    /// is queued and handled by one more pass once the current one
    /// finishes. If the device cannot be recreated the owner becomes
    /// [`DeviceState::Unavailable`] and the error is returned.
    pub fn handle_device_lost(&self) -> Result<(), HoloError> {
        {
            let mut recovery = self.recovery.lock();
            match recovery.state {
                DeviceState::Recovering => {
                    recovery.loss_queued = true;
                    warn!("device loss reported during recovery; queued");
                    return Ok(());
                }
                DeviceState::Unavailable => {
                    return Err(HoloError::DeviceUnavailable(
                        "device recreation failed earlier".into(),
                    ));
                }
                DeviceState::Active => recovery.state = DeviceState::Recovering,
            }
        }

        loop {
            if let Err(e) = self.recover_once() {
                self.recovery.lock().state = DeviceState::Unavailable;
                return Err(e);
            }

            let mut recovery = self.recovery.lock();
            recovery.completed += 1;
            if recovery.loss_queued {
                recovery.loss_queued = false;
                info!("running queued device-loss recovery");
                continue;
            }
            recovery.state = DeviceState::Active;
            return Ok(());
        }
    }

    fn recover_once(&self) -> Result<(), HoloError> {
        let lost_generation = self.slot.lock().info.generation;
        warn!(generation = lost_generation, "graphics device lost; recovering");

        if let Some(notify) = self.subscriber() {
            notify.on_device_lost();
        }

        let info = self.cameras.with_table(|table| {
            let mut slot = self.slot.lock();
            let next_generation = slot.info.generation + 1;

            table.reset_all(next_generation);
            slot.device = None;

            let device = self.factory.lock().create_device().map_err(|e| {
                error!("graphics device recreation failed: {e}");
                HoloError::DeviceUnavailable(e.to_string())
            })?;

            slot.info = DeviceInfo {
                generation: next_generation,
                adapter: device.adapter_name().to_string(),
            };
            slot.device = Some(device);
            Ok::<_, HoloError>(slot.info.clone())
        })?;

        info!(
            generation = info.generation,
            adapter = %info.adapter,
            "graphics device restored"
        );

        if let Some(notify) = self.subscriber() {
            notify.on_device_restored(&info);
        }
        Ok(())
    }

    fn subscriber(&self) -> Option<std::sync::Arc<dyn DeviceNotify>> {
        self.notify.lock().as_ref().and_then(Weak::upgrade)
    }
}

// ── Tests ────────────────────────────────────────────────────────
