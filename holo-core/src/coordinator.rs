//! Glue between the graphics device owner and the remote session.
//!
//! The remoting runtime renders into frames backed by the graphics
//! device, so the session cannot outlive it:
//!
//! ```text
//!  device lost ──► close session, release frame sink
//!  device restored ──► bind frame sink to new device ──► reconnect (if it was up)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{info, warn};

use crate::device::{DeviceInfo, DeviceNotify, GraphicsDeviceOwner};
use crate::error::HoloError;
use crate::frame::{CoordinateSystem, FramePipeline, TickReport};
use crate::session::RemoteSessionController;

pub struct SessionFrameCoordinator {
    session: Arc<RemoteSessionController>,
    device: Arc<GraphicsDeviceOwner>,
    /// A session was up when the device was lost; reconnect once it is
    /// back if auto-reconnect is enabled.
    resume_on_restore: AtomicBool,
}

impl SessionFrameCoordinator {
    /// Create the coordinator and subscribe it to device loss.
    pub fn new(session: Arc<RemoteSessionController>, device: Arc<GraphicsDeviceOwner>) -> Arc<Self> {
        let coordinator = Arc::new(Self {
            session,
            device,
            resume_on_restore: AtomicBool::new(false),
        });
        let notify: Weak<dyn DeviceNotify> = Arc::downgrade(&coordinator) as Weak<dyn DeviceNotify>;
        coordinator.device.set_device_notify(notify);
        coordinator
    }

    pub fn session(&self) -> &Arc<RemoteSessionController> {
        &self.session
    }

    pub fn device(&self) -> &Arc<GraphicsDeviceOwner> {
        &self.device
    }

    /// Bind the frame sink to the current device and start the session.
    ///
    /// A rejected connect is returned but a retry is already scheduled.
    pub fn start(&self) -> Result<(), HoloError> {
        self.session.attach_device(&self.device.device_info())?;
        self.session.connect_or_listen()
    }

    /// One frame: apply queued session events, then run the pipeline.
    ///
    /// Call from the rendering thread only. Session events are applied
    /// in queue order by a single consumer.
    pub fn tick(
        &self,
        pipeline: &mut FramePipeline,
        coordinate_system: &CoordinateSystem,
    ) -> Result<TickReport, HoloError> {
        self.session.dispatch_pending();
        pipeline.tick(coordinate_system)
    }

    pub fn stop(&self) {
        self.resume_on_restore.store(false, Ordering::SeqCst);
        self.session.disconnect();
        self.session.detach_device();
    }
}

impl DeviceNotify for SessionFrameCoordinator {
    fn on_device_lost(&self) {
        let was_active = self.session.shutdown_for_device_loss();
        self.resume_on_restore.fetch_or(was_active, Ordering::SeqCst);
        self.session.detach_device();
    }

    fn on_device_restored(&self, device: &DeviceInfo) {
        if let Err(e) = self.session.attach_device(device) {
            warn!(generation = device.generation, "could not bind frame sink: {e}");
            return;
        }
        let resume = self.resume_on_restore.swap(false, Ordering::SeqCst);
        if resume && self.session.options().auto_reconnect {
            info!(generation = device.generation, "resuming remote session on restored device");
            if let Err(e) = self.session.connect_or_listen() {
                warn!("reconnect after device loss failed: {e}");
            }
        }
    }
}
