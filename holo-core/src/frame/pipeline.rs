//! One rendering tick.
//!
//! ```text
//!  wait ready ─► acquire frame ─► update camera resources ─► renderers
//!                                        │                      │
//!                                (device lost: recover)         ▼
//!                                                            present ─► (device lost: recover)
//! ```
//!
//! Runs on the rendering thread only. Camera-resource validation always
//! precedes content rendering, which always precedes presentation.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::camera::CameraId;
use crate::device::GraphicsDeviceOwner;
use crate::error::HoloError;
use crate::frame::{
    CameraPose, CameraRenderTarget, ContentRenderer, CoordinateSystem, FrameId,
    HolographicPlatform, PresentOutcome,
};

// ── TickReport ───────────────────────────────────────────────────

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub frame: Option<FrameId>,
    /// Cameras every renderer drew into.
    pub cameras_rendered: Vec<CameraId>,
    /// Cameras skipped because of a resource or render error.
    pub cameras_skipped: Vec<CameraId>,
    /// Presentation succeeded and at least one camera was rendered.
    pub presented: bool,
    /// Device loss was detected and recovered during this tick.
    pub device_recovered: bool,
}

// ── FramePipeline ────────────────────────────────────────────────

/// Drives wait → acquire → update → render → present.
pub struct FramePipeline {
    owner: Arc<GraphicsDeviceOwner>,
    platform: Box<dyn HolographicPlatform>,
    renderers: Vec<Box<dyn ContentRenderer>>,
    frames_presented: u64,
}

impl FramePipeline {
    pub fn new(owner: Arc<GraphicsDeviceOwner>, mut platform: Box<dyn HolographicPlatform>) -> Self {
        platform.bind_device(&owner.device_info());
        Self {
            owner,
            platform,
            renderers: Vec::new(),
            frames_presented: 0,
        }
    }

    /// Register a content renderer; it immediately receives the current
    /// device.
    pub fn add_renderer(&mut self, mut renderer: Box<dyn ContentRenderer>) {
        renderer.create_device_resources(&self.owner.device_info());
        self.renderers.push(renderer);
    }

    pub fn device_owner(&self) -> &Arc<GraphicsDeviceOwner> {
        &self.owner
    }

    /// Ticks that presented at least one camera.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Run one tick.
    ///
    /// Per-camera failures skip that camera. Device loss from a resource
    /// update or from presentation is recovered in place and ends the
    /// tick early. Only a failed recovery (or a platform error while
    /// acquiring the frame) is returned as `Err`.
    pub fn tick(&mut self, coordinate_system: &CoordinateSystem) -> Result<TickReport, HoloError> {
        if self.owner.state() == crate::device::DeviceState::Unavailable {
            return Err(HoloError::DeviceUnavailable("device was not recovered".into()));
        }

        self.platform.wait_for_frame_ready()?;
        let frame = self.platform.acquire_frame()?;
        let mut report = TickReport {
            frame: Some(frame.id),
            ..TickReport::default()
        };

        // ── Camera resources ─────────────────────────────────────
        let mut ready: Vec<&CameraPose> = Vec::with_capacity(frame.poses.len());
        for pose in &frame.poses {
            match self.owner.create_or_update_camera_resources(pose) {
                Ok(()) => ready.push(pose),
                Err(e) if e.is_device_lost() => {
                    warn!(camera = %pose.camera_id, "device lost while updating camera resources");
                    self.recover_device()?;
                    report.device_recovered = true;
                    return Ok(report);
                }
                Err(e @ HoloError::DeviceUnavailable(_)) => return Err(e),
                Err(e) => {
                    warn!(camera = %pose.camera_id, "skipping camera this frame: {e}");
                    report.cameras_skipped.push(pose.camera_id);
                }
            }
        }

        // ── Content ──────────────────────────────────────────────
        for renderer in &mut self.renderers {
            renderer.update(coordinate_system, &frame);
        }

        let renderers = &mut self.renderers;
        let (rendered, skipped) = self.owner.with_cameras_mut(|table| {
            let mut rendered = Vec::new();
            let mut skipped = Vec::new();
            for pose in &ready {
                let Some(record) = table.get_mut(pose.camera_id) else {
                    // Removed by another thread since the update step.
                    continue;
                };
                if !record.take_frame_pending() {
                    debug!(camera = %pose.camera_id, "camera not ready for draw");
                    continue;
                }

                let target = CameraRenderTarget::new(record, pose);
                let failed = renderers.iter_mut().find_map(|renderer| {
                    renderer
                        .render(&target)
                        .err()
                        .map(|e| (renderer.name().to_string(), e))
                });
                match failed {
                    None => rendered.push(pose.camera_id),
                    Some((name, e)) => {
                        warn!(camera = %pose.camera_id, renderer = %name, "render failed: {e}");
                        skipped.push(pose.camera_id);
                    }
                }
            }
            (rendered, skipped)
        });
        report.cameras_rendered = rendered;
        report.cameras_skipped.extend(skipped);

        // ── Present ──────────────────────────────────────────────
        match self.platform.present(&frame) {
            PresentOutcome::Presented => {
                report.presented = !report.cameras_rendered.is_empty();
                if report.presented {
                    self.frames_presented += 1;
                }
            }
            PresentOutcome::DeviceLost(reason) => {
                warn!(frame = frame.id.0, %reason, "device lost during present");
                self.recover_device()?;
                report.device_recovered = true;
            }
            PresentOutcome::Failed(msg) => {
                warn!(frame = frame.id.0, "present failed: {msg}");
            }
        }

        Ok(report)
    }

    fn recover_device(&mut self) -> Result<(), HoloError> {
        for renderer in &mut self.renderers {
            renderer.release_device_resources();
        }

        self.owner.handle_device_lost()?;

        let info = self.owner.device_info();
        self.platform.bind_device(&info);
        for renderer in &mut self.renderers {
            renderer.create_device_resources(&info);
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::camera::{CameraDescriptor, RenderTargetSize};
    use crate::device::DeviceInfo;
    use crate::error::{DeviceLossReason, RenderError};
    use crate::frame::FrameHandle;
    use crate::headless::{DeviceControl, HeadlessDeviceFactory, HeadlessPlatform};

    const SIZE: RenderTargetSize = RenderTargetSize::new(1280, 720);

    #[derive(Default)]
    struct Log {
        updates: usize,
        renders: Vec<CameraId>,
        released: usize,
        created: Vec<u64>,
    }

    struct Recording {
        log: Arc<Mutex<Log>>,
        fail_for: Option<CameraId>,
    }

    impl ContentRenderer for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        fn update(&mut self, _cs: &CoordinateSystem, _frame: &FrameHandle) {
            self.log.lock().updates += 1;
        }
        fn render(&mut self, target: &CameraRenderTarget<'_>) -> Result<(), RenderError> {
            assert!(target.back_buffer().is_some());
            assert!(target.depth_buffer().is_some());
            if Some(target.camera_id()) == self.fail_for {
                return Err(RenderError::Failed("shader missing".into()));
            }
            self.log.lock().renders.push(target.camera_id());
            Ok(())
        }
        fn release_device_resources(&mut self) {
            self.log.lock().released += 1;
        }
        fn create_device_resources(&mut self, device: &DeviceInfo) {
            self.log.lock().created.push(device.generation);
        }
    }

    struct Fixture {
        control: Arc<DeviceControl>,
        owner: Arc<GraphicsDeviceOwner>,
        pipeline: FramePipeline,
        log: Arc<Mutex<Log>>,
        cs: CoordinateSystem,
    }

    fn fixture(cameras: &[(u32, RenderTargetSize)], fail_for: Option<u32>) -> Fixture {
        let control = DeviceControl::new();
        let owner = Arc::new(
            GraphicsDeviceOwner::new(Box::new(HeadlessDeviceFactory::new(control.clone()))).unwrap(),
        );
        let mut platform = HeadlessPlatform::new(control.clone());
        for &(id, size) in cameras {
            let descriptor = CameraDescriptor::new(size, true);
            owner.add_camera(CameraId(id), descriptor.clone());
            platform.attach_camera(CameraId(id), descriptor);
        }
        let mut pipeline = FramePipeline::new(owner.clone(), Box::new(platform));
        let log = Arc::new(Mutex::new(Log::default()));
        pipeline.add_renderer(Box::new(Recording {
            log: log.clone(),
            fail_for: fail_for.map(CameraId),
        }));
        Fixture {
            control,
            owner,
            pipeline,
            log,
            cs: CoordinateSystem::stationary(1),
        }
    }

    #[test]
    fn tick_renders_and_presents_every_camera() {
        let mut f = fixture(&[(1, SIZE), (2, SIZE)], None);
        let report = f.pipeline.tick(&f.cs).unwrap();

        assert!(report.presented);
        assert!(!report.device_recovered);
        assert_eq!(report.cameras_rendered, vec![CameraId(1), CameraId(2)]);
        assert!(report.cameras_skipped.is_empty());
        assert_eq!(f.log.lock().updates, 1);
        assert_eq!(f.pipeline.frames_presented(), 1);
        // Pending flags were consumed by the draw step.
        f.owner.with_cameras(|t| assert!(t.iter().all(|r| !r.is_frame_pending())));
    }

    #[test]
    fn device_loss_on_present_rebuilds_both_cameras() {
        let mut f = fixture(&[(1, SIZE), (2, SIZE)], None);
        f.pipeline.tick(&f.cs).unwrap();

        f.control.lose_device_on_present(DeviceLossReason::Removed);
        let report = f.pipeline.tick(&f.cs).unwrap();
        assert!(report.device_recovered);
        assert!(!report.presented);
        assert_eq!(f.control.live_resources(), 0);
        f.owner.with_cameras(|t| {
            assert_eq!(t.ids(), vec![CameraId(1), CameraId(2)]);
            assert!(t.iter().all(|r| r.is_empty()));
        });
        {
            let log = f.log.lock();
            assert_eq!(log.released, 1);
            assert_eq!(log.created, vec![1, 2]);
        }

        let report = f.pipeline.tick(&f.cs).unwrap();
        assert!(report.presented);
        assert_eq!(report.cameras_rendered, vec![CameraId(1), CameraId(2)]);
        f.owner.with_cameras(|t| {
            assert!(t.iter().all(|r| r.device_generation() == 2 && r.back_buffer().is_some()));
        });
    }

    #[test]
    fn device_loss_during_update_ends_tick() {
        let mut f = fixture(&[(1, SIZE)], None);
        f.control.lose_device_on_next_resource(DeviceLossReason::Reset);

        let report = f.pipeline.tick(&f.cs).unwrap();
        assert!(report.device_recovered);
        assert_eq!(f.log.lock().updates, 0);
        assert_eq!(f.owner.device_info().generation, 2);
    }

    #[test]
    fn failing_renderer_skips_only_its_camera() {
        let mut f = fixture(&[(1, SIZE), (2, SIZE)], Some(2));
        let report = f.pipeline.tick(&f.cs).unwrap();

        assert!(report.presented);
        assert_eq!(report.cameras_rendered, vec![CameraId(1)]);
        assert_eq!(report.cameras_skipped, vec![CameraId(2)]);
    }

    #[test]
    fn resource_failure_skips_only_its_camera() {
        let small = RenderTargetSize::new(320, 240);
        let mut f = fixture(&[(1, SIZE), (2, small)], None);
        f.control.fail_render_target_size(small);

        let report = f.pipeline.tick(&f.cs).unwrap();
        assert!(report.presented);
        assert_eq!(report.cameras_rendered, vec![CameraId(1)]);
        assert_eq!(report.cameras_skipped, vec![CameraId(2)]);
        assert_eq!(f.log.lock().renders, vec![CameraId(1)]);
    }

    #[test]
    fn other_present_failure_does_not_recover() {
        let mut f = fixture(&[(1, SIZE)], None);
        f.control.fail_next_present("swap chain busy");

        let report = f.pipeline.tick(&f.cs).unwrap();
        assert!(!report.presented);
        assert!(!report.device_recovered);
        assert_eq!(f.control.devices_created(), 1);
    }

    #[test]
    fn failed_recovery_is_fatal() {
        let mut f = fixture(&[(1, SIZE)], None);
        f.control.fail_device_creation(1);
        f.control.lose_device_on_present(DeviceLossReason::Removed);

        let err = f.pipeline.tick(&f.cs).unwrap_err();
        assert!(matches!(err, HoloError::DeviceUnavailable(_)));
        assert!(f.pipeline.tick(&f.cs).is_err());
    }

    #[test]
    fn pose_for_unknown_camera_is_skipped() {
        let control = DeviceControl::new();
        let owner = Arc::new(
            GraphicsDeviceOwner::new(Box::new(HeadlessDeviceFactory::new(control.clone()))).unwrap(),
        );
        let descriptor = CameraDescriptor::new(SIZE, false);
        owner.add_camera(CameraId(1), descriptor.clone());
        let mut platform = HeadlessPlatform::new(control);
        platform.attach_camera(CameraId(1), descriptor.clone());
        platform.attach_camera(CameraId(9), descriptor);

        let mut pipeline = FramePipeline::new(owner.clone(), Box::new(platform));
        let report = pipeline.tick(&CoordinateSystem::stationary(1)).unwrap();
        assert!(report.presented);
        assert_eq!(report.cameras_rendered, vec![CameraId(1)]);
        assert_eq!(report.cameras_skipped, vec![CameraId(9)]);
        assert_eq!(owner.camera_ids(), vec![CameraId(1)]);
    }

    struct RemovesCamera {
        owner: Arc<GraphicsDeviceOwner>,
        camera: CameraId,
    }

    impl ContentRenderer for RemovesCamera {
        fn name(&self) -> &str {
            "removes-camera"
        }
        fn update(&mut self, _cs: &CoordinateSystem, _frame: &FrameHandle) {
            self.owner.remove_camera(self.camera);
        }
        fn render(&mut self, target: &CameraRenderTarget<'_>) -> Result<(), RenderError> {
            assert_ne!(target.camera_id(), self.camera);
            Ok(())
        }
    }

    #[test]
    fn camera_removed_after_update_is_not_drawn() {
        let mut f = fixture(&[(1, SIZE), (2, SIZE)], None);
        f.pipeline.add_renderer(Box::new(RemovesCamera {
            owner: f.owner.clone(),
            camera: CameraId(2),
        }));

        let report = f.pipeline.tick(&f.cs).unwrap();
        assert!(report.presented);
        assert_eq!(report.cameras_rendered, vec![CameraId(1)]);
        assert!(report.cameras_skipped.is_empty());
        assert_eq!(f.log.lock().renders, vec![CameraId(1)]);
        assert_eq!(f.owner.camera_ids(), vec![CameraId(1)]);
    }

    #[test]
    fn acquisition_error_propagates_without_recovery() {
        let mut f = fixture(&[(1, SIZE)], None);
        f.control.fail_next_acquire("compositor unavailable");

        let err = f.pipeline.tick(&f.cs).unwrap_err();
        assert!(matches!(err, HoloError::Platform(_)));
        assert_eq!(f.control.devices_created(), 1);

        let report = f.pipeline.tick(&f.cs).unwrap();
        assert!(report.presented);
    }

    #[test]
    fn no_cameras_means_not_presented() {
        let mut f = fixture(&[], None);
        let report = f.pipeline.tick(&f.cs).unwrap();
        assert!(!report.presented);
        assert!(report.cameras_rendered.is_empty());
    }
}
