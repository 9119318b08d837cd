//! Simulated holographic platform: paced frames, one pose per attached
//! camera, back buffers cycling through a small swap chain.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::{CameraDescriptor, CameraId};
use crate::device::DeviceInfo;
use crate::error::HoloError;
use crate::frame::{
    BackBufferHandle, CameraPose, FrameHandle, FrameId, HolographicPlatform, IDENTITY,
    PresentOutcome, ViewProjection, Viewport,
};
use crate::headless::DeviceControl;

/// Back buffers a camera can rotate through. The slot occupies the low
/// byte of the [`BackBufferHandle`].
pub const MAX_BUFFERS_PER_CAMERA: u32 = 256;

struct SimulatedCamera {
    descriptor: CameraDescriptor,
    tracking_lost: bool,
}

pub struct HeadlessPlatform {
    control: Arc<DeviceControl>,
    cameras: BTreeMap<CameraId, SimulatedCamera>,
    buffers_per_camera: u32,
    frame_interval: Duration,
    last_frame: Option<Instant>,
    next_frame: u64,
    generation: u64,
}

impl HeadlessPlatform {
    pub fn new(control: Arc<DeviceControl>) -> Self {
        Self {
            control,
            cameras: BTreeMap::new(),
            buffers_per_camera: 2,
            frame_interval: Duration::ZERO,
            last_frame: None,
            next_frame: 0,
            generation: 0,
        }
    }

    /// Back buffers each camera cycles through, clamped to
    /// `1..=MAX_BUFFERS_PER_CAMERA`.
    pub fn with_buffers_per_camera(mut self, buffers: u32) -> Self {
        self.buffers_per_camera = buffers.clamp(1, MAX_BUFFERS_PER_CAMERA);
        self
    }

    /// Minimum time between frames. Zero disables pacing.
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    pub fn attach_camera(&mut self, id: CameraId, descriptor: CameraDescriptor) {
        self.cameras.insert(
            id,
            SimulatedCamera {
                descriptor,
                tracking_lost: false,
            },
        );
    }

    pub fn detach_camera(&mut self, id: CameraId) -> bool {
        self.cameras.remove(&id).is_some()
    }

    /// While tracking is lost the camera's pose carries no view transform.
    pub fn set_tracking_lost(&mut self, id: CameraId, lost: bool) {
        if let Some(camera) = self.cameras.get_mut(&id) {
            camera.tracking_lost = lost;
        }
    }

    fn back_buffer(&self, camera: CameraId, frame: u64) -> BackBufferHandle {
        let slot = frame % u64::from(self.buffers_per_camera);
        BackBufferHandle((self.generation << 40) | (u64::from(camera.0) << 8) | slot)
    }
}

impl HolographicPlatform for HeadlessPlatform {
    fn bind_device(&mut self, device: &DeviceInfo) {
        self.generation = device.generation;
    }

    fn wait_for_frame_ready(&mut self) -> Result<(), HoloError> {
        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
        Ok(())
    }

    fn acquire_frame(&mut self) -> Result<FrameHandle, HoloError> {
        if let Some(message) = self.control.take_acquire_failure() {
            return Err(HoloError::Platform(message));
        }
        self.next_frame += 1;
        let frame = self.next_frame;
        let poses = self
            .cameras
            .iter()
            .map(|(&id, camera)| {
                let size = camera.descriptor.render_target_size;
                let view_projection = (!camera.tracking_lost).then(|| {
                    if camera.descriptor.stereo {
                        ViewProjection::stereo(IDENTITY, IDENTITY)
                    } else {
                        ViewProjection::mono(IDENTITY)
                    }
                });
                CameraPose {
                    camera_id: id,
                    back_buffer: self.back_buffer(id, frame),
                    render_target_size: size,
                    viewport: Viewport::covering(size),
                    view_projection,
                }
            })
            .collect();
        Ok(FrameHandle::new(FrameId(frame), poses))
    }

    fn present(&mut self, frame: &FrameHandle) -> PresentOutcome {
        self.control.present_outcome(frame.id)
    }
}
