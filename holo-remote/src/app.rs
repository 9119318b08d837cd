//! The host render loop.
//!
//! Wires the headless device, platform and remoting runtime into a
//! [`SessionFrameCoordinator`] and ticks it until stopped. Runs on a
//! blocking thread; the tokio runtime handle only serves deferred
//! retries and the simulated peer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use holo_core::headless::{
    DeviceControl, HeadlessDeviceFactory, HeadlessPlatform, HeadlessRuntime, RuntimeControl,
    SimulatedPeer,
};
use holo_core::session::STATUS_CHANNEL;
use holo_core::{
    CameraId, ChannelMessage, CoordinateSystem, FramePipeline, GraphicsDeviceOwner, HoloError,
    RemoteSessionController, SessionFrameCoordinator, SessionStatus,
};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::RemoteConfig;
use crate::stats::{FrameStats, StatsRenderer};

/// Send a keep-alive ping on the data channel this often.
const PING_EVERY_FRAMES: u64 = 120;

/// Totals reported when the loop ends.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub frames: u64,
    pub frames_presented: u64,
    pub device_recoveries: u64,
    pub session_attempts: u64,
    pub stats: FrameStats,
}

pub struct RemoteApp {
    coordinator: Arc<SessionFrameCoordinator>,
    pipeline: FramePipeline,
    stats_rx: watch::Receiver<FrameStats>,
    status_rx: watch::Receiver<SessionStatus>,
    running: Arc<AtomicBool>,
    ping_seq: u32,
}

impl RemoteApp {
    pub fn new(config: &RemoteConfig, runtime: Handle) -> Result<Self, HoloError> {
        let device_control = DeviceControl::new();
        device_control.lose_device_every(config.device_loss_every());

        let owner = Arc::new(GraphicsDeviceOwner::new(Box::new(HeadlessDeviceFactory::new(
            device_control.clone(),
        )))?);

        let mut platform = HeadlessPlatform::new(device_control)
            .with_buffers_per_camera(config.display.buffers_per_camera)
            .with_frame_interval(config.frame_interval());
        let descriptor = config.camera_descriptor();
        for id in 0..config.display.camera_count {
            owner.add_camera(CameraId(id), descriptor.clone());
            platform.attach_camera(CameraId(id), descriptor.clone());
        }

        let stats = StatsRenderer::new();
        let stats_rx = stats.stats_receiver();
        let mut pipeline = FramePipeline::new(owner.clone(), Box::new(platform));
        pipeline.add_renderer(Box::new(stats));

        let peer = SimulatedPeer {
            handle: runtime.clone(),
            latency: config.connect_latency(),
            drop_after: config.drop_connection_after(),
        };
        let remoting = HeadlessRuntime::simulated(RuntimeControl::new(), peer);
        let session = Arc::new(RemoteSessionController::new(
            Box::new(remoting),
            config.session_options(),
            runtime,
        ));
        let status_rx = session.subscribe_status();

        Ok(Self {
            coordinator: SessionFrameCoordinator::new(session, owner),
            pipeline,
            stats_rx,
            status_rx,
            running: Arc::new(AtomicBool::new(true)),
            ping_seq: 0,
        })
    }

    /// Clear the flag to end [`run`](Self::run) after the current frame.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Tick until stopped or `max_frames` frames have run.
    ///
    /// A failed device recovery ends the loop with an error; everything
    /// else is logged and survived.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<RunSummary, HoloError> {
        if let Err(e) = self.coordinator.start() {
            warn!("session start failed: {e}; retry scheduled");
        }

        let coordinate_system = CoordinateSystem::stationary(1);
        let mut frames = 0u64;
        while self.running.load(Ordering::SeqCst) && max_frames.is_none_or(|max| frames < max) {
            let report = match self.coordinator.tick(&mut self.pipeline, &coordinate_system) {
                Ok(report) => report,
                Err(e) => {
                    error!("render loop stopped: {e}");
                    self.coordinator.stop();
                    return Err(e);
                }
            };
            frames += 1;

            if report.device_recovered {
                info!(frame = frames, "graphics device recovered");
            }
            self.log_status();
            if frames % PING_EVERY_FRAMES == 0 {
                self.ping();
            }
        }

        self.coordinator.stop();
        self.coordinator.session().dispatch_pending();
        self.log_status();

        let summary = RunSummary {
            frames,
            frames_presented: self.pipeline.frames_presented(),
            device_recoveries: self.coordinator.device().recoveries(),
            session_attempts: self.coordinator.session().status().attempts,
            stats: self.stats_rx.borrow().clone(),
        };
        info!(
            frames = summary.frames,
            presented = summary.frames_presented,
            recoveries = summary.device_recoveries,
            attempts = summary.session_attempts,
            fps = summary.stats.fps,
            "render loop finished"
        );
        Ok(summary)
    }

    fn ping(&mut self) {
        let session = self.coordinator.session();
        if !session.open_channels().contains(&STATUS_CHANNEL) {
            return;
        }
        self.ping_seq = self.ping_seq.wrapping_add(1);
        let ping = ChannelMessage::Ping { seq: self.ping_seq };
        if let Err(e) = session.send_message(STATUS_CHANNEL, &ping) {
            debug!("ping not sent: {e}");
        }
    }

    fn log_status(&mut self) {
        if !self.status_rx.has_changed().unwrap_or(false) {
            return;
        }
        let status = self.status_rx.borrow_and_update().clone();
        info!(
            phase = %status.phase,
            port = ?status.listening_port,
            "{}",
            status.message.as_deref().unwrap_or("")
        );
        if let Some(error) = &status.error {
            error!("{error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> RemoteConfig {
        let mut config = RemoteConfig::default();
        config.display.camera_count = 2;
        config.display.frame_interval_ms = 0;
        config.simulation.connect_latency_ms = 1;
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_requested_frames_through_device_loss() {
        let mut config = quick_config();
        config.simulation.device_loss_every_frames = 10;
        let mut app = RemoteApp::new(&config, Handle::current()).unwrap();

        let summary = tokio::task::spawn_blocking(move || app.run(Some(50)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(summary.frames, 50);
        assert_eq!(summary.device_recoveries, 5);
        assert_eq!(summary.frames_presented, 45);
        assert_eq!(summary.stats.device_resets, 5);
        assert!(summary.session_attempts >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cleared_stop_flag_ends_immediately() {
        let mut app = RemoteApp::new(&quick_config(), Handle::current()).unwrap();
        app.stop_handle().store(false, Ordering::SeqCst);

        let summary = tokio::task::spawn_blocking(move || app.run(None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.frames, 0);
    }
}
