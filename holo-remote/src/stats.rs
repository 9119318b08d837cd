//! Frame statistics, gathered as a content renderer.
//!
//! The latest [`FrameStats`] is published via a `tokio::sync::watch`
//! channel so the host can report it without touching the render thread.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use holo_core::device::DeviceInfo;
use holo_core::{CameraRenderTarget, ContentRenderer, CoordinateSystem, FrameHandle, RenderError};
use tokio::sync::watch;

/// Frame-time samples used for the smoothed fps.
const FPS_WINDOW: usize = 60;

// ── FrameStats ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Smoothed frames per second.
    pub fps: f64,
    /// Frames seen since start.
    pub total_frames: u64,
    /// Camera draws since start.
    pub cameras_drawn: u64,
    /// Generation of the device currently in use.
    pub device_generation: u64,
    /// Device losses survived.
    pub device_resets: u64,
}

// ── StatsRenderer ────────────────────────────────────────────────

pub struct StatsRenderer {
    samples: VecDeque<Duration>,
    last_frame: Option<Instant>,
    ready: bool,
    stats: FrameStats,
    stats_tx: watch::Sender<FrameStats>,
}

impl StatsRenderer {
    pub fn new() -> Self {
        let (stats_tx, _) = watch::channel(FrameStats::default());
        Self {
            samples: VecDeque::with_capacity(FPS_WINDOW),
            last_frame: None,
            ready: false,
            stats: FrameStats::default(),
            stats_tx,
        }
    }

    pub fn stats_receiver(&self) -> watch::Receiver<FrameStats> {
        self.stats_tx.subscribe()
    }

    fn record_frame(&mut self, at: Instant) {
        if let Some(last) = self.last_frame {
            if self.samples.len() == FPS_WINDOW {
                self.samples.pop_front();
            }
            self.samples.push_back(at.saturating_duration_since(last));
        }
        self.last_frame = Some(at);

        let avg_secs = if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / self.samples.len() as f64
        };
        self.stats.fps = if avg_secs > 0.0 { 1.0 / avg_secs } else { 0.0 };
        self.stats.total_frames += 1;
        self.stats_tx.send_replace(self.stats.clone());
    }
}

impl Default for StatsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentRenderer for StatsRenderer {
    fn name(&self) -> &str {
        "frame-stats"
    }

    fn update(&mut self, _coordinate_system: &CoordinateSystem, frame: &FrameHandle) {
        self.record_frame(frame.acquired_at);
    }

    fn render(&mut self, _target: &CameraRenderTarget<'_>) -> Result<(), RenderError> {
        if !self.ready {
            return Err(RenderError::NotReady);
        }
        self.stats.cameras_drawn += 1;
        Ok(())
    }

    fn release_device_resources(&mut self) {
        self.ready = false;
    }

    fn create_device_resources(&mut self, device: &DeviceInfo) {
        if self.stats.device_generation != 0 && device.generation != self.stats.device_generation {
            self.stats.device_resets += 1;
        }
        self.stats.device_generation = device.generation;
        self.ready = true;
        self.stats_tx.send_replace(self.stats.clone());
    }
}
