//! # holo-core
//!
//! Device-resilient frame pipeline and remote-session state machine for
//! holographic remoting hosts.
//!
//! This crate contains:
//! - **Camera**: `CameraResourceTable` with one `CameraResourceRecord` per attached camera
//! - **Device**: `GraphicsDeviceOwner`, which owns the GPU device and rebuilds it on loss
//! - **Frame**: `FramePipeline`, one wait → acquire → update → render → present tick
//! - **Session**: `RemoteSessionController` with failure classification and reconnect
//! - **Coordinator**: `SessionFrameCoordinator`, which restarts the session around device loss
//! - **Headless**: in-memory device, platform and runtime backends
//! - **Error**: `HoloError`, a typed `thiserror`-based error hierarchy

pub mod camera;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod frame;
pub mod headless;
pub mod session;
pub mod task;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use camera::{
    CameraDescriptor, CameraId, CameraResourceRecord, CameraResourceTable, RenderTargetSize,
};
pub use coordinator::SessionFrameCoordinator;
pub use device::{
    DeviceFactory, DeviceInfo, DeviceNotify, DeviceState, GraphicsDevice, GraphicsDeviceOwner,
};
pub use error::{DeviceError, DeviceLossReason, HoloError, RenderError, RuntimeError};
pub use frame::{
    CameraRenderTarget, ContentRenderer, CoordinateSystem, FrameHandle, FramePipeline,
    HolographicPlatform, PresentOutcome, TickReport,
};
pub use session::{
    ChannelId, ChannelMessage, FailureClass, FailureReason, RemoteSessionController,
    RemoteSessionState, RemotingRuntime, SessionEventSink, SessionOptions, SessionPhase,
    SessionStatus,
};
pub use task::DeferredTask;
