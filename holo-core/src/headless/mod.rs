//! Headless backends for the graphics device, the holographic platform
//! and the remoting runtime. They keep everything in memory and expose
//! counters and fault switches, so the pipeline and the session can be
//! driven without a headset or GPU.

mod device;
mod platform;
mod runtime;

pub use device::{DeviceControl, HeadlessDeviceFactory};
pub use platform::{HeadlessPlatform, MAX_BUFFERS_PER_CAMERA};
pub use runtime::{
    EPHEMERAL_PORT_BASE, HeadlessRuntime, RuntimeCommand, RuntimeControl, SimulatedPeer,
};
