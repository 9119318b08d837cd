//! Graphics device ownership and device-loss recovery.

pub mod backend;
pub mod owner;

pub use backend::{
    DeviceFactory, DeviceInfo, DeviceResource, GraphicsDevice, OwnedResource, ResourceId,
    ResourceKind,
};
pub use owner::{DeviceNotify, DeviceState, GraphicsDeviceOwner};
