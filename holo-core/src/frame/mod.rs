//! Per-tick frame pipeline and the seams it drives.
//!
//! | Module      | Purpose                                               |
//! |-------------|-------------------------------------------------------|
//! | `platform`  | Frame pacing primitives, poses, present outcome       |
//! | `renderer`  | Content renderer trait and the per-camera draw target |
//! | `pipeline`  | One rendering tick: wait → acquire → update → draw → present |

pub mod pipeline;
pub mod platform;
pub mod renderer;

pub use pipeline::{FramePipeline, TickReport};
pub use platform::{
    BackBufferHandle, CameraPose, CoordinateSystem, FrameHandle, FrameId, HolographicPlatform,
    IDENTITY, Matrix4, PresentOutcome, ViewProjection, Viewport,
};
pub use renderer::{CameraRenderTarget, ContentRenderer};
