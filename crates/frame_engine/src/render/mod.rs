//! Rendering core
//!
//! Frame pacing, swapchain lifecycle and the per-frame submission protocol.
//! Everything in this module talks to the GPU through [`GpuDevice`]; the
//! concrete Vulkan implementation lives in [`backends::vulkan`].
//!
//! Component layering (leaf first):
//!
//! ```text
//! GpuDeviceContext -> SwapchainManager -> FrameSyncCoordinator -> CommandRecorder -> FrameOrchestrator
//! ```

pub mod backends;
pub mod commands;
pub mod content;
pub mod device;
pub mod error;
pub mod orchestrator;
pub mod swapchain;
pub mod sync;
pub mod sync_manager;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;

pub use commands::{CommandPool, CommandRecorder};
pub use content::{FrameContext, RenderContent, RenderPassCommands};
pub use device::{
    AcquireOutcome, FrameSubmission, GpuDevice, GpuDeviceContext, ImageSharing, PresentOutcome,
    SwapchainDesc,
};
pub use error::{RenderError, RenderResult};
pub use orchestrator::{FrameOrchestrator, FrameOutcome, FrameState, FrameStats};
pub use swapchain::{Swapchain, SwapchainInfo, SwapchainManager};
pub use sync::{Fence, FrameSlot, Semaphore};
pub use sync_manager::FrameSyncCoordinator;
pub use window::{WindowError, WindowResult, WindowSurface};

/// Default number of frame slots cycling through the frame loop
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Timeout used for every blocking fence wait and image acquisition
pub const WAIT_FOREVER: u64 = u64::MAX;
