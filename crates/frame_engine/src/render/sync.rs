//! Synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences plus [`FrameSlot`], the bundle of
//! primitives one frame in flight owns.
//!
//! ### GPU-GPU Synchronization (Semaphores)
//! ```text
//! acquire image  -> signal image_acquired  -> submit waits at COLOR_ATTACHMENT_OUTPUT
//! submit         -> signal render_finished -> present waits
//! ```
//!
//! ### CPU-GPU Synchronization (Fences)
//! ```text
//! CPU: reset fence, submit work with fence
//! GPU: [processing...] -> signal fence
//! CPU: wait on fence before reusing the slot
//! ```
//!
//! Fences are created signaled so the first wait on a fresh slot returns
//! immediately.

use ash::vk;
use std::sync::Arc;

use super::device::GpuDevice;
use super::error::RenderResult;

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Arc<dyn GpuDevice>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Arc<dyn GpuDevice>) -> RenderResult<Self> {
        let semaphore = device.create_semaphore()?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Arc<dyn GpuDevice>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Arc<dyn GpuDevice>, signaled: bool) -> RenderResult<Self> {
        let fence = device.create_fence(signaled)?;
        Ok(Self { device, fence })
    }

    /// Wait for fence
    pub fn wait(&self, timeout: u64) -> RenderResult<()> {
        self.device.wait_for_fence(self.fence, timeout)
    }

    /// Reset fence
    pub fn reset(&self) -> RenderResult<()> {
        self.device.reset_fence(self.fence)
    }

    /// Whether the fence is currently signaled
    pub fn is_signaled(&self) -> RenderResult<bool> {
        self.device.fence_status(self.fence)
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
    }
}

/// Synchronization objects owned by one frame in flight
pub struct FrameSlot {
    /// Signaled when the acquired swapchain image is ready to be rendered to
    pub image_acquired: Semaphore,
    /// Signaled when this frame's rendering is done, waited on by presentation
    pub render_finished: Semaphore,
    /// Signaled when this frame's submitted commands have completed
    pub commands_complete: Fence,
}

impl FrameSlot {
    /// Create the slot's primitives; the fence starts signaled
    pub fn new(device: &Arc<dyn GpuDevice>) -> RenderResult<Self> {
        Ok(Self {
            image_acquired: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            commands_complete: Fence::new(device.clone(), true)?,
        })
    }
}
