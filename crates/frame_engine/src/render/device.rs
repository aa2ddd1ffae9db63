//! GPU device seam
//!
//! [`GpuDevice`] is the narrow set of device, queue and surface calls the
//! frame loop needs. The Vulkan backend implements it on top of `ash`; the
//! test suite implements it with a simulated GPU timeline.
//!
//! Handles are plain `ash::vk` handles. Ownership is expressed one level up
//! by the RAII wrappers in [`super::sync`], [`super::swapchain`] and
//! [`super::commands`], which hold an `Arc<dyn GpuDevice>` and call the
//! matching `destroy_*` method on drop.

use ash::vk;
use std::sync::Arc;

use super::error::RenderResult;

/// Result of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired and its semaphore will be signaled
    Acquired {
        /// Index into the swapchain image array
        image_index: u32,
        /// The swapchain still works but no longer matches the surface exactly
        suboptimal: bool,
    },
    /// The swapchain can no longer be used; nothing was signaled
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented normally
    Presented,
    /// Presented, but the swapchain should be rebuilt
    Suboptimal,
    /// Not presented, the swapchain must be rebuilt
    OutOfDate,
}

impl PresentOutcome {
    /// Whether this outcome calls for swapchain recreation
    pub fn needs_recreation(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// How swapchain images are shared between queue families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSharing {
    /// Graphics and present share one family
    Exclusive,
    /// Graphics and present families differ: `[graphics, present]`
    Concurrent([u32; 2]),
}

/// Everything needed to create a swapchain, already resolved against the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    /// Chosen image format and colour space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Image extent in pixels, never zero
    pub extent: vk::Extent2D,
    /// Chosen present mode
    pub present_mode: vk::PresentModeKHR,
    /// Minimum image count requested from the driver
    pub min_image_count: u32,
    /// Surface pre-transform
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Queue family sharing mode
    pub sharing: ImageSharing,
}

/// One frame's queue submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSubmission {
    /// Signaled by image acquisition
    pub wait_semaphore: vk::Semaphore,
    /// Stage that waits on `wait_semaphore`
    pub wait_stage: vk::PipelineStageFlags,
    /// Pre-recorded command buffer for the acquired image
    pub command_buffer: vk::CommandBuffer,
    /// Signaled when rendering finishes, waited on by presentation
    pub signal_semaphore: vk::Semaphore,
    /// Signaled when the submitted work completes
    pub fence: vk::Fence,
}

/// Device, queue and surface operations used by the frame loop
///
/// Every fallible call returns `Err` only for unrecoverable conditions.
/// Swapchain staleness comes back as [`AcquireOutcome::OutOfDate`] or
/// [`PresentOutcome`] instead.
pub trait GpuDevice: Send + Sync {
    // Synchronization primitives

    /// Create a binary semaphore
    fn create_semaphore(&self) -> RenderResult<vk::Semaphore>;
    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> RenderResult<vk::Fence>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);
    /// Block until the fence is signaled or the timeout (nanoseconds) expires
    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> RenderResult<()>;
    /// Return the fence to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()>;
    /// Non-blocking query of the fence state
    fn fence_status(&self, fence: vk::Fence) -> RenderResult<bool>;
    /// Block until all queued work on the device has finished
    fn wait_idle(&self) -> RenderResult<()>;

    // Surface and swapchain

    /// Current surface capabilities
    fn surface_capabilities(&self) -> RenderResult<vk::SurfaceCapabilitiesKHR>;
    /// Formats the surface supports
    fn surface_formats(&self) -> RenderResult<Vec<vk::SurfaceFormatKHR>>;
    /// Present modes the surface supports
    fn surface_present_modes(&self) -> RenderResult<Vec<vk::PresentModeKHR>>;
    /// Create a swapchain
    fn create_swapchain(&self, desc: &SwapchainDesc) -> RenderResult<vk::SwapchainKHR>;
    /// Destroy a swapchain (its images go with it)
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// Images owned by the swapchain
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>>;
    /// Create a 2D colour view of a swapchain image
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> RenderResult<vk::ImageView>;
    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);
    /// Acquire the next presentable image, signaling `semaphore` on success
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> RenderResult<AcquireOutcome>;
    /// Submit one frame's work to the graphics queue
    fn queue_submit(&self, submission: &FrameSubmission) -> RenderResult<()>;
    /// Queue `image_index` for presentation after `wait_semaphore`
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RenderResult<PresentOutcome>;

    // Command buffers

    /// Create a command pool whose buffers may be reset individually
    fn create_command_pool(&self, queue_family_index: u32) -> RenderResult<vk::CommandPool>;
    /// Destroy a command pool and every buffer allocated from it
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    /// Allocate primary command buffers
    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> RenderResult<Vec<vk::CommandBuffer>>;
    /// Return command buffers to their pool
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    /// Begin recording
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RenderResult<()>;
    /// Finish recording
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RenderResult<()>;
    /// Record a render pass begin with a single colour clear value
    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    );
    /// Bind a graphics pipeline
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    /// Bind a descriptor set at set index 0
    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        descriptor_set: vk::DescriptorSet,
    );
    /// Set a full-extent viewport and scissor
    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D);
    /// Record a non-indexed draw
    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
    /// Record a render pass end
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
}

/// Shared handle to the device plus the queue families the frame loop uses
///
/// Cloning is cheap. The device is destroyed when the last clone (and every
/// RAII wrapper holding the inner `Arc`) is gone.
#[derive(Clone)]
pub struct GpuDeviceContext {
    device: Arc<dyn GpuDevice>,
    graphics_family: u32,
    present_family: u32,
}

impl GpuDeviceContext {
    /// Wrap a device with its graphics and present queue family indices
    pub fn new(device: Arc<dyn GpuDevice>, graphics_family: u32, present_family: u32) -> Self {
        Self {
            device,
            graphics_family,
            present_family,
        }
    }

    /// The device
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    /// Graphics queue family index
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Present queue family index
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    /// Sharing mode swapchain images need for these queue families
    pub fn image_sharing(&self) -> ImageSharing {
        if self.graphics_family == self.present_family {
            ImageSharing::Exclusive
        } else {
            ImageSharing::Concurrent([self.graphics_family, self.present_family])
        }
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> RenderResult<()> {
        self.device.wait_idle()
    }
}

impl std::fmt::Debug for GpuDeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuDeviceContext")
            .field("graphics_family", &self.graphics_family)
            .field("present_family", &self.present_family)
            .finish_non_exhaustive()
    }
}
