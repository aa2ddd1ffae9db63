//! Content provider seam
//!
//! The frame loop does not know what is drawn. A [`RenderContent`] owns the
//! render pass, pipeline, framebuffers and per-image data, rebuilds them when
//! the swapchain changes and hands the recorder what it needs per image.

use ash::vk;

use super::error::RenderResult;
use super::swapchain::Swapchain;

/// Everything recorded into one per-image command buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassCommands {
    /// Render pass to begin
    pub render_pass: vk::RenderPass,
    /// Framebuffer wrapping the swapchain image
    pub framebuffer: vk::Framebuffer,
    /// Render area and viewport extent
    pub extent: vk::Extent2D,
    /// Colour attachment clear value
    pub clear_color: [f32; 4],
    /// Graphics pipeline to bind
    pub pipeline: vk::Pipeline,
    /// Layout the descriptor set is bound against
    pub pipeline_layout: vk::PipelineLayout,
    /// Optional per-image descriptor set
    pub descriptor_set: Option<vk::DescriptorSet>,
    /// Vertices per instance
    pub vertex_count: u32,
    /// Instance count
    pub instance_count: u32,
}

/// Per-frame information handed to [`RenderContent::update_frame`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Frame slot in use
    pub frame_index: usize,
    /// Swapchain image being rendered to
    pub image_index: usize,
    /// Seconds since the frame loop started
    pub elapsed_seconds: f32,
    /// Seconds since the previous frame
    pub delta_seconds: f32,
    /// Current swapchain extent
    pub extent: vk::Extent2D,
}

/// Pipeline and draw content driven by the frame loop
pub trait RenderContent {
    /// Build everything that depends on the swapchain (render pass,
    /// pipeline, framebuffers, per-image buffers)
    fn create_targets(&mut self, swapchain: &Swapchain) -> RenderResult<()>;

    /// Release everything built by [`create_targets`](Self::create_targets)
    ///
    /// Called with the device idle. Must be safe to call when nothing exists.
    fn destroy_targets(&mut self);

    /// What to record for `image_index`
    fn render_pass_commands(&self, image_index: usize) -> RenderResult<RenderPassCommands>;

    /// Write per-frame dynamic data
    ///
    /// The acquired image's previous frame has completed when this runs, so
    /// data owned per image may be overwritten.
    fn update_frame(&mut self, frame: &FrameContext) -> RenderResult<()>;
}
