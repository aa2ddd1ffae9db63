//! Forward pass content provider
//!
//! Draws a single triangle whose vertices come from the vertex shader. Each
//! swapchain image gets its own framebuffer, uniform buffer and descriptor
//! set, so the per-frame uniform write never touches memory that an earlier
//! frame still reads.

use ash::{vk, Device};

use super::context::{PhysicalDeviceInfo, VulkanContext};
use super::resources::{
    Buffer, DescriptorPool, DescriptorSetLayout, Framebuffer, GraphicsPipeline, RenderPass, ShaderModule,
};
use crate::core::config::ShaderConfig;
use crate::render::content::{FrameContext, RenderContent, RenderPassCommands};
use crate::render::error::{checked_index, RenderError, RenderResult};
use crate::render::swapchain::Swapchain;

/// Per-image uniform block (std140: one vec4)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameUniforms {
    /// Seconds since the frame loop started
    pub elapsed_seconds: f32,
    /// Seconds since the previous frame
    pub delta_seconds: f32,
    /// Swapchain width over height
    pub aspect_ratio: f32,
    /// Frame slot that wrote this block
    pub frame_index: f32,
}

unsafe impl bytemuck::Pod for FrameUniforms {}
unsafe impl bytemuck::Zeroable for FrameUniforms {}

impl FrameUniforms {
    /// Uniform values for one frame
    #[allow(clippy::cast_precision_loss)]
    pub fn from_frame(frame: &FrameContext) -> Self {
        Self {
            elapsed_seconds: frame.elapsed_seconds,
            delta_seconds: frame.delta_seconds,
            aspect_ratio: frame.extent.width as f32 / frame.extent.height.max(1) as f32,
            frame_index: frame.frame_index as f32,
        }
    }
}

// Field order is drop order: framebuffers and pipeline before the render pass
struct SwapchainTargets {
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    descriptor_sets: Vec<vk::DescriptorSet>,
    #[allow(dead_code)] // owns descriptor_sets
    descriptor_pool: DescriptorPool,
    uniform_buffers: Vec<Buffer>,
    extent: vk::Extent2D,
}

/// Colour-only forward pass over caller-supplied SPIR-V shaders
pub struct ForwardPassContent {
    targets: Option<SwapchainTargets>,
    set_layout: DescriptorSetLayout,
    vertex_shader: ShaderModule,
    fragment_shader: ShaderModule,
    physical_device: PhysicalDeviceInfo,
    device: Device,
    clear_color: [f32; 4],
}

impl ForwardPassContent {
    /// Load the shader pair and create the swapchain-independent objects
    ///
    /// The content keeps a clone of the context's device and must be
    /// dropped before the context; the frame loop's field order does this.
    pub fn from_shader_config(context: &VulkanContext, shaders: &ShaderConfig) -> RenderResult<Self> {
        shaders.validate()?;
        let device = context.raw_device();

        let vertex_shader = ShaderModule::from_file(device.clone(), &shaders.vertex_shader_path)?;
        let fragment_shader = ShaderModule::from_file(device.clone(), &shaders.fragment_shader_path)?;
        let set_layout = DescriptorSetLayout::uniform_buffer(
            device.clone(),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        )?;

        Ok(Self {
            targets: None,
            set_layout,
            vertex_shader,
            fragment_shader,
            physical_device: context.physical_device().clone(),
            device,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        })
    }

    /// Set the colour the render pass clears to
    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    fn targets(&self) -> RenderResult<&SwapchainTargets> {
        self.targets
            .as_ref()
            .ok_or_else(|| RenderError::invalid("Forward pass targets not created"))
    }

    fn build_targets(&self, swapchain: &Swapchain) -> RenderResult<SwapchainTargets> {
        let info = swapchain.info();
        let render_pass = RenderPass::new_forward_pass(self.device.clone(), info.surface_format.format)?;
        let pipeline = GraphicsPipeline::new(
            self.device.clone(),
            render_pass.handle(),
            &self.vertex_shader,
            &self.fragment_shader,
            self.set_layout.handle(),
        )?;

        let framebuffers = swapchain
            .image_views()
            .into_iter()
            .map(|view| Framebuffer::new(self.device.clone(), render_pass.handle(), &[view], info.extent))
            .collect::<RenderResult<Vec<_>>>()?;

        let uniform_buffers = (0..info.image_count)
            .map(|_| {
                Buffer::new(
                    self.device.clone(),
                    &self.physical_device,
                    std::mem::size_of::<FrameUniforms>() as vk::DeviceSize,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let set_count = u32::try_from(info.image_count).map_err(|_| RenderError::invalid("Too many swapchain images"))?;
        let descriptor_pool = DescriptorPool::for_uniform_buffers(self.device.clone(), set_count)?;
        let descriptor_sets = descriptor_pool.allocate_uniform_sets(&self.set_layout, &uniform_buffers)?;

        Ok(SwapchainTargets {
            framebuffers,
            pipeline,
            render_pass,
            descriptor_sets,
            descriptor_pool,
            uniform_buffers,
            extent: info.extent,
        })
    }
}

impl RenderContent for ForwardPassContent {
    fn create_targets(&mut self, swapchain: &Swapchain) -> RenderResult<()> {
        self.targets = None;
        let targets = self.build_targets(swapchain)?;
        log::debug!(
            "Forward pass targets created for {} images at {}x{}",
            targets.framebuffers.len(),
            targets.extent.width,
            targets.extent.height
        );
        self.targets = Some(targets);
        Ok(())
    }

    fn destroy_targets(&mut self) {
        if self.targets.take().is_some() {
            log::trace!("Forward pass targets destroyed");
        }
    }

    fn render_pass_commands(&self, image_index: usize) -> RenderResult<RenderPassCommands> {
        let targets = self.targets()?;
        let framebuffer = checked_index("framebuffer", &targets.framebuffers, image_index)?;
        let descriptor_set = *checked_index("descriptor set", &targets.descriptor_sets, image_index)?;

        Ok(RenderPassCommands {
            render_pass: targets.render_pass.handle(),
            framebuffer: framebuffer.handle(),
            extent: targets.extent,
            clear_color: self.clear_color,
            pipeline: targets.pipeline.handle(),
            pipeline_layout: targets.pipeline.layout(),
            descriptor_set: Some(descriptor_set),
            vertex_count: 3,
            instance_count: 1,
        })
    }

    fn update_frame(&mut self, frame: &FrameContext) -> RenderResult<()> {
        let targets = self.targets()?;
        let buffer = checked_index("uniform buffer", &targets.uniform_buffers, frame.image_index)?;
        buffer.write(&FrameUniforms::from_frame(frame))
    }
}
