//! Command buffer management
//!
//! One primary command buffer per swapchain image, each recorded once with a
//! full render pass and resubmitted every time its image is acquired. The
//! buffers are rebuilt whenever the swapchain or pipeline changes.

use ash::vk;
use std::sync::Arc;

use super::content::{RenderContent, RenderPassCommands};
use super::device::{GpuDevice, GpuDeviceContext};
use super::error::{checked_index, RenderError, RenderResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Arc<dyn GpuDevice>,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool whose buffers may be reset individually
    pub fn new(device: Arc<dyn GpuDevice>, queue_family_index: u32) -> RenderResult<Self> {
        let command_pool = device.create_command_pool(queue_family_index)?;
        Ok(Self { device, command_pool })
    }

    /// Allocate primary command buffers
    pub fn allocate_command_buffers(&self, count: u32) -> RenderResult<Vec<vk::CommandBuffer>> {
        self.device.allocate_command_buffers(self.command_pool, count)
    }

    /// Return command buffers to the pool
    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if !command_buffers.is_empty() {
            self.device.free_command_buffers(self.command_pool, command_buffers);
        }
    }

    /// Get the command pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        // Destroying the pool frees every buffer still allocated from it
        self.device.destroy_command_pool(self.command_pool);
    }
}

/// Per-image command buffer recorder
///
/// Tracks a recording flag per buffer so begin/end pairs cannot be
/// interleaved or repeated.
pub struct CommandRecorder {
    command_buffers: Vec<vk::CommandBuffer>,
    recording: Vec<bool>,
    command_pool: Option<CommandPool>,
    device: Arc<dyn GpuDevice>,
}

impl CommandRecorder {
    /// Create a recorder with no pool and no buffers
    pub fn new(ctx: &GpuDeviceContext) -> Self {
        Self {
            command_buffers: Vec::new(),
            recording: Vec::new(),
            command_pool: None,
            device: ctx.device().clone(),
        }
    }

    /// Create the command pool on the given queue family
    pub fn create_command_pool(&mut self, queue_family_index: u32) -> RenderResult<()> {
        if self.command_pool.is_some() {
            return Err(RenderError::invalid("Command pool already created"));
        }
        self.command_pool = Some(CommandPool::new(self.device.clone(), queue_family_index)?);
        Ok(())
    }

    fn pool(&self) -> RenderResult<&CommandPool> {
        self.command_pool
            .as_ref()
            .ok_or_else(|| RenderError::invalid("Command pool not created"))
    }

    /// Allocate `count` command buffers, freeing any previous set first
    pub fn create_command_buffers(&mut self, count: usize) -> RenderResult<()> {
        self.free_command_buffers();
        let count = u32::try_from(count).map_err(|_| RenderError::invalid("Too many command buffers"))?;
        let command_buffers = self.pool()?.allocate_command_buffers(count)?;
        log::debug!("Allocated {} command buffers", command_buffers.len());
        self.recording = vec![false; command_buffers.len()];
        self.command_buffers = command_buffers;
        Ok(())
    }

    /// Number of allocated command buffers
    pub fn buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    /// Command buffer for `image_index`
    pub fn command_buffer(&self, image_index: usize) -> RenderResult<vk::CommandBuffer> {
        checked_index("command buffer", &self.command_buffers, image_index).copied()
    }

    fn recording_flag(&mut self, image_index: usize) -> RenderResult<&mut bool> {
        let len = self.recording.len();
        self.recording.get_mut(image_index).ok_or(RenderError::IndexOutOfRange {
            kind: "command buffer",
            index: image_index,
            len,
        })
    }

    /// Begin recording buffer `image_index`
    pub fn begin_recording(&mut self, image_index: usize) -> RenderResult<()> {
        let command_buffer = self.command_buffer(image_index)?;
        if *self.recording_flag(image_index)? {
            return Err(RenderError::invalid(format!(
                "Command buffer {image_index} already recording"
            )));
        }

        self.device.begin_command_buffer(command_buffer)?;
        *self.recording_flag(image_index)? = true;
        Ok(())
    }

    /// Record clear, pipeline bind, draw and render pass end into buffer `image_index`
    pub fn setup_render_pass_commands(&mut self, commands: &RenderPassCommands, image_index: usize) -> RenderResult<()> {
        let command_buffer = self.command_buffer(image_index)?;
        if !*self.recording_flag(image_index)? {
            return Err(RenderError::invalid(format!(
                "Command buffer {image_index} not recording"
            )));
        }

        let device = &self.device;
        device.cmd_begin_render_pass(
            command_buffer,
            commands.render_pass,
            commands.framebuffer,
            commands.extent,
            commands.clear_color,
        );
        device.cmd_bind_pipeline(command_buffer, commands.pipeline);
        device.cmd_set_viewport_and_scissor(command_buffer, commands.extent);
        if let Some(descriptor_set) = commands.descriptor_set {
            device.cmd_bind_descriptor_set(command_buffer, commands.pipeline_layout, descriptor_set);
        }
        device.cmd_draw(command_buffer, commands.vertex_count, commands.instance_count);
        device.cmd_end_render_pass(command_buffer);
        Ok(())
    }

    /// Finish recording buffer `image_index`
    pub fn end_recording(&mut self, image_index: usize) -> RenderResult<()> {
        let command_buffer = self.command_buffer(image_index)?;
        if !*self.recording_flag(image_index)? {
            return Err(RenderError::invalid(format!(
                "Command buffer {image_index} not recording"
            )));
        }

        self.device.end_command_buffer(command_buffer)?;
        *self.recording_flag(image_index)? = false;
        Ok(())
    }

    /// Record every buffer from the content provider
    pub fn record_all<C: RenderContent + ?Sized>(&mut self, content: &C) -> RenderResult<()> {
        for image_index in 0..self.command_buffers.len() {
            let commands = content.render_pass_commands(image_index)?;
            self.begin_recording(image_index)?;
            self.setup_render_pass_commands(&commands, image_index)?;
            self.end_recording(image_index)?;
        }
        log::trace!("Recorded {} command buffers", self.command_buffers.len());
        Ok(())
    }

    /// Free every command buffer, keeping the pool
    pub fn free_command_buffers(&mut self) {
        if let Some(pool) = &self.command_pool {
            pool.free_command_buffers(&self.command_buffers);
        }
        self.command_buffers.clear();
        self.recording.clear();
    }

    /// Free every buffer and destroy the pool
    pub fn clean_up(&mut self) {
        self.free_command_buffers();
        self.command_pool = None;
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        self.clean_up();
    }
}
