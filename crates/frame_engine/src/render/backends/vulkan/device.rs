//! `GpuDevice` on top of `ash`
//!
//! A thin forwarding layer. The only logic here is mapping
//! `ERROR_OUT_OF_DATE_KHR` and the suboptimal flag onto the outcome enums.

use ash::vk;

use super::context::VulkanContext;
use crate::render::device::{AcquireOutcome, FrameSubmission, GpuDevice, ImageSharing, PresentOutcome, SwapchainDesc};
use crate::render::error::{RenderError, RenderResult};

impl GpuDevice for VulkanContext {
    fn create_semaphore(&self) -> RenderResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.device.create_semaphore(&create_info, None) }.map_err(RenderError::Api)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.device.destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> RenderResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.device.create_fence(&create_info, None) }.map_err(RenderError::Api)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> RenderResult<()> {
        unsafe { self.device.device.wait_for_fences(&[fence], true, timeout) }.map_err(RenderError::Api)
    }

    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()> {
        unsafe { self.device.device.reset_fences(&[fence]) }.map_err(RenderError::Api)
    }

    fn fence_status(&self, fence: vk::Fence) -> RenderResult<bool> {
        unsafe { self.device.device.get_fence_status(fence) }.map_err(RenderError::Api)
    }

    fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device.device_wait_idle() }.map_err(RenderError::Api)
    }

    fn surface_capabilities(&self) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device.device, self.surface)
        }
        .map_err(RenderError::Api)
    }

    fn surface_formats(&self) -> RenderResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.physical_device.device, self.surface)
        }
        .map_err(RenderError::Api)
    }

    fn surface_present_modes(&self) -> RenderResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.physical_device.device, self.surface)
        }
        .map_err(RenderError::Api)
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RenderResult<vk::SwapchainKHR> {
        let (sharing_mode, queue_families) = match &desc.sharing {
            ImageSharing::Exclusive => (vk::SharingMode::EXCLUSIVE, &[][..]),
            ImageSharing::Concurrent(families) => (vk::SharingMode::CONCURRENT, families.as_slice()),
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_families)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);

        unsafe { self.device.swapchain_loader.create_swapchain(&create_info, None) }.map_err(RenderError::Api)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.device.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>> {
        unsafe { self.device.swapchain_loader.get_swapchain_images(swapchain) }.map_err(RenderError::Api)
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> RenderResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.device.device.create_image_view(&create_info, None) }.map_err(RenderError::Api)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.device.destroy_image_view(view, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> RenderResult<AcquireOutcome> {
        let result = unsafe {
            self.device
                .swapchain_loader
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        };
        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(RenderError::Api(e)),
        }
    }

    fn queue_submit(&self, submission: &FrameSubmission) -> RenderResult<()> {
        let wait_semaphores = [submission.wait_semaphore];
        let wait_stages = [submission.wait_stage];
        let command_buffers = [submission.command_buffer];
        let signal_semaphores = [submission.signal_semaphore];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .device
                .queue_submit(self.device.graphics_queue, &[submit_info], submission.fence)
        }
        .map_err(RenderError::Api)
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RenderResult<PresentOutcome> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.device
                .swapchain_loader
                .queue_present(self.device.present_queue, &present_info)
        };
        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(RenderError::Api(e)),
        }
    }

    fn create_command_pool(&self, queue_family_index: u32) -> RenderResult<vk::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        unsafe { self.device.device.create_command_pool(&create_info, None) }.map_err(RenderError::Api)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> RenderResult<Vec<vk::CommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe { self.device.device.allocate_command_buffers(&allocate_info) }.map_err(RenderError::Api)
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.device.free_command_buffers(pool, buffers) };
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        // Recorded once, submitted every time its image comes round
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe { self.device.device.begin_command_buffer(command_buffer, &begin_info) }.map_err(RenderError::Api)
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        unsafe { self.device.device.end_command_buffer(command_buffer) }.map_err(RenderError::Api)
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);
        unsafe {
            self.device
                .device
                .cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .device
                .cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        descriptor_set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[descriptor_set],
                &[],
            );
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.device.device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device.device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe { self.device.device.cmd_draw(command_buffer, vertex_count, instance_count, 0, 0) };
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.device.cmd_end_render_pass(command_buffer) };
    }
}
