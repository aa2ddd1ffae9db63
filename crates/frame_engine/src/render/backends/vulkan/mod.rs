//! Vulkan backend
//!
//! `ash` implementation of [`GpuDevice`](crate::render::GpuDevice), a GLFW
//! window and a forward-pass content provider.

mod context;
mod device;
mod forward_content;
mod resources;
mod window;

pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanInstance};
pub use forward_content::{ForwardPassContent, FrameUniforms};
pub use resources::{
    Buffer, DescriptorPool, DescriptorSetLayout, Framebuffer, GraphicsPipeline, RenderPass, ShaderModule,
};
pub use window::GlfwWindow;
