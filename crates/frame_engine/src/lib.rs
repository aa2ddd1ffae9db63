//! # Frame Engine
//!
//! Swapchain lifecycle and frames-in-flight synchronization for a Vulkan renderer.
//!
//! ## Features
//!
//! - **Frame Pacing**: At most `max_frames_in_flight` frames of CPU work ahead of the GPU
//! - **Images In Flight**: Per-swapchain-image fence tracking independent of frame slots
//! - **Swapchain Recreation**: Out-of-date, suboptimal and resize handling with full rebuild
//! - **RAII Resources**: Every GPU object is released by its owner's `Drop`
//! - **Testable**: All device calls go through the [`render::GpuDevice`] seam
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     frame_engine::foundation::logging::init();
//!
//!     let config = ApplicationConfig::default();
//!     let mut window = GlfwWindow::new(&config.window)?;
//!     let context = VulkanContext::new(&mut window, &config.renderer)?;
//!     let content = ForwardPassContent::from_shader_config(&context, &config.renderer.shaders)?;
//!
//!     let mut frames = FrameOrchestrator::new(context.into_gpu_context(), window, content, &config.renderer)?;
//!     frames.run()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;
pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, RendererConfig, ShaderConfig, WindowConfig},
        config::{Config, ConfigError},
        foundation::time::Timer,
        render::{
            backends::vulkan::{ForwardPassContent, GlfwWindow, VulkanContext},
            FrameOrchestrator, FrameOutcome, FrameState, FrameStats,
            GpuDevice, GpuDeviceContext, RenderContent, RenderError, RenderResult,
            WindowSurface, MAX_FRAMES_IN_FLIGHT,
        },
    };
}
