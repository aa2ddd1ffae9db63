//! Window management using GLFW
//!
//! Provides window creation, event pumping and Vulkan surface creation, and
//! turns framebuffer-size events into the frame loop's resize flag.

use ash::vk;

use crate::core::config::WindowConfig;
use crate::render::window::{WindowError, WindowResult, WindowSurface};

/// GLFW window wrapper with proper resource management
pub struct GlfwWindow {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    resize_pending: bool,
}

impl GlfwWindow {
    /// Create a window with no client API, ready for a Vulkan surface
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::debug!("Created window '{}' ({}x{})", config.title, config.width, config.height);

        Ok(Self {
            glfw,
            window,
            events,
            resize_pending: false,
        })
    }

    fn drain_events(&mut self) {
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    log::trace!("Framebuffer resized to {}x{}", width, height);
                    self.resize_pending = true;
                }
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    self.window.set_should_close(true);
                }
                _ => {}
            }
        }
    }

    /// Replace the window title
    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// Vulkan instance extensions GLFW needs for surface creation
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Vulkan is not supported by this GLFW build".to_string()))
    }

    /// Create a Vulkan surface using GLFW's built-in functionality
    pub fn create_vulkan_surface(&mut self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {result:?}")))
        }
    }
}

impl WindowSurface for GlfwWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (u32::try_from(width).unwrap_or(0), u32::try_from(height).unwrap_or(0))
    }

    fn should_close(&self) -> bool {
        self.window.should_close()
    }

    fn poll_events(&mut self) {
        self.glfw.poll_events();
        self.drain_events();
    }

    fn wait_events(&mut self) {
        self.glfw.wait_events();
        self.drain_events();
    }

    fn take_resize_request(&mut self) -> bool {
        std::mem::take(&mut self.resize_pending)
    }
}
