//! Window abstraction used by the frame loop
//!
//! The orchestrator only needs a handful of things from the window system:
//! the current framebuffer size, a close request, a way to block while the
//! window is minimized and a one-shot "framebuffer was resized" flag.

use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The native window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other GLFW failure, including surface creation
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Window surface seen by the frame loop
pub trait WindowSurface {
    /// Current framebuffer size in pixels; `(0, 0)` while minimized
    fn framebuffer_size(&self) -> (u32, u32);

    /// Whether the user asked to close the window
    fn should_close(&self) -> bool;

    /// Process pending window events without blocking
    fn poll_events(&mut self);

    /// Block until at least one window event arrives
    fn wait_events(&mut self);

    /// Return whether a framebuffer resize was observed since the last call,
    /// clearing the flag
    fn take_resize_request(&mut self) -> bool;
}
