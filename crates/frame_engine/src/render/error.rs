//! Render error types
//!
//! Only unrecoverable conditions are errors. Out-of-date and suboptimal
//! swapchains are reported through [`AcquireOutcome`](super::AcquireOutcome)
//! and [`PresentOutcome`](super::PresentOutcome) instead.

use ash::vk;
use thiserror::Error;

use crate::config::ConfigError;
use crate::render::window::WindowError;

/// Fatal rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Device, instance or surface initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// The surface offers no usable format or present mode
    #[error("Unsupported surface: {0}")]
    UnsupportedSurface(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// A frame slot or swapchain image index outside the allocated range
    #[error("{kind} index {index} out of range (have {len})")]
    IndexOutOfRange {
        /// What was being indexed
        kind: &'static str,
        /// The offending index
        index: usize,
        /// Number of elements available
        len: usize,
    },

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RenderError {
    /// Shorthand for [`RenderError::InvalidOperation`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation { reason: reason.into() }
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Look up a per-frame or per-image element, failing loudly when out of range
pub(crate) fn checked_index<'a, T>(kind: &'static str, items: &'a [T], index: usize) -> RenderResult<&'a T> {
    items.get(index).ok_or(RenderError::IndexOutOfRange {
        kind,
        index,
        len: items.len(),
    })
}
