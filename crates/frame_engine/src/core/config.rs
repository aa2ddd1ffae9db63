//! # Configuration
//!
//! All runtime configuration for the frame engine, grouped by subsystem.
//!
//! - **Window Config**: Title and initial framebuffer size
//! - **Renderer Config**: Vulkan instance settings, frame pacing, present mode preference
//! - **Shader Config**: SPIR-V locations for the forward pass
//! - **Application Config**: Top level file-backed configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};
use crate::render::MAX_FRAMES_IN_FLIGHT;

/// Upper bound on frame slots; more than this only adds latency
pub const FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// # Shader Configuration
///
/// Paths to the SPIR-V binaries used by the forward pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the usual output directories so the binary can be started from
    /// the workspace root or from its own directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        let shader_dirs = [
            "target/shaders/",
            "../target/shaders/",
            "shaders/",
            "triangle_app/shaders/",
            "./",
        ];

        let find = |file: &str| {
            shader_dirs
                .iter()
                .map(|dir| format!("{dir}{file}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("shaders/{file}"))
        };

        Self {
            vertex_shader_path: find(base_vertex),
            fragment_shader_path: find(base_fragment),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.vertex_shader_path, &self.fragment_shader_path] {
            if !Path::new(path).exists() {
                return Err(ConfigError::Invalid(format!("Shader not found: {path}")));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("triangle.vert.spv", "triangle.frag.spv")
    }
}

/// # Window Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
}

impl WindowConfig {
    /// Create a window configuration with the given title and size
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            resizable: true,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new("Frame Engine", 800, 600)
    }
}

/// # Renderer Configuration
///
/// Vulkan instance metadata plus the knobs the frame loop reads:
/// frame slot count, present mode preference and clear colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Number of frame slots the CPU may record ahead of the GPU
    pub max_frames_in_flight: usize,
    /// Prefer MAILBOX over FIFO when the surface offers it
    pub prefer_low_latency_present: bool,
    /// Whether to enable Vulkan validation layers (None = debug builds only)
    pub enable_validation: Option<bool>,
    /// RGBA clear colour for the colour attachment
    pub clear_color: [f32; 4],
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            shaders: ShaderConfig::default(),
            max_frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            prefer_low_latency_present: true,
            enable_validation: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set maximum frames in flight
    pub fn with_max_frames_in_flight(mut self, frames: usize) -> Self {
        self.max_frames_in_flight = frames;
        self
    }

    /// Prefer MAILBOX (true) or always use FIFO (false)
    pub fn with_low_latency_present(mut self, enabled: bool) -> Self {
        self.prefer_low_latency_present = enabled;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the clear colour
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Resolve the validation setting, defaulting to debug builds only
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    ///
    /// Shader files are not checked here; content that needs them validates
    /// its own [`ShaderConfig`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if self.max_frames_in_flight == 0 {
            return Err(ConfigError::Invalid("Max frames in flight must be at least 1".to_string()));
        }

        if self.max_frames_in_flight > FRAMES_IN_FLIGHT_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "Max frames in flight should not exceed {FRAMES_IN_FLIGHT_LIMIT}, got {}",
                self.max_frames_in_flight
            )));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Frame Engine Application")
    }
}

/// # Application Configuration
///
/// Top-level configuration loaded from `.toml` or `.ron`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Window configuration
    pub window: WindowConfig,
    /// Rendering configuration
    pub renderer: RendererConfig,
}

impl ApplicationConfig {
    /// Create a new application configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            log_level: "info".to_string(),
            window: WindowConfig::new(app_name.clone(), 800, 600),
            renderer: RendererConfig::new(app_name),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.window.validate()?;
        self.renderer.validate()
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self::new("Frame Engine Application")
    }
}

impl Config for ApplicationConfig {}
