//! Triangle demo application
//!
//! Spins a single triangle through the frame loop. Resize or minimize the
//! window to exercise swapchain recreation; press Escape to quit.
//!
//! Usage: `triangle [config.toml | config.ron]`

use frame_engine::foundation::logging;
use frame_engine::prelude::*;

fn load_config() -> Result<ApplicationConfig, ConfigError> {
    let config = match std::env::args().nth(1) {
        Some(path) => ApplicationConfig::load_from_file(&path)?,
        None => {
            let mut config = ApplicationConfig::new("Frame Engine - Triangle");
            config.renderer = config
                .renderer
                .with_version(0, 1, 0)
                .with_clear_color([0.02, 0.02, 0.05, 1.0]);
            config
        }
    };
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    logging::init_with_level(&config.log_level);
    log::info!("Starting {}", config.renderer.application_name);

    let mut window = GlfwWindow::new(&config.window)?;
    let context = VulkanContext::new(&mut window, &config.renderer)?;
    window.set_title(&format!("{} ({})", config.window.title, context.physical_device().name()));
    let content = ForwardPassContent::from_shader_config(&context, &config.renderer.shaders)?
        .with_clear_color(config.renderer.clear_color);

    let mut frames = FrameOrchestrator::new(context.into_gpu_context(), window, content, &config.renderer)?;
    frames.run()?;

    let stats = frames.stats();
    log::info!(
        "Presented {} frames, {} swapchain recreations, {} blocking fence waits",
        stats.frames_presented,
        stats.recreations,
        stats.blocking_fence_waits
    );
    Ok(())
}
