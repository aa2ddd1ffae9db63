//! Frame loop orchestration
//!
//! [`FrameOrchestrator`] drives one frame at a time through the submission
//! protocol and owns every other component:
//!
//! 1. Wait for the current frame slot's fence (bounds CPU run-ahead to N frames)
//! 2. Acquire the next swapchain image, signaling the slot's acquire semaphore
//! 3. Wait for whichever frame last rendered to that image
//! 4. Record the slot as the image's new owner
//! 5. Let the content provider write per-frame data
//! 6. Reset the slot fence and submit the image's command buffer
//! 7. Present, then recreate the swapchain if it went stale or the window resized
//! 8. Advance the frame counter
//!
//! ## State Machine
//!
//! ```text
//! Uninitialized -> Ready -> Acquiring -> Submitting -> Presenting -> Ready
//!                            |                          |
//!                            +------> Recreating <------+
//!                                         |
//!                                       Ready
//! Ready -> TearingDown -> Terminated
//! ```
//!
//! ## Recreation Protocol
//!
//! Frame slots and the frame counter survive recreation; everything that
//! depends on the swapchain is rebuilt:
//!
//! 1. Block while the framebuffer or the surface extent has zero area
//! 2. Wait for the device to go idle
//! 3. Destroy command buffers, content targets, image views, swapchain
//! 4. Rebuild swapchain, views, content targets, command buffers
//! 5. Resize and clear the images-in-flight table

use ash::vk;

use super::commands::CommandRecorder;
use super::content::{FrameContext, RenderContent};
use super::device::{AcquireOutcome, FrameSubmission, GpuDeviceContext, PresentOutcome};
use super::error::{RenderError, RenderResult};
use super::swapchain::{surface_extent, SwapchainInfo, SwapchainManager};
use super::sync_manager::FrameSyncCoordinator;
use super::window::WindowSurface;
use crate::core::config::RendererConfig;
use crate::foundation::time::Timer;

/// Frame loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Components not yet built
    Uninitialized,
    /// Idle between frames
    Ready,
    /// Waiting on the slot fence and acquiring an image
    Acquiring,
    /// Updating per-frame data and submitting
    Submitting,
    /// Presenting the rendered image
    Presenting,
    /// Rebuilding swapchain-dependent resources
    Recreating,
    /// Releasing all GPU resources
    TearingDown,
    /// Everything released; no further frames
    Terminated,
}

/// What one call to [`FrameOrchestrator::draw_frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and handed to presentation
    Presented {
        /// Frame slot used
        frame_index: usize,
        /// Swapchain image rendered to
        image_index: usize,
    },
    /// Acquisition found the swapchain out of date; it was rebuilt and no
    /// frame was submitted
    Recreated,
}

/// Counters describing frame loop behaviour
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames submitted and handed to presentation
    pub frames_presented: u64,
    /// Completed swapchain recreations
    pub recreations: u64,
    /// Acquires that reported the swapchain out of date
    pub out_of_date_acquires: u64,
    /// Acquires that succeeded but reported a suboptimal swapchain
    pub suboptimal_acquires: u64,
    /// Presents that reported a suboptimal swapchain
    pub suboptimal_presents: u64,
    /// Slot fence waits where the CPU actually had to block on the GPU
    pub blocking_fence_waits: u64,
}

/// Root of the frame loop
///
/// Field order is drop order: per-image resources go first, the device
/// context and window last.
pub struct FrameOrchestrator<W: WindowSurface, C: RenderContent> {
    command_recorder: CommandRecorder,
    content: C,
    swapchain_manager: SwapchainManager,
    sync: FrameSyncCoordinator,
    ctx: GpuDeviceContext,
    window: W,

    state: FrameState,
    frames_in_flight: usize,
    frame_counter: u64,
    stats: FrameStats,
    timer: Timer,
}

impl<W: WindowSurface, C: RenderContent> FrameOrchestrator<W, C> {
    /// Build every component and record the initial command buffers
    ///
    /// Blocks while the window is minimized. `config.max_frames_in_flight`
    /// is read once here.
    pub fn new(ctx: GpuDeviceContext, mut window: W, mut content: C, config: &RendererConfig) -> RenderResult<Self> {
        config.validate()?;
        let frames_in_flight = config.max_frames_in_flight;
        log::debug!("Frame loop state: {:?}", FrameState::Uninitialized);

        let size = wait_for_presentable_size(&mut window, &ctx)?.ok_or_else(|| {
            RenderError::InitializationFailed("Window closed before it became visible".to_string())
        })?;

        let mut swapchain_manager = SwapchainManager::new(config.prefer_low_latency_present);
        let info = swapchain_manager.create_swapchain(&ctx, size)?;
        swapchain_manager.create_image_views()?;

        let sync = FrameSyncCoordinator::new(&ctx, frames_in_flight, info.image_count)?;

        let mut command_recorder = CommandRecorder::new(&ctx);
        command_recorder.create_command_pool(ctx.graphics_family())?;
        content.create_targets(swapchain_manager.swapchain()?)?;
        command_recorder.create_command_buffers(info.image_count)?;
        command_recorder.record_all(&content)?;

        log::info!(
            "Frame loop ready: {} frames in flight, {} swapchain images, {}x{}",
            frames_in_flight,
            info.image_count,
            info.extent.width,
            info.extent.height
        );

        let mut orchestrator = Self {
            command_recorder,
            content,
            swapchain_manager,
            sync,
            ctx,
            window,
            state: FrameState::Uninitialized,
            frames_in_flight,
            frame_counter: 0,
            stats: FrameStats::default(),
            timer: Timer::new(),
        };
        orchestrator.transition(FrameState::Ready);
        Ok(orchestrator)
    }

    fn transition(&mut self, next: FrameState) {
        log::trace!("Frame loop state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Current state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Loop statistics
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Frames submitted so far; the current slot is this value mod N
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Slot the next frame will use
    #[allow(clippy::cast_possible_truncation)]
    pub fn current_frame_index(&self) -> usize {
        (self.frame_counter % self.frames_in_flight as u64) as usize
    }

    /// Current swapchain properties
    pub fn swapchain_info(&self) -> Option<SwapchainInfo> {
        self.swapchain_manager.info()
    }

    /// Current swapchain handle
    pub fn swapchain_handle(&self) -> Option<vk::SwapchainKHR> {
        self.swapchain_manager.swapchain().ok().map(|sc| sc.handle())
    }

    /// Synchronization state, for inspection
    pub fn sync(&self) -> &FrameSyncCoordinator {
        &self.sync
    }

    /// Command buffers, for inspection
    pub fn command_recorder(&self) -> &CommandRecorder {
        &self.command_recorder
    }

    /// The window
    pub fn window(&self) -> &W {
        &self.window
    }

    /// The window, mutably (to pump events or flag resizes externally)
    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    /// The content provider
    pub fn content(&self) -> &C {
        &self.content
    }

    /// Run one iteration of the frame protocol
    pub fn draw_frame(&mut self) -> RenderResult<FrameOutcome> {
        if self.state != FrameState::Ready {
            return Err(RenderError::invalid(format!(
                "draw_frame called in state {:?}",
                self.state
            )));
        }

        let frame_index = self.current_frame_index();
        self.transition(FrameState::Acquiring);

        if self.sync.wait_if_commands_unfinished(frame_index)? {
            self.stats.blocking_fence_waits += 1;
        }

        let image_acquired = self.sync.image_semaphore_at(frame_index)?;
        let (image_index, acquire_suboptimal) = match self.swapchain_manager.acquire_next_image(image_acquired)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                log::warn!("Swapchain out of date during acquire, recreating");
                self.stats.out_of_date_acquires += 1;
                self.recreate()?;
                return Ok(FrameOutcome::Recreated);
            }
        };
        let image = image_index as usize;

        self.sync.wait_if_using_image(image)?;
        self.sync.mark_image_as_using(image, frame_index)?;

        self.transition(FrameState::Submitting);
        self.timer.update();
        let extent = self
            .swapchain_manager
            .info()
            .map_or_else(vk::Extent2D::default, |info| info.extent);
        self.content.update_frame(&FrameContext {
            frame_index,
            image_index: image,
            elapsed_seconds: self.timer.total_time(),
            delta_seconds: self.timer.delta_time(),
            extent,
        })?;

        let submission = FrameSubmission {
            wait_semaphore: image_acquired,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            command_buffer: self.command_recorder.command_buffer(image)?,
            signal_semaphore: self.sync.render_finished_semaphore_at(frame_index)?,
            fence: self.sync.command_fence_at(frame_index)?,
        };
        self.sync.reset_command_fence(frame_index)?;
        self.ctx.device().queue_submit(&submission)?;

        self.transition(FrameState::Presenting);
        let presented = self
            .swapchain_manager
            .present(image_index, submission.signal_semaphore)?;
        let resized = self.window.take_resize_request();

        // The frame was submitted, so its slot is consumed whatever present said
        self.frame_counter += 1;
        self.stats.frames_presented += 1;

        if acquire_suboptimal {
            log::warn!("Swapchain suboptimal at acquire, recreating");
            self.stats.suboptimal_acquires += 1;
        }
        match presented {
            PresentOutcome::Suboptimal => {
                log::warn!("Swapchain suboptimal at present, recreating");
                self.stats.suboptimal_presents += 1;
            }
            PresentOutcome::OutOfDate => log::warn!("Swapchain out of date during present, recreating"),
            PresentOutcome::Presented => {}
        }

        if acquire_suboptimal || presented.needs_recreation() || resized {
            if resized {
                log::debug!("Framebuffer resized, recreating swapchain");
            }
            self.recreate()?;
        } else {
            self.transition(FrameState::Ready);
        }

        Ok(FrameOutcome::Presented {
            frame_index,
            image_index: image,
        })
    }

    /// Rebuild every swapchain-dependent resource
    ///
    /// Frame slots and the frame counter are kept. If the window is closed
    /// while minimized nothing is rebuilt and the loop returns to `Ready` so
    /// the caller can observe the close request.
    pub fn recreate(&mut self) -> RenderResult<()> {
        if matches!(self.state, FrameState::TearingDown | FrameState::Terminated) {
            return Err(RenderError::invalid("Cannot recreate after shutdown"));
        }
        self.transition(FrameState::Recreating);

        let Some(size) = wait_for_presentable_size(&mut self.window, &self.ctx)? else {
            log::debug!("Window closed while minimized, skipping swapchain recreation");
            self.transition(FrameState::Ready);
            return Ok(());
        };

        self.ctx.wait_idle()?;

        self.command_recorder.free_command_buffers();
        self.content.destroy_targets();
        self.swapchain_manager.clean_up();

        let info = self.swapchain_manager.create_swapchain(&self.ctx, size)?;
        self.swapchain_manager.create_image_views()?;
        self.content.create_targets(self.swapchain_manager.swapchain()?)?;
        self.command_recorder.create_command_buffers(info.image_count)?;
        self.command_recorder.record_all(&self.content)?;
        self.sync.reset_image_table(info.image_count);

        // A resize noticed during the rebuild is already covered by it
        self.window.take_resize_request();

        self.stats.recreations += 1;
        log::debug!(
            "Swapchain recreated at {}x{} with {} images",
            info.extent.width,
            info.extent.height,
            info.image_count
        );
        self.transition(FrameState::Ready);
        Ok(())
    }

    /// Draw frames until the window asks to close, then shut down
    pub fn run(&mut self) -> RenderResult<()> {
        log::info!("Entering frame loop");
        while !self.window.should_close() {
            self.window.poll_events();
            if self.window.should_close() {
                break;
            }

            if let Err(e) = self.draw_frame() {
                log::error!("Frame loop aborted: {}", e);
                if let Err(shutdown_error) = self.shutdown() {
                    log::error!("Shutdown after fatal error also failed: {}", shutdown_error);
                }
                return Err(e);
            }
        }

        log::info!(
            "Frame loop finished after {} frames ({:.1} fps average, {} recreations)",
            self.timer.frame_count(),
            self.timer.average_fps(),
            self.stats.recreations
        );
        self.shutdown()
    }

    /// Wait for the GPU and release every resource; idempotent
    pub fn shutdown(&mut self) -> RenderResult<()> {
        if self.state == FrameState::Terminated {
            return Ok(());
        }
        self.transition(FrameState::TearingDown);

        let idle = self.ctx.wait_idle();
        if let Err(e) = &idle {
            log::error!("Device wait idle failed during shutdown: {}", e);
        }

        self.command_recorder.clean_up();
        self.content.destroy_targets();
        self.swapchain_manager.clean_up();
        self.sync.clean_up();

        self.transition(FrameState::Terminated);
        log::debug!("Frame loop resources released");
        idle
    }
}

impl<W: WindowSurface, C: RenderContent> Drop for FrameOrchestrator<W, C> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Error during frame loop shutdown: {}", e);
        }
    }
}

/// Block on window events until the framebuffer has non-zero area
///
/// Returns `None` if the window is closed while waiting.
fn wait_for_visible_framebuffer<W: WindowSurface>(window: &mut W) -> Option<(u32, u32)> {
    let mut size = window.framebuffer_size();
    if size.0 == 0 || size.1 == 0 {
        log::debug!("Framebuffer has zero area, waiting for the window to be restored");
    }
    while size.0 == 0 || size.1 == 0 {
        if window.should_close() {
            return None;
        }
        window.wait_events();
        size = window.framebuffer_size();
    }
    Some(size)
}

/// Block until both the window and the surface report a non-zero extent
///
/// Nothing has been torn down when this returns, so a surface that is still
/// settling costs another event wait rather than the swapchain.
fn wait_for_presentable_size<W: WindowSurface>(
    window: &mut W,
    ctx: &GpuDeviceContext,
) -> RenderResult<Option<(u32, u32)>> {
    loop {
        let Some(size) = wait_for_visible_framebuffer(window) else {
            return Ok(None);
        };
        let extent = surface_extent(ctx, size)?;
        if extent.width != 0 && extent.height != 0 {
            return Ok(Some(size));
        }

        log::debug!(
            "Surface reports a {}x{} extent for a {}x{} framebuffer, waiting",
            extent.width,
            extent.height,
            size.0,
            size.1
        );
        if window.should_close() {
            return Ok(None);
        }
        window.wait_events();
        if window.should_close() {
            return Ok(None);
        }
    }
}
