//! Frames-in-flight synchronization
//!
//! Owns one [`FrameSlot`] per frame in flight and the images-in-flight table,
//! which records, per swapchain image, the fence of the frame that last
//! submitted work rendering to it.
//!
//! Frame slots and swapchain images are indexed independently. With N slots
//! and M images the acquired image is not predictable from the slot index,
//! so before rendering to an image the frame loop must wait on whichever
//! slot last used it:
//!
//! ```text
//! slot fence wait -> acquire(image i) -> wait images_in_flight[i] -> images_in_flight[i] = slot fence
//! ```

use ash::vk;
use std::sync::Arc;

use super::device::{GpuDevice, GpuDeviceContext};
use super::error::{checked_index, RenderError, RenderResult};
use super::sync::FrameSlot;
use super::WAIT_FOREVER;

/// Coordinates frame slots and swapchain image ownership
pub struct FrameSyncCoordinator {
    device: Arc<dyn GpuDevice>,
    frame_slots: Vec<FrameSlot>,
    images_in_flight: Vec<Option<vk::Fence>>,
}

impl FrameSyncCoordinator {
    /// Create `frames_in_flight` frame slots and an empty table for `image_count` images
    pub fn new(ctx: &GpuDeviceContext, frames_in_flight: usize, image_count: usize) -> RenderResult<Self> {
        if frames_in_flight == 0 {
            return Err(RenderError::invalid("At least one frame in flight is required"));
        }

        log::debug!(
            "Creating sync objects for {} frames in flight, {} swapchain images",
            frames_in_flight,
            image_count
        );

        let device = ctx.device().clone();
        let frame_slots = (0..frames_in_flight)
            .map(|_| FrameSlot::new(&device))
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            device,
            frame_slots,
            images_in_flight: vec![None; image_count],
        })
    }

    /// Number of frame slots still alive
    pub fn live_slots(&self) -> usize {
        self.frame_slots.len()
    }

    /// Size of the images-in-flight table
    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    fn slot(&self, frame_index: usize) -> RenderResult<&FrameSlot> {
        checked_index("frame slot", &self.frame_slots, frame_index)
    }

    /// Whether the slot's last submitted commands have completed
    pub fn is_commands_finished(&self, frame_index: usize) -> RenderResult<bool> {
        self.slot(frame_index)?.commands_complete.is_signaled()
    }

    /// Block until the slot's previous submission has completed
    ///
    /// Returns `true` when the CPU actually had to wait on the GPU.
    pub fn wait_if_commands_unfinished(&self, frame_index: usize) -> RenderResult<bool> {
        let fence = &self.slot(frame_index)?.commands_complete;
        if fence.is_signaled()? {
            return Ok(false);
        }

        log::trace!("Frame slot {} still in flight, waiting", frame_index);
        fence.wait(WAIT_FOREVER)?;
        Ok(true)
    }

    /// Block until the frame that last rendered to `image_index` has completed
    pub fn wait_if_using_image(&self, image_index: usize) -> RenderResult<()> {
        if let Some(fence) = *checked_index("swapchain image", &self.images_in_flight, image_index)? {
            self.device.wait_for_fence(fence, WAIT_FOREVER)?;
        }
        Ok(())
    }

    /// Record that `frame_index` is about to render to `image_index`
    pub fn mark_image_as_using(&mut self, image_index: usize, frame_index: usize) -> RenderResult<()> {
        let fence = self.slot(frame_index)?.commands_complete.handle();
        let len = self.images_in_flight.len();
        let entry = self.images_in_flight.get_mut(image_index).ok_or(RenderError::IndexOutOfRange {
            kind: "swapchain image",
            index: image_index,
            len,
        })?;
        *entry = Some(fence);
        Ok(())
    }

    /// Fence currently recorded for `image_index`, if any
    pub fn image_fence(&self, image_index: usize) -> RenderResult<Option<vk::Fence>> {
        checked_index("swapchain image", &self.images_in_flight, image_index).copied()
    }

    /// Return the slot's fence to unsignaled, immediately before submitting with it
    pub fn reset_command_fence(&self, frame_index: usize) -> RenderResult<()> {
        self.slot(frame_index)?.commands_complete.reset()
    }

    /// Semaphore signaled when the slot's acquired image is ready
    pub fn image_semaphore_at(&self, frame_index: usize) -> RenderResult<vk::Semaphore> {
        Ok(self.slot(frame_index)?.image_acquired.handle())
    }

    /// Semaphore signaled when the slot's rendering is finished
    pub fn render_finished_semaphore_at(&self, frame_index: usize) -> RenderResult<vk::Semaphore> {
        Ok(self.slot(frame_index)?.render_finished.handle())
    }

    /// Fence signaled when the slot's commands complete
    pub fn command_fence_at(&self, frame_index: usize) -> RenderResult<vk::Fence> {
        Ok(self.slot(frame_index)?.commands_complete.handle())
    }

    /// Resize the images-in-flight table and forget every entry
    ///
    /// Only valid once the device is idle, which is the case during
    /// swapchain recreation.
    pub fn reset_image_table(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    /// Destroy every frame slot and clear the image table
    pub fn clean_up(&mut self) {
        self.images_in_flight.clear();
        self.frame_slots.clear();
    }
}
