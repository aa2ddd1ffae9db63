//! Test doubles for the frame loop
//!
//! [`MockDevice`] simulates a GPU queue: submissions stay pending until
//! something waits on their fence (or the device goes idle), every call is
//! logged as a [`GpuEvent`], and misuse that a real driver would punish with
//! undefined behaviour is collected as a violation string instead.

use ash::vk::{self, Handle};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use super::content::{FrameContext, RenderContent, RenderPassCommands};
use super::device::{AcquireOutcome, FrameSubmission, GpuDevice, PresentOutcome, SwapchainDesc};
use super::error::{checked_index, RenderError, RenderResult};
use super::swapchain::Swapchain;
use super::window::WindowSurface;

/// When pending GPU work completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Work completes as soon as the CPU waits for it
    OnWait,
    /// Work completes only through [`MockDevice::complete_all`]
    Manual,
}

/// Scripted result for an acquire or present call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Suboptimal,
    OutOfDate,
    Fail(vk::Result),
}

/// Logged device call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GpuEvent {
    FenceWait { fence: vk::Fence, blocked: bool },
    FenceReset(vk::Fence),
    WaitIdle,
    CreateSwapchain { extent: vk::Extent2D, image_count: usize },
    DestroySwapchain,
    DestroyImageView,
    Acquire { image_index: Option<u32> },
    Submit { command_buffer: vk::CommandBuffer, fence: vk::Fence },
    Present { image_index: u32 },
    AllocateCommandBuffers(usize),
    FreeCommandBuffers(usize),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass { command_buffer: vk::CommandBuffer, framebuffer: vk::Framebuffer },
    BindPipeline(vk::CommandBuffer),
    BindDescriptorSet(vk::CommandBuffer),
    SetViewportAndScissor(vk::CommandBuffer),
    Draw { command_buffer: vk::CommandBuffer, vertex_count: u32 },
    EndRenderPass(vk::CommandBuffer),
    Note(&'static str),
}

impl GpuEvent {
    /// Command buffer a recording event refers to
    pub fn command_buffer(&self) -> Option<vk::CommandBuffer> {
        match *self {
            Self::BeginCommandBuffer(cb)
            | Self::EndCommandBuffer(cb)
            | Self::BindPipeline(cb)
            | Self::BindDescriptorSet(cb)
            | Self::SetViewportAndScissor(cb)
            | Self::EndRenderPass(cb)
            | Self::BeginRenderPass { command_buffer: cb, .. }
            | Self::Draw { command_buffer: cb, .. } => Some(cb),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FenceState {
    signaled: bool,
    pending: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct CommandBufferState {
    recording: bool,
    recorded: bool,
    framebuffer: Option<vk::Framebuffer>,
}

#[derive(Debug, Clone, Copy)]
struct PendingWork {
    fence: vk::Fence,
    command_buffer: Option<vk::CommandBuffer>,
}

struct MockState {
    next_handle: u64,
    completion: Completion,
    events: Vec<GpuEvent>,
    violations: Vec<String>,
    destroyed: Vec<&'static str>,

    semaphores: HashMap<vk::Semaphore, bool>,
    fences: HashMap<vk::Fence, FenceState>,
    pending: VecDeque<PendingWork>,
    swapchains: HashMap<vk::SwapchainKHR, (Vec<vk::Image>, usize)>,
    image_views: HashSet<vk::ImageView>,
    pools: HashMap<vk::CommandPool, Vec<vk::CommandBuffer>>,
    command_buffers: HashMap<vk::CommandBuffer, CommandBufferState>,

    capabilities: vk::SurfaceCapabilitiesKHR,
    zero_extent_queries: usize,
    formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
    swapchains_created: usize,
    last_swapchain_desc: Option<SwapchainDesc>,

    acquire_calls: usize,
    present_calls: usize,
    acquire_script: HashMap<usize, Scripted>,
    present_script: HashMap<usize, Scripted>,
    submit_failure: Option<vk::Result>,
    acquire_order: VecDeque<u32>,

    fence_waits: usize,
    submissions: Vec<FrameSubmission>,
    acquired: Vec<u32>,
}

impl MockState {
    fn handle<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        H::from_raw(self.next_handle)
    }

    fn violation(&mut self, message: impl Into<String>) {
        self.violations.push(message.into());
    }

    fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.fences.get(&fence).map_or(true, |f| f.signaled)
    }

    fn any_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn command_buffer_pending(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.pending.iter().any(|w| w.command_buffer == Some(command_buffer))
    }

    fn complete_front(&mut self) {
        if let Some(work) = self.pending.pop_front() {
            if let Some(state) = self.fences.get_mut(&work.fence) {
                state.pending = false;
                state.signaled = true;
            }
        }
    }

    /// Queue order: everything submitted before `fence`'s work completes first
    fn complete_through(&mut self, fence: vk::Fence) {
        if let Some(last) = self.pending.iter().rposition(|w| w.fence == fence) {
            for _ in 0..=last {
                self.complete_front();
            }
        }
    }

    fn complete_all(&mut self) {
        while self.any_pending() {
            self.complete_front();
        }
    }

    fn require_recording(&mut self, command_buffer: vk::CommandBuffer, what: &str) {
        let recording = self
            .command_buffers
            .get(&command_buffer)
            .is_some_and(|cb| cb.recording);
        if !recording {
            self.violation(format!("{what} recorded outside begin/end"));
        }
    }

    fn destroy_while_pending(&mut self, what: &'static str) {
        if self.any_pending() {
            self.violation(format!("{what} destroyed while GPU work pending"));
        }
        self.destroyed.push(what);
    }
}

fn default_capabilities() -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: 2,
        max_image_count: 0,
        current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
        min_image_extent: vk::Extent2D { width: 1, height: 1 },
        max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
        max_image_array_layers: 1,
        supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
        current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
    }
}

/// Simulated GPU device
pub struct MockDevice {
    state: Mutex<MockState>,
    gpu_done: Condvar,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Surface defaults: undefined extent, min 2 images (so 3 are created),
    /// FIFO and MAILBOX, B8G8R8A8 UNORM and SRGB formats
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_handle: 0x1000,
                completion: Completion::OnWait,
                events: Vec::new(),
                violations: Vec::new(),
                destroyed: Vec::new(),
                semaphores: HashMap::new(),
                fences: HashMap::new(),
                pending: VecDeque::new(),
                swapchains: HashMap::new(),
                image_views: HashSet::new(),
                pools: HashMap::new(),
                command_buffers: HashMap::new(),
                capabilities: default_capabilities(),
                zero_extent_queries: 0,
                formats: vec![
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_UNORM,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_SRGB,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                ],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                swapchains_created: 0,
                last_swapchain_desc: None,
                acquire_calls: 0,
                present_calls: 0,
                acquire_script: HashMap::new(),
                present_script: HashMap::new(),
                submit_failure: None,
                acquire_order: VecDeque::new(),
                fence_waits: 0,
                submissions: Vec::new(),
                acquired: Vec::new(),
            }),
            gpu_done: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    // Configuration

    pub fn set_completion(&self, completion: Completion) {
        self.lock().completion = completion;
    }

    /// Surface minimum and maximum image counts (0 = no maximum)
    pub fn set_image_counts(&self, min: u32, max: u32) {
        let mut state = self.lock();
        state.capabilities.min_image_count = min;
        state.capabilities.max_image_count = max;
    }

    pub fn set_current_extent(&self, width: u32, height: u32) {
        self.lock().capabilities.current_extent = vk::Extent2D { width, height };
    }

    /// The next `queries` capability queries report a 0x0 current extent,
    /// as drivers do while a window is being minimized
    pub fn report_zero_extent_for(&self, queries: usize) {
        self.lock().zero_extent_queries = queries;
    }

    pub fn set_surface_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.lock().formats = formats;
    }

    pub fn set_present_modes(&self, modes: Vec<vk::PresentModeKHR>) {
        self.lock().present_modes = modes;
    }

    /// Script the result of the `call`-th acquire (0-based, counted over the device lifetime)
    pub fn script_acquire(&self, call: usize, result: Scripted) {
        self.lock().acquire_script.insert(call, result);
    }

    /// Script the result of the `call`-th present
    pub fn script_present(&self, call: usize, result: Scripted) {
        self.lock().present_script.insert(call, result);
    }

    pub fn fail_next_submit(&self, code: vk::Result) {
        self.lock().submit_failure = Some(code);
    }

    /// Image indices handed out by the next acquires, before falling back to round robin
    pub fn set_acquire_order(&self, order: &[u32]) {
        self.lock().acquire_order = order.iter().copied().collect();
    }

    // GPU timeline control

    /// Mark `fence` as having in-flight work without a real submission
    pub fn begin_fake_work(&self, fence: vk::Fence) {
        let mut state = self.lock();
        if let Some(f) = state.fences.get_mut(&fence) {
            f.signaled = false;
            f.pending = true;
        }
        state.pending.push_back(PendingWork { fence, command_buffer: None });
    }

    /// Finish every pending submission and wake blocked waiters
    pub fn complete_all(&self) {
        self.lock().complete_all();
        self.gpu_done.notify_all();
    }

    /// Record an externally observed step in the event log
    pub fn note(&self, label: &'static str) {
        self.lock().events.push(GpuEvent::Note(label));
    }

    pub fn report_violation(&self, message: impl Into<String>) {
        self.lock().violation(message);
    }

    /// Whether a pending submission renders into `framebuffer`
    pub fn framebuffer_in_use(&self, framebuffer: vk::Framebuffer) -> bool {
        let state = self.lock();
        state.pending.iter().any(|w| {
            w.command_buffer
                .and_then(|cb| state.command_buffers.get(&cb))
                .and_then(|cb| cb.framebuffer)
                == Some(framebuffer)
        })
    }

    // Inspection

    pub fn events(&self) -> Vec<GpuEvent> {
        self.lock().events.clone()
    }

    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    pub fn assert_no_violations(&self) {
        let violations = self.violations();
        assert!(violations.is_empty(), "GPU protocol violations: {violations:#?}");
    }

    /// Every GPU object not yet destroyed
    pub fn live_objects(&self) -> usize {
        let state = self.lock();
        state.semaphores.len()
            + state.fences.len()
            + state.swapchains.len()
            + state.image_views.len()
            + state.pools.len()
            + state.command_buffers.len()
    }

    /// Kinds of objects destroyed, in order
    pub fn destruction_order(&self) -> Vec<&'static str> {
        self.lock().destroyed.clone()
    }

    pub fn swapchains_created(&self) -> usize {
        self.lock().swapchains_created
    }

    pub fn last_swapchain_desc(&self) -> Option<SwapchainDesc> {
        self.lock().last_swapchain_desc
    }

    pub fn fence_wait_count(&self) -> usize {
        self.lock().fence_waits
    }

    pub fn submissions(&self) -> Vec<FrameSubmission> {
        self.lock().submissions.clone()
    }

    /// Image indices successfully acquired, in order
    pub fn acquired_images(&self) -> Vec<u32> {
        self.lock().acquired.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}

impl GpuDevice for MockDevice {
    fn create_semaphore(&self) -> RenderResult<vk::Semaphore> {
        let mut state = self.lock();
        let semaphore = state.handle();
        state.semaphores.insert(semaphore, false);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.lock();
        if state.semaphores.remove(&semaphore).is_none() {
            state.violation("destroyed unknown semaphore");
        }
        state.destroy_while_pending("semaphore");
    }

    fn create_fence(&self, signaled: bool) -> RenderResult<vk::Fence> {
        let mut state = self.lock();
        let fence = state.handle();
        state.fences.insert(fence, FenceState { signaled, pending: false });
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.lock();
        if state.fences.remove(&fence).is_none() {
            state.violation("destroyed unknown fence");
        }
        state.destroy_while_pending("fence");
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout: u64) -> RenderResult<()> {
        let mut state = self.lock();
        state.fence_waits += 1;

        let Some(current) = state.fences.get(&fence).copied() else {
            state.violation("waited on unknown fence");
            return Err(RenderError::Api(vk::Result::ERROR_UNKNOWN));
        };

        if current.signaled {
            state.events.push(GpuEvent::FenceWait { fence, blocked: false });
            return Ok(());
        }

        state.events.push(GpuEvent::FenceWait { fence, blocked: true });
        let completion = state.completion;
        match completion {
            Completion::OnWait => {
                if !current.pending {
                    state.violation("waited on an unsignaled fence with no work pending");
                    return Err(RenderError::Api(vk::Result::TIMEOUT));
                }
                state.complete_through(fence);
                Ok(())
            }
            Completion::Manual if timeout == u64::MAX => {
                let _state = self
                    .gpu_done
                    .wait_while(state, |s| !s.fence_signaled(fence))
                    .unwrap();
                Ok(())
            }
            Completion::Manual => {
                let (_state, result) = self
                    .gpu_done
                    .wait_timeout_while(state, Duration::from_nanos(timeout), |s| !s.fence_signaled(fence))
                    .unwrap();
                if result.timed_out() {
                    Err(RenderError::Api(vk::Result::TIMEOUT))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> RenderResult<()> {
        let mut state = self.lock();
        state.events.push(GpuEvent::FenceReset(fence));
        match state.fences.get(&fence).copied() {
            Some(f) if f.pending => state.violation("reset a fence with pending work"),
            Some(_) => {}
            None => state.violation("reset unknown fence"),
        }
        if let Some(f) = state.fences.get_mut(&fence) {
            f.signaled = false;
        }
        Ok(())
    }

    fn fence_status(&self, fence: vk::Fence) -> RenderResult<bool> {
        let mut state = self.lock();
        match state.fences.get(&fence) {
            Some(f) => Ok(f.signaled),
            None => {
                state.violation("queried unknown fence");
                Err(RenderError::Api(vk::Result::ERROR_UNKNOWN))
            }
        }
    }

    fn wait_idle(&self) -> RenderResult<()> {
        let mut state = self.lock();
        state.events.push(GpuEvent::WaitIdle);
        state.complete_all();
        drop(state);
        self.gpu_done.notify_all();
        Ok(())
    }

    fn surface_capabilities(&self) -> RenderResult<vk::SurfaceCapabilitiesKHR> {
        let mut state = self.lock();
        let mut capabilities = state.capabilities;
        if state.zero_extent_queries > 0 {
            state.zero_extent_queries -= 1;
            capabilities.current_extent = vk::Extent2D { width: 0, height: 0 };
        }
        Ok(capabilities)
    }

    fn surface_formats(&self) -> RenderResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.lock().formats.clone())
    }

    fn surface_present_modes(&self) -> RenderResult<Vec<vk::PresentModeKHR>> {
        Ok(self.lock().present_modes.clone())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RenderResult<vk::SwapchainKHR> {
        let mut state = self.lock();
        if desc.extent.width == 0 || desc.extent.height == 0 {
            state.violation("zero-area swapchain requested");
            return Err(RenderError::Api(vk::Result::ERROR_INITIALIZATION_FAILED));
        }

        let image_count = desc.min_image_count as usize;
        let images: Vec<vk::Image> = (0..image_count).map(|_| state.handle()).collect();
        let swapchain = state.handle();
        state.swapchains.insert(swapchain, (images, 0));
        state.swapchains_created += 1;
        state.last_swapchain_desc = Some(*desc);
        state.events.push(GpuEvent::CreateSwapchain { extent: desc.extent, image_count });
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.lock();
        if state.swapchains.remove(&swapchain).is_none() {
            state.violation("destroyed unknown swapchain");
        }
        if !state.image_views.is_empty() {
            state.violation("swapchain destroyed before its image views");
        }
        state.events.push(GpuEvent::DestroySwapchain);
        state.destroy_while_pending("swapchain");
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RenderResult<Vec<vk::Image>> {
        self.lock()
            .swapchains
            .get(&swapchain)
            .map(|(images, _)| images.clone())
            .ok_or(RenderError::Api(vk::Result::ERROR_UNKNOWN))
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> RenderResult<vk::ImageView> {
        let mut state = self.lock();
        let view = state.handle();
        state.image_views.insert(view);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.lock();
        if !state.image_views.remove(&view) {
            state.violation("destroyed unknown image view");
        }
        state.events.push(GpuEvent::DestroyImageView);
        state.destroy_while_pending("image_view");
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        semaphore: vk::Semaphore,
    ) -> RenderResult<AcquireOutcome> {
        let mut state = self.lock();
        let call = state.acquire_calls;
        state.acquire_calls += 1;

        let suboptimal = match state.acquire_script.get(&call).copied() {
            Some(Scripted::OutOfDate) => {
                state.events.push(GpuEvent::Acquire { image_index: None });
                return Ok(AcquireOutcome::OutOfDate);
            }
            Some(Scripted::Fail(code)) => return Err(RenderError::Api(code)),
            Some(Scripted::Suboptimal) => true,
            None => false,
        };

        let scripted_image = state.acquire_order.pop_front();
        let Some((images, next)) = state.swapchains.get_mut(&swapchain) else {
            state.violation("acquired from unknown swapchain");
            return Err(RenderError::Api(vk::Result::ERROR_SURFACE_LOST_KHR));
        };
        let image_count = images.len();
        let image_index = scripted_image.unwrap_or(*next as u32);
        *next = (image_index as usize + 1) % image_count;

        match state.semaphores.get_mut(&semaphore) {
            Some(signaled) if *signaled => state.violation("acquire signaled an already signaled semaphore"),
            Some(signaled) => *signaled = true,
            None => state.violation("acquire with unknown semaphore"),
        }

        state.acquired.push(image_index);
        state.events.push(GpuEvent::Acquire { image_index: Some(image_index) });
        Ok(AcquireOutcome::Acquired { image_index, suboptimal })
    }

    fn queue_submit(&self, submission: &FrameSubmission) -> RenderResult<()> {
        let mut state = self.lock();
        if let Some(code) = state.submit_failure.take() {
            return Err(RenderError::Api(code));
        }

        match state.semaphores.get_mut(&submission.wait_semaphore) {
            Some(signaled) if *signaled => *signaled = false,
            _ => state.violation("submit waits on a semaphore nothing will signal"),
        }
        match state.semaphores.get_mut(&submission.signal_semaphore) {
            Some(signaled) if !*signaled => *signaled = true,
            _ => state.violation("submit signals a semaphore that is already signaled"),
        }

        match state.fences.get(&submission.fence).copied() {
            Some(f) if f.signaled || f.pending => state.violation("submitted with a fence that was not reset"),
            Some(_) => {}
            None => state.violation("submitted with unknown fence"),
        }

        let cb = submission.command_buffer;
        if state.command_buffer_pending(cb) {
            state.violation("command buffer resubmitted while still pending");
        }
        match state.command_buffers.get(&cb).copied() {
            Some(s) if s.recorded && !s.recording => {}
            _ => state.violation("submitted a command buffer that is not fully recorded"),
        }

        if let Some(f) = state.fences.get_mut(&submission.fence) {
            f.signaled = false;
            f.pending = true;
        }
        state.pending.push_back(PendingWork {
            fence: submission.fence,
            command_buffer: Some(cb),
        });
        state.submissions.push(*submission);
        state.events.push(GpuEvent::Submit { command_buffer: cb, fence: submission.fence });
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RenderResult<PresentOutcome> {
        let mut state = self.lock();
        let call = state.present_calls;
        state.present_calls += 1;

        match state.semaphores.get_mut(&wait_semaphore) {
            Some(signaled) if *signaled => *signaled = false,
            _ => state.violation("present waits on a semaphore nothing will signal"),
        }
        match state.swapchains.get(&swapchain) {
            Some((images, _)) if (image_index as usize) < images.len() => {}
            _ => state.violation("presented an image outside the swapchain"),
        }

        state.events.push(GpuEvent::Present { image_index });
        match state.present_script.get(&call).copied() {
            Some(Scripted::Fail(code)) => Err(RenderError::Api(code)),
            Some(Scripted::OutOfDate) => Ok(PresentOutcome::OutOfDate),
            Some(Scripted::Suboptimal) => Ok(PresentOutcome::Suboptimal),
            None => Ok(PresentOutcome::Presented),
        }
    }

    fn create_command_pool(&self, _queue_family_index: u32) -> RenderResult<vk::CommandPool> {
        let mut state = self.lock();
        let pool = state.handle();
        state.pools.insert(pool, Vec::new());
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.lock();
        match state.pools.remove(&pool) {
            Some(buffers) => {
                for cb in buffers {
                    state.command_buffers.remove(&cb);
                }
            }
            None => state.violation("destroyed unknown command pool"),
        }
        state.destroy_while_pending("command_pool");
    }

    fn allocate_command_buffers(&self, pool: vk::CommandPool, count: u32) -> RenderResult<Vec<vk::CommandBuffer>> {
        let mut state = self.lock();
        if !state.pools.contains_key(&pool) {
            state.violation("allocated from unknown command pool");
            return Err(RenderError::Api(vk::Result::ERROR_UNKNOWN));
        }

        let buffers: Vec<vk::CommandBuffer> = (0..count).map(|_| state.handle()).collect();
        for &cb in &buffers {
            state.command_buffers.insert(cb, CommandBufferState::default());
        }
        if let Some(owned) = state.pools.get_mut(&pool) {
            owned.extend_from_slice(&buffers);
        }
        state.events.push(GpuEvent::AllocateCommandBuffers(buffers.len()));
        Ok(buffers)
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.lock();
        if buffers.iter().any(|&cb| state.command_buffer_pending(cb)) {
            state.violation("freed a command buffer that is still pending");
        }
        for cb in buffers {
            if state.command_buffers.remove(cb).is_none() {
                state.violation("freed unknown command buffer");
            }
        }
        if let Some(owned) = state.pools.get_mut(&pool) {
            owned.retain(|cb| !buffers.contains(cb));
        }
        state.events.push(GpuEvent::FreeCommandBuffers(buffers.len()));
        state.destroyed.push("command_buffers");
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        let mut state = self.lock();
        if state.command_buffer_pending(command_buffer) {
            state.violation("re-recorded a command buffer that is still pending");
        }
        match state.command_buffers.get_mut(&command_buffer) {
            Some(cb) if cb.recording => state.violation("began a command buffer twice"),
            Some(cb) => {
                *cb = CommandBufferState {
                    recording: true,
                    ..CommandBufferState::default()
                };
            }
            None => state.violation("began unknown command buffer"),
        }
        state.events.push(GpuEvent::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RenderResult<()> {
        let mut state = self.lock();
        match state.command_buffers.get_mut(&command_buffer) {
            Some(cb) if cb.recording => {
                cb.recording = false;
                cb.recorded = true;
            }
            _ => state.violation("ended a command buffer that was not recording"),
        }
        state.events.push(GpuEvent::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        _extent: vk::Extent2D,
        _clear_color: [f32; 4],
    ) {
        let mut state = self.lock();
        state.require_recording(command_buffer, "render pass begin");
        if let Some(cb) = state.command_buffers.get_mut(&command_buffer) {
            cb.framebuffer = Some(framebuffer);
        }
        state.events.push(GpuEvent::BeginRenderPass { command_buffer, framebuffer });
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, _pipeline: vk::Pipeline) {
        let mut state = self.lock();
        state.require_recording(command_buffer, "pipeline bind");
        state.events.push(GpuEvent::BindPipeline(command_buffer));
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _descriptor_set: vk::DescriptorSet,
    ) {
        let mut state = self.lock();
        state.require_recording(command_buffer, "descriptor set bind");
        state.events.push(GpuEvent::BindDescriptorSet(command_buffer));
    }

    fn cmd_set_viewport_and_scissor(&self, command_buffer: vk::CommandBuffer, _extent: vk::Extent2D) {
        let mut state = self.lock();
        state.require_recording(command_buffer, "viewport");
        state.events.push(GpuEvent::SetViewportAndScissor(command_buffer));
    }

    fn cmd_draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, _instance_count: u32) {
        let mut state = self.lock();
        state.require_recording(command_buffer, "draw");
        state.events.push(GpuEvent::Draw { command_buffer, vertex_count });
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        let mut state = self.lock();
        state.require_recording(command_buffer, "render pass end");
        state.events.push(GpuEvent::EndRenderPass(command_buffer));
    }
}

/// Scriptable window
pub struct MockWindow {
    size: (u32, u32),
    sizes_on_wait: VecDeque<(u32, u32)>,
    close_after_polls: Option<usize>,
    close_requested: bool,
    resize_pending: bool,
    polls: usize,
    waits: usize,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            sizes_on_wait: VecDeque::new(),
            close_after_polls: None,
            close_requested: false,
            resize_pending: false,
            polls: 0,
            waits: 0,
        }
    }

    /// Report a close request once `polls` event polls have happened
    pub fn close_after(mut self, polls: usize) -> Self {
        self.close_after_polls = Some(polls);
        self
    }

    /// Change the framebuffer size and raise the resize flag
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.resize_pending = true;
    }

    /// Sizes reported after each successive `wait_events`
    pub fn queue_sizes_on_wait(&mut self, sizes: &[(u32, u32)]) {
        self.sizes_on_wait.extend(sizes.iter().copied());
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    pub fn wait_calls(&self) -> usize {
        self.waits
    }

    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }
}

impl WindowSurface for MockWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        self.size
    }

    fn should_close(&self) -> bool {
        self.close_requested || self.close_after_polls.is_some_and(|limit| self.polls >= limit)
    }

    fn poll_events(&mut self) {
        self.polls += 1;
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        match self.sizes_on_wait.pop_front() {
            Some(size) => self.resize(size.0, size.1),
            // Nothing left to report: a real user would eventually close a minimized window
            None => self.close_requested = true,
        }
    }

    fn take_resize_request(&mut self) -> bool {
        std::mem::take(&mut self.resize_pending)
    }
}

/// Content provider with fake framebuffers that checks per-image writes
pub struct MockContent {
    gpu: Arc<MockDevice>,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
    next_handle: u64,
    pub targets_created: usize,
    pub targets_destroyed: usize,
    pub updates: Vec<FrameContext>,
}

impl MockContent {
    pub fn new(gpu: Arc<MockDevice>) -> Self {
        Self {
            gpu,
            framebuffers: Vec::new(),
            extent: vk::Extent2D::default(),
            next_handle: 0xF000_0000,
            targets_created: 0,
            targets_destroyed: 0,
            updates: Vec::new(),
        }
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }
}

impl RenderContent for MockContent {
    fn create_targets(&mut self, swapchain: &Swapchain) -> RenderResult<()> {
        let views = swapchain.image_views();
        if views.len() != swapchain.image_count() {
            return Err(RenderError::invalid("image views missing"));
        }

        self.framebuffers = views
            .iter()
            .map(|_| {
                self.next_handle += 1;
                vk::Framebuffer::from_raw(self.next_handle)
            })
            .collect();
        self.extent = swapchain.extent();
        self.targets_created += 1;
        self.gpu.note("content_targets_created");
        Ok(())
    }

    fn destroy_targets(&mut self) {
        if self.framebuffers.is_empty() {
            return;
        }
        if self.gpu.pending_count() > 0 {
            self.gpu.report_violation("content targets destroyed while GPU work pending");
        }
        self.framebuffers.clear();
        self.targets_destroyed += 1;
        self.gpu.note("content_targets_destroyed");
    }

    fn render_pass_commands(&self, image_index: usize) -> RenderResult<RenderPassCommands> {
        let framebuffer = *checked_index("framebuffer", &self.framebuffers, image_index)?;
        Ok(RenderPassCommands {
            render_pass: vk::RenderPass::from_raw(0xAA),
            framebuffer,
            extent: self.extent,
            clear_color: [0.1, 0.1, 0.1, 1.0],
            pipeline: vk::Pipeline::from_raw(0xBB),
            pipeline_layout: vk::PipelineLayout::from_raw(0xCC),
            descriptor_set: Some(vk::DescriptorSet::from_raw(0xD000 + image_index as u64)),
            vertex_count: 3,
            instance_count: 1,
        })
    }

    fn update_frame(&mut self, frame: &FrameContext) -> RenderResult<()> {
        let framebuffer = *checked_index("framebuffer", &self.framebuffers, frame.image_index)?;
        if self.gpu.framebuffer_in_use(framebuffer) {
            self.gpu
                .report_violation(format!("per-image data for image {} written while in flight", frame.image_index));
        }
        self.updates.push(*frame);
        Ok(())
    }
}
