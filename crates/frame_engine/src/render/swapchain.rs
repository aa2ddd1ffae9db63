//! Swapchain management
//!
//! [`SwapchainManager`] owns the presentable image chain. A swapchain is never
//! mutated in place: recreation means [`SwapchainManager::clean_up`] followed
//! by a fresh [`SwapchainManager::create_swapchain`] and
//! [`SwapchainManager::create_image_views`].
//!
//! Negotiation with the surface goes through small pure helpers
//! (`choose_*`) so the selection rules can be tested without a device.

use ash::vk;
use std::sync::Arc;

use super::device::{AcquireOutcome, GpuDevice, GpuDeviceContext, PresentOutcome, SwapchainDesc};
use super::error::{checked_index, RenderError, RenderResult};
use super::WAIT_FOREVER;

/// Pick B8G8R8A8_SRGB with a non-linear sRGB colour space, else the first format offered
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RenderResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| RenderError::UnsupportedSurface("no surface formats available".to_string()))
}

/// Pick MAILBOX when allowed and offered, else FIFO
///
/// FIFO is the only mode Vulkan guarantees, but a surface reporting
/// no modes at all is still rejected.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], prefer_low_latency: bool) -> RenderResult<vk::PresentModeKHR> {
    if modes.is_empty() {
        return Err(RenderError::UnsupportedSurface("no present modes available".to_string()));
    }

    if prefer_low_latency && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        Ok(vk::PresentModeKHR::MAILBOX)
    } else {
        Ok(vk::PresentModeKHR::FIFO)
    }
}

/// Use the surface's current extent, or the framebuffer size clamped to the
/// surface limits when the extent is undefined (`u32::MAX`)
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, framebuffer_size: (u32, u32)) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: framebuffer_size
            .0
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: framebuffer_size
            .1
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// Extent a swapchain created now would get
///
/// Can be zero even for a visible window: some drivers report a 0x0 current
/// extent for a moment while the window is being minimized.
pub fn surface_extent(ctx: &GpuDeviceContext, framebuffer_size: (u32, u32)) -> RenderResult<vk::Extent2D> {
    Ok(choose_extent(&ctx.device().surface_capabilities()?, framebuffer_size))
}

/// One more than the minimum, clamped to the maximum when the surface has one
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Identity when the surface supports it, else whatever the surface currently uses
pub fn choose_pre_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps.supported_transforms.contains(vk::SurfaceTransformFlagsKHR::IDENTITY) {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

/// Snapshot of a swapchain's negotiated properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainInfo {
    /// Image format and colour space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Image extent in pixels
    pub extent: vk::Extent2D,
    /// Present mode
    pub present_mode: vk::PresentModeKHR,
    /// Number of images the driver actually created
    pub image_count: usize,
}

impl SwapchainInfo {
    /// Width over height
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height.max(1) as f32
    }
}

/// Image view wrapper with RAII cleanup
pub struct ImageView {
    device: Arc<dyn GpuDevice>,
    view: vk::ImageView,
}

impl ImageView {
    /// Create a 2D colour view with identity swizzle and a single mip level
    pub fn new(device: Arc<dyn GpuDevice>, image: vk::Image, format: vk::Format) -> RenderResult<Self> {
        let view = device.create_image_view(image, format)?;
        Ok(Self { device, view })
    }

    /// Get the image view handle
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        self.device.destroy_image_view(self.view);
    }
}

/// Swapchain wrapper with RAII cleanup
///
/// Views are destroyed before the swapchain itself.
pub struct Swapchain {
    device: Arc<dyn GpuDevice>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<ImageView>,
    info: SwapchainInfo,
}

impl Swapchain {
    fn new(device: Arc<dyn GpuDevice>, desc: &SwapchainDesc) -> RenderResult<Self> {
        let swapchain = device.create_swapchain(desc)?;
        let images = match device.swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                device.destroy_swapchain(swapchain);
                return Err(e);
            }
        };

        let info = SwapchainInfo {
            surface_format: desc.surface_format,
            extent: desc.extent,
            present_mode: desc.present_mode,
            image_count: images.len(),
        };

        Ok(Self {
            device,
            swapchain,
            images,
            image_views: Vec::new(),
            info,
        })
    }

    fn create_views(&mut self) -> RenderResult<()> {
        self.image_views.clear();
        let format = self.info.surface_format.format;
        for &image in &self.images {
            self.image_views.push(ImageView::new(self.device.clone(), image, format)?);
        }
        Ok(())
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Negotiated properties
    pub fn info(&self) -> &SwapchainInfo {
        &self.info
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.info.extent
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Image views, one per image; empty until views are created
    pub fn image_views(&self) -> Vec<vk::ImageView> {
        self.image_views.iter().map(ImageView::handle).collect()
    }

    /// View of a single image
    pub fn image_view(&self, image_index: usize) -> RenderResult<vk::ImageView> {
        checked_index("swapchain image view", &self.image_views, image_index).map(ImageView::handle)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.image_views.clear();
        self.device.destroy_swapchain(self.swapchain);
    }
}

/// Owns the current swapchain, if any
pub struct SwapchainManager {
    swapchain: Option<Swapchain>,
    prefer_low_latency: bool,
}

impl SwapchainManager {
    /// Create a manager with no swapchain
    pub fn new(prefer_low_latency: bool) -> Self {
        Self {
            swapchain: None,
            prefer_low_latency,
        }
    }

    /// Negotiate with the surface and create a swapchain
    ///
    /// Refuses a zero-area framebuffer; the caller is expected to wait for the
    /// window to become visible first. Any previous swapchain must have been
    /// released with [`clean_up`](Self::clean_up).
    pub fn create_swapchain(&mut self, ctx: &GpuDeviceContext, framebuffer_size: (u32, u32)) -> RenderResult<SwapchainInfo> {
        if self.swapchain.is_some() {
            return Err(RenderError::invalid("Swapchain already exists, clean up before recreating"));
        }
        if framebuffer_size.0 == 0 || framebuffer_size.1 == 0 {
            return Err(RenderError::invalid(format!(
                "Refusing to create a swapchain for a {}x{} framebuffer",
                framebuffer_size.0, framebuffer_size.1
            )));
        }

        let device = ctx.device();
        let caps = device.surface_capabilities()?;
        let surface_format = choose_surface_format(&device.surface_formats()?)?;
        let present_mode = choose_present_mode(&device.surface_present_modes()?, self.prefer_low_latency)?;
        let extent = choose_extent(&caps, framebuffer_size);
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::invalid("Surface reported a zero-area extent"));
        }

        let desc = SwapchainDesc {
            surface_format,
            extent,
            present_mode,
            min_image_count: choose_image_count(&caps),
            pre_transform: choose_pre_transform(&caps),
            sharing: ctx.image_sharing(),
        };

        let swapchain = Swapchain::new(device.clone(), &desc)?;
        let info = *swapchain.info();
        log::debug!(
            "Created swapchain {}x{} {:?} {:?} with {} images",
            info.extent.width,
            info.extent.height,
            info.surface_format.format,
            info.present_mode,
            info.image_count
        );

        self.swapchain = Some(swapchain);
        Ok(info)
    }

    /// Create one view per swapchain image
    pub fn create_image_views(&mut self) -> RenderResult<()> {
        self.swapchain
            .as_mut()
            .ok_or_else(|| RenderError::invalid("No swapchain to create image views for"))?
            .create_views()
    }

    /// Destroy views, then the swapchain
    ///
    /// Must only be called once no in-flight GPU work references the images.
    pub fn clean_up(&mut self) {
        if self.swapchain.take().is_some() {
            log::debug!("Destroyed swapchain");
        }
    }

    /// The current swapchain
    pub fn swapchain(&self) -> RenderResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| RenderError::invalid("No swapchain"))
    }

    /// Properties of the current swapchain, if one exists
    pub fn info(&self) -> Option<SwapchainInfo> {
        self.swapchain.as_ref().map(|sc| *sc.info())
    }

    /// Acquire the next image, signaling `semaphore` when it is ready
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RenderResult<AcquireOutcome> {
        let swapchain = self.swapchain()?;
        swapchain
            .device
            .acquire_next_image(swapchain.swapchain, WAIT_FOREVER, semaphore)
    }

    /// Present `image_index` once `wait_semaphore` is signaled
    pub fn present(&self, image_index: u32, wait_semaphore: vk::Semaphore) -> RenderResult<PresentOutcome> {
        let swapchain = self.swapchain()?;
        swapchain
            .device
            .queue_present(swapchain.swapchain, image_index, wait_semaphore)
    }
}
