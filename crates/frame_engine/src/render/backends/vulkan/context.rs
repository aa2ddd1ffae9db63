//! Vulkan context management
//!
//! Instance, surface, physical device selection and the logical device with
//! its graphics and present queues. The context owns the surface, so it has
//! to outlive every swapchain built on it; [`VulkanContext::into_gpu_context`]
//! moves it behind the shared device handle the frame loop holds.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::window::GlfwWindow;
use crate::core::config::RendererConfig;
use crate::render::device::GpuDeviceContext;
use crate::render::error::{RenderError, RenderResult};

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

fn c_string(value: &str) -> RenderResult<CString> {
    CString::new(value).map_err(|e| RenderError::InitializationFailed(format!("Invalid name {value:?}: {e}")))
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension, present when validation is enabled
    pub debug_utils: Option<DebugUtils>,
    /// Debug messenger routing validation output into `log`
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, with validation layers when requested
    pub fn new(window: &GlfwWindow, config: &RendererConfig) -> RenderResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| RenderError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let enable_validation = config.validation_enabled();
        let app_name = c_string(&config.application_name)?;
        let engine_name = c_string("FrameEngine")?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = window.required_instance_extensions()?;
        let cstr_extensions = required_extensions
            .iter()
            .map(|ext| c_string(ext))
            .collect::<RenderResult<Vec<_>>>()?;
        let mut extensions: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![c_string(VALIDATION_LAYER)?]
        } else {
            Vec::new()
        };
        let layer_name_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let enabled_features = [vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION];
        let mut validation_features =
            vk::ValidationFeaturesEXT::builder().enabled_validation_features(&enabled_features);

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_name_ptrs);
        if enable_validation {
            create_info = create_info.push_next(&mut validation_features);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(RenderError::Api)?;

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => (Some(debug_utils), Some(messenger)),
                Err(e) => {
                    log::warn!("Validation enabled but debug messenger unavailable: {}", e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        log::debug!(
            "Vulkan instance created (validation {})",
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> RenderResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }.map_err(RenderError::Api)
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Validation layer callback
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device selection and capabilities
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types, used for buffer allocation
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first device with graphics and present support and the swapchain extension
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> RenderResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(RenderError::Api)?;

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader) {
                Ok(info) => {
                    log::info!("Selected GPU: {}", info.name());
                    return Ok(info);
                }
                Err(e) => log::debug!("Skipping physical device: {}", e),
            }
        }

        Err(RenderError::InitializationFailed("No suitable GPU found".to_string()))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> RenderResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut graphics_family = None;
        let mut present_family = None;
        for (index, family) in (0u32..).zip(queue_families.iter()) {
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) }
                .map_err(RenderError::Api)?;
            // Prefer a family that can do both
            if present_support && (present_family.is_none() || graphics_family == Some(index)) {
                present_family = Some(index);
            }

            if graphics_family.is_some() && graphics_family == present_family {
                break;
            }
        }

        let graphics_family = graphics_family
            .ok_or_else(|| RenderError::InitializationFailed("No graphics queue family found".to_string()))?;
        let present_family = present_family
            .ok_or_else(|| RenderError::InitializationFailed("No present queue family found".to_string()))?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }.map_err(RenderError::Api)?;
        let has_swapchain = extensions.iter().any(|available| {
            let name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            name == SwapchainLoader::name()
        });
        if !has_swapchain {
            return Err(RenderError::InitializationFailed(
                "Swapchain extension not supported".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            present_family,
        })
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Index of a memory type allowed by `type_filter` with all of `properties`
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> RenderResult<u32> {
        let memory = &self.memory_properties;
        (0..memory.memory_type_count)
            .find(|&i| {
                type_filter & (1 << i) != 0
                    && memory.memory_types[i as usize].property_flags.contains(properties)
            })
            .ok_or_else(|| RenderError::InitializationFailed("No suitable memory type found".to_string()))
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the logical device with one queue per distinct family
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> RenderResult<Self> {
        let unique_families: HashSet<u32> = [physical_device.graphics_family, physical_device.present_family]
            .into_iter()
            .collect();

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];
        let device_features = vk::PhysicalDeviceFeatures::default();
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device =
            unsafe { instance.create_device(physical_device.device, &create_info, None) }.map_err(RenderError::Api)?;
        let graphics_queue = unsafe { device.get_device_queue(physical_device.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical_device.present_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Core Vulkan objects for one window
///
/// Implements [`GpuDevice`](crate::render::GpuDevice). Queue access is not
/// locked: the frame loop is the only submitter.
pub struct VulkanContext {
    pub(super) surface: vk::SurfaceKHR,
    pub(super) surface_loader: Surface,
    pub(super) physical_device: PhysicalDeviceInfo,
    // Field order is drop order: device before instance
    pub(super) device: LogicalDevice,
    pub(super) instance: VulkanInstance,
}

impl VulkanContext {
    /// Create instance, surface and device for the window
    pub fn new(window: &mut GlfwWindow, config: &RendererConfig) -> RenderResult<Self> {
        let instance = VulkanInstance::new(window, config)?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window.create_vulkan_surface(instance.instance.handle())?;

        let physical_device = match PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader) {
            Ok(info) => info,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let device = match LogicalDevice::new(&instance.instance, &physical_device) {
            Ok(device) => device,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        log::debug!(
            "Vulkan device ready: graphics family {}, present family {}",
            physical_device.graphics_family,
            physical_device.present_family
        );

        Ok(Self {
            surface,
            surface_loader,
            physical_device,
            device,
            instance,
        })
    }

    /// Move the context behind a shared handle for the frame loop
    pub fn into_gpu_context(self) -> GpuDeviceContext {
        let graphics_family = self.physical_device.graphics_family;
        let present_family = self.physical_device.present_family;
        GpuDeviceContext::new(Arc::new(self), graphics_family, present_family)
    }

    /// Get the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the logical device
    pub fn device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Clone of the raw device dispatch table
    ///
    /// Objects created through it must be destroyed before the context.
    pub fn raw_device(&self) -> Device {
        self.device.device.clone()
    }

    /// Get the surface handle
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Get the graphics queue family index
    pub fn graphics_queue_family(&self) -> u32 {
        self.physical_device.graphics_family
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
