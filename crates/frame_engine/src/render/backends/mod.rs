//! Concrete GPU backends

pub mod vulkan;
