//! Vulkan backend built on ash and gpu-allocator.
//!
//! The backend is headless: it renders into graph-owned or imported images
//! and leaves presentation to the caller. Rendering uses dynamic rendering
//! (Vulkan 1.3), so there are no render pass or framebuffer objects.

mod barriers;
mod command;
mod conversion;
mod debug;
mod device;
mod instance;
mod pipeline;
mod resource;

pub use barriers::BarrierBatch;
pub use command::{VulkanCommand, VulkanContext, VulkanTextureView};
pub use device::{VulkanCommandPool, VulkanDescriptorPool, VulkanDevice, VulkanPoolBuffer};
pub use pipeline::{VERTEX_STRIDE, VulkanPipelineCache, VulkanShaderCache};
pub use resource::{VulkanObject, VulkanResource, VulkanResourceFactory};

/// Parameters for creating a [`VulkanDevice`].
#[derive(Debug, Clone)]
pub struct VulkanDeviceParameters {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Enable the Khronos validation layer if it is installed.
    pub validation: bool,
}

impl Default for VulkanDeviceParameters {
    fn default() -> Self {
        Self {
            app_name: "RedLilium".to_string(),
            validation: cfg!(debug_assertions),
        }
    }
}

impl VulkanDeviceParameters {
    /// Set the application name.
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }
}
