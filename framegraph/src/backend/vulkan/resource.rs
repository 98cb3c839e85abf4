//! Images and buffers owned by the frame graph.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;

use super::VulkanDevice;
use super::conversion::{
    convert_aspect, convert_buffer_usage, convert_texture_format, convert_texture_usage,
};
use crate::allocator::ResourceFactory;
use crate::error::GraphicsError;
use crate::sync::{AccessScope, TrackedResource};
use crate::types::{BufferDescriptor, ResourceDescriptor, TextureDescriptor};

/// Native object behind a [`VulkanResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VulkanObject {
    /// Image with a full-resource view.
    Texture {
        /// Image handle.
        image: vk::Image,
        /// View covering every mip and layer.
        view: vk::ImageView,
        /// Image format.
        format: vk::Format,
        /// Aspect of the view.
        aspect: vk::ImageAspectFlags,
        /// Size of mip 0.
        extent: vk::Extent3D,
    },
    /// Buffer.
    Buffer {
        /// Buffer handle.
        buffer: vk::Buffer,
        /// Size in bytes.
        size: u64,
    },
}

/// A texture or buffer plus the access scope it was last used with.
///
/// Resources created by [`VulkanResourceFactory`] own their memory.
/// Imported resources only borrow the native handles.
pub struct VulkanResource {
    object: VulkanObject,
    scope: AccessScope,
    allocation: Option<Allocation>,
    owner: Option<Arc<VulkanDevice>>,
}

impl VulkanResource {
    /// Wrap an externally owned image, e.g. a swapchain image.
    ///
    /// `scope` is the state the image is in right now.
    pub fn import_texture(
        image: vk::Image,
        view: vk::ImageView,
        descriptor: &TextureDescriptor,
        scope: AccessScope,
    ) -> Self {
        Self {
            object: VulkanObject::Texture {
                image,
                view,
                format: convert_texture_format(descriptor.format),
                aspect: convert_aspect(descriptor.format),
                extent: convert_extent(descriptor),
            },
            scope,
            allocation: None,
            owner: None,
        }
    }

    /// Wrap an externally owned buffer.
    pub fn import_buffer(buffer: vk::Buffer, size: u64, scope: AccessScope) -> Self {
        Self {
            object: VulkanObject::Buffer { buffer, size },
            scope,
            allocation: None,
            owner: None,
        }
    }

    /// Native object.
    pub fn object(&self) -> &VulkanObject {
        &self.object
    }

    /// Image handle, if this is a texture.
    pub fn image(&self) -> Option<vk::Image> {
        match self.object {
            VulkanObject::Texture { image, .. } => Some(image),
            VulkanObject::Buffer { .. } => None,
        }
    }

    /// Image view, if this is a texture.
    pub fn view(&self) -> Option<vk::ImageView> {
        match self.object {
            VulkanObject::Texture { view, .. } => Some(view),
            VulkanObject::Buffer { .. } => None,
        }
    }

    /// Returns true if the resource releases its native objects on drop.
    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    fn create_texture(
        device: &Arc<VulkanDevice>,
        descriptor: &TextureDescriptor,
    ) -> Result<Self, GraphicsError> {
        let raw = device.raw();
        let format = convert_texture_format(descriptor.format);
        let aspect = convert_aspect(descriptor.format);
        let extent = convert_extent(descriptor);

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(descriptor.mip_level_count)
            .array_layers(1)
            .samples(convert_sample_count(descriptor.sample_count))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(descriptor.usage, descriptor.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { raw.create_image(&image_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create image: {:?}", e))
        })?;

        let requirements = unsafe { raw.get_image_memory_requirements(image) };
        let allocation = match device.allocate_memory(
            "graph texture",
            requirements,
            gpu_allocator::MemoryLocation::GpuOnly,
            false,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { raw.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe { raw.bind_image_memory(image, allocation.memory(), allocation.offset()) };
        let view = bound.and_then(|()| {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect,
                    base_mip_level: 0,
                    level_count: descriptor.mip_level_count,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            unsafe { raw.create_image_view(&view_info, None) }
        });
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                unsafe { raw.destroy_image(image, None) };
                device.free_memory(allocation);
                return Err(GraphicsError::ResourceCreationFailed(format!(
                    "Failed to set up image: {:?}",
                    e
                )));
            }
        };

        Ok(Self {
            object: VulkanObject::Texture {
                image,
                view,
                format,
                aspect,
                extent,
            },
            scope: AccessScope::UNDEFINED,
            allocation: Some(allocation),
            owner: Some(Arc::clone(device)),
        })
    }

    fn create_buffer(
        device: &Arc<VulkanDevice>,
        descriptor: &BufferDescriptor,
    ) -> Result<Self, GraphicsError> {
        let raw = device.raw();
        let buffer_info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { raw.create_buffer(&buffer_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create buffer: {:?}", e))
        })?;

        let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
        let allocation = match device.allocate_memory(
            "graph buffer",
            requirements,
            gpu_allocator::MemoryLocation::GpuOnly,
            true,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { raw.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) =
            unsafe { raw.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        {
            unsafe { raw.destroy_buffer(buffer, None) };
            device.free_memory(allocation);
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "Failed to bind buffer memory: {:?}",
                e
            )));
        }

        Ok(Self {
            object: VulkanObject::Buffer {
                buffer,
                size: descriptor.size,
            },
            scope: AccessScope::UNDEFINED,
            allocation: Some(allocation),
            owner: Some(Arc::clone(device)),
        })
    }
}

impl TrackedResource for VulkanResource {
    fn access_scope(&self) -> AccessScope {
        self.scope
    }

    fn set_access_scope(&mut self, scope: AccessScope) {
        self.scope = scope;
    }
}

impl Drop for VulkanResource {
    fn drop(&mut self) {
        let Some(device) = self.owner.take() else {
            return;
        };
        let raw = device.raw();
        unsafe {
            match self.object {
                VulkanObject::Texture { image, view, .. } => {
                    raw.destroy_image_view(view, None);
                    raw.destroy_image(image, None);
                }
                VulkanObject::Buffer { buffer, .. } => raw.destroy_buffer(buffer, None),
            }
        }
        if let Some(allocation) = self.allocation.take() {
            device.free_memory(allocation);
        }
    }
}

/// Creates device-local [`VulkanResource`]s for a
/// [`PooledAllocator`](crate::allocator::PooledAllocator).
pub struct VulkanResourceFactory {
    device: Arc<VulkanDevice>,
}

impl VulkanResourceFactory {
    /// Create a factory on `device`.
    pub fn new(device: Arc<VulkanDevice>) -> Self {
        Self { device }
    }
}

impl ResourceFactory for VulkanResourceFactory {
    type Resource = VulkanResource;

    fn create(&mut self, descriptor: &ResourceDescriptor) -> Result<VulkanResource, GraphicsError> {
        match descriptor {
            ResourceDescriptor::Texture(texture) => {
                VulkanResource::create_texture(&self.device, texture)
            }
            ResourceDescriptor::Buffer(buffer) => VulkanResource::create_buffer(&self.device, buffer),
        }
    }
}

fn convert_extent(descriptor: &TextureDescriptor) -> vk::Extent3D {
    vk::Extent3D {
        width: descriptor.size.width,
        height: descriptor.size.height,
        depth: 1,
    }
}

fn convert_sample_count(count: u32) -> vk::SampleCountFlags {
    match count {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}
