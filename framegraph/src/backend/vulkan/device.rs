//! Vulkan device and its [`FrameDevice`] implementation.

use std::collections::HashMap;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;

use super::VulkanDeviceParameters;
use super::conversion::{convert_buffer_usage, convert_descriptor_kind, convert_result};
use super::instance::{InstanceBundle, create_instance};
use crate::error::GraphicsError;
use crate::frame::{DescriptorKind, DescriptorLayout, FrameDevice, PoolBuffer};
use crate::types::BufferUsage;

/// Logical device, queue, memory allocator and descriptor set layout cache.
pub struct VulkanDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: Mutex<vk::Queue>,
    queue_family: u32,
    allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    min_uniform_alignment: u64,
    set_layouts: Mutex<HashMap<DescriptorLayout, vk::DescriptorSetLayout>>,
}

impl VulkanDevice {
    /// Create a headless device on the best available GPU.
    pub fn new(params: VulkanDeviceParameters) -> Result<Self, GraphicsError> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e))
        })?;

        let InstanceBundle {
            instance,
            debug_utils,
            debug_messenger,
        } = create_instance(&entry, &params.app_name, params.validation)?;

        let physical_device = select_physical_device(&instance)?;
        let queue_family = find_graphics_queue_family(&instance, physical_device)?;
        let device = create_logical_device(&instance, physical_device, queue_family)?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let min_uniform_alignment = properties.limits.min_uniform_buffer_offset_alignment.max(1);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
        })?;

        log::info!(
            "Vulkan device ready (queue family {}, uniform alignment {})",
            queue_family,
            min_uniform_alignment
        );

        Ok(Self {
            _entry: entry,
            instance,
            debug_utils,
            debug_messenger,
            physical_device,
            device,
            queue: Mutex::new(queue),
            queue_family,
            allocator: ManuallyDrop::new(Arc::new(Mutex::new(allocator))),
            min_uniform_alignment,
            set_layouts: Mutex::new(HashMap::new()),
        })
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    /// The ash device.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// The ash instance.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// The selected physical device.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Graphics queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Shared memory allocator.
    pub fn allocator(&self) -> &Arc<Mutex<Allocator>> {
        &self.allocator
    }

    /// Wait until the queue has drained.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        unsafe { self.device.device_wait_idle() }.map_err(|e| convert_result("wait idle", e))
    }

    /// Descriptor set layout for `layout`, created on first request.
    ///
    /// Layouts live as long as the device.
    pub fn set_layout(
        &self,
        layout: &DescriptorLayout,
    ) -> Result<vk::DescriptorSetLayout, GraphicsError> {
        let mut set_layouts = self.set_layouts.lock();
        if let Some(&set_layout) = set_layouts.get(layout) {
            return Ok(set_layout);
        }

        let bindings: Vec<_> = layout
            .bindings()
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(convert_descriptor_kind(binding.kind))
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let set_layout = unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create descriptor set layout: {:?}",
                    e
                ))
            })?;
        set_layouts.insert(layout.clone(), set_layout);
        Ok(set_layout)
    }

    /// Allocate memory for a buffer or image and bind it.
    pub(super) fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: gpu_allocator::MemoryLocation,
        linear: bool,
    ) -> Result<Allocation, GraphicsError> {
        self.allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to allocate {} memory: {}",
                    name, e
                ))
            })
    }

    /// Return an allocation to the allocator.
    pub(super) fn free_memory(&self, allocation: Allocation) {
        if let Err(e) = self.allocator.lock().free(allocation) {
            log::warn!("Failed to free GPU memory: {}", e);
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            for (_, set_layout) in self.set_layouts.get_mut().drain() {
                self.device.destroy_descriptor_set_layout(set_layout, None);
            }

            // Allocator memory must be released before the device goes away.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Host-visible block buffer of a frame's buffer pool.
pub struct VulkanPoolBuffer {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    device: ash::Device,
    allocator: Arc<Mutex<Allocator>>,
}

impl PoolBuffer for VulkanPoolBuffer {
    type Handle = vk::Buffer;

    fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    fn write(&mut self, offset: u64, data: &[u8]) {
        let Some(mapped) = self
            .allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
        else {
            log::error!("Pool buffer {:?} is not host mapped", self.buffer);
            return;
        };
        let start = offset as usize;
        mapped[start..start + data.len()].copy_from_slice(data);
    }
}

impl Drop for VulkanPoolBuffer {
    fn drop(&mut self) {
        unsafe { self.device.destroy_buffer(self.buffer, None) };
        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.allocator.lock().free(allocation)
        {
            log::warn!("Failed to free pool buffer memory: {}", e);
        }
    }
}

/// Native descriptor pool.
pub struct VulkanDescriptorPool {
    pool: vk::DescriptorPool,
    device: ash::Device,
}

impl VulkanDescriptorPool {
    /// The raw pool handle.
    pub fn raw(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for VulkanDescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

/// Native command pool.
pub struct VulkanCommandPool {
    pool: vk::CommandPool,
    device: ash::Device,
}

impl Drop for VulkanCommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.pool, None) };
    }
}

/// Descriptor counts a pool needs to hold `max_sets` sets of `layout`.
pub fn descriptor_pool_sizes(layout: &DescriptorLayout, max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
    [
        DescriptorKind::UniformBuffer,
        DescriptorKind::StorageBuffer,
        DescriptorKind::SampledTexture,
        DescriptorKind::StorageTexture,
    ]
    .into_iter()
    .filter_map(|kind| {
        let count = layout.count_of(kind);
        (count > 0).then(|| {
            vk::DescriptorPoolSize::default()
                .ty(convert_descriptor_kind(kind))
                .descriptor_count(count * max_sets)
        })
    })
    .collect()
}

impl FrameDevice for VulkanDevice {
    type Buffer = VulkanPoolBuffer;
    type DescriptorPool = VulkanDescriptorPool;
    type DescriptorSet = vk::DescriptorSet;
    type Semaphore = vk::Semaphore;
    type Fence = vk::Fence;
    type CommandPool = VulkanCommandPool;
    type CommandBuffer = vk::CommandBuffer;

    fn min_uniform_alignment(&self) -> u64 {
        self.min_uniform_alignment
    }

    fn create_pool_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
    ) -> Result<VulkanPoolBuffer, GraphicsError> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(convert_buffer_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create pool buffer: {:?}", e))
        })?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let allocation = match self.allocate_memory(
            "frame pool",
            requirements,
            gpu_allocator::MemoryLocation::CpuToGpu,
            true,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            unsafe { self.device.destroy_buffer(buffer, None) };
            self.free_memory(allocation);
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "Failed to bind pool buffer memory: {:?}",
                e
            )));
        }

        Ok(VulkanPoolBuffer {
            buffer,
            allocation: Some(allocation),
            device: self.device.clone(),
            allocator: Arc::clone(&self.allocator),
        })
    }

    fn create_descriptor_pool(
        &self,
        layout: &DescriptorLayout,
        max_sets: u32,
    ) -> Result<VulkanDescriptorPool, GraphicsError> {
        let pool_sizes = descriptor_pool_sizes(layout, max_sets);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { self.device.create_descriptor_pool(&create_info, None) }
            .map_err(|e| convert_result("create descriptor pool", e))?;

        Ok(VulkanDescriptorPool {
            pool,
            device: self.device.clone(),
        })
    }

    fn allocate_descriptor_set(
        &self,
        pool: &mut VulkanDescriptorPool,
        layout: &DescriptorLayout,
    ) -> Result<vk::DescriptorSet, GraphicsError> {
        let set_layouts = [self.set_layout(layout)?];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool.pool)
            .set_layouts(&set_layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }
            .map_err(|e| convert_result("allocate descriptor set", e))?;
        sets.first().copied().ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("No descriptor set returned".to_string())
        })
    }

    fn reset_descriptor_pool(&self, pool: &mut VulkanDescriptorPool) -> Result<(), GraphicsError> {
        unsafe {
            self.device
                .reset_descriptor_pool(pool.pool, vk::DescriptorPoolResetFlags::empty())
        }
        .map_err(|e| convert_result("reset descriptor pool", e))
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore, GraphicsError> {
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&create_info, None) }
            .map_err(|e| convert_result("create semaphore", e))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence, GraphicsError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&create_info, None) }
            .map_err(|e| convert_result("create fence", e))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<(), GraphicsError> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
            .map_err(|e| convert_result("frame fence wait", e))
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<(), GraphicsError> {
        unsafe { self.device.reset_fences(&[fence]) }.map_err(|e| convert_result("reset fence", e))
    }

    fn create_command_pool(&self) -> Result<VulkanCommandPool, GraphicsError> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(self.queue_family);

        let pool = unsafe { self.device.create_command_pool(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create command pool: {:?}", e))
        })?;

        Ok(VulkanCommandPool {
            pool,
            device: self.device.clone(),
        })
    }

    fn allocate_command_buffer(
        &self,
        pool: &mut VulkanCommandPool,
    ) -> Result<vk::CommandBuffer, GraphicsError> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&allocate_info) }
            .map_err(|e| convert_result("allocate command buffer", e))?;
        buffers.first().copied().ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("No command buffer returned".to_string())
        })
    }

    fn reset_command_pool(&self, pool: &mut VulkanCommandPool) -> Result<(), GraphicsError> {
        unsafe {
            self.device
                .reset_command_pool(pool.pool, vk::CommandPoolResetFlags::empty())
        }
        .map_err(|e| convert_result("reset command pool", e))
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), GraphicsError> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(|e| convert_result("begin command buffer", e))
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<(), GraphicsError> {
        unsafe { self.device.end_command_buffer(command_buffer) }
            .map_err(|e| convert_result("end command buffer", e))
    }

    fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait: &[vk::Semaphore],
        signal: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> Result<(), GraphicsError> {
        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; wait.len()];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(wait)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(signal);

        let queue = self.queue.lock();
        unsafe { self.device.queue_submit(*queue, &[submit_info], fence) }
            .map_err(|e| convert_result("queue submit", e))
    }
}

/// Select the best physical device supporting Vulkan 1.3.
///
/// Prefers discrete GPUs over integrated GPUs.
fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice, GraphicsError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    let mut best_device = None;
    let mut best_score = 0;

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.api_version < vk::API_VERSION_1_3 {
            continue;
        }

        let mut score = 1;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }
        score += properties.limits.max_image_dimension2_d / 1024;

        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            properties.device_name_as_c_str().unwrap_or(c"unknown"),
            properties.device_type,
            score
        );

        if score > best_score {
            best_score = score;
            best_device = Some(device);
        }
    }

    best_device.ok_or_else(|| {
        GraphicsError::InitializationFailed("No Vulkan 1.3 capable GPU found".to_string())
    })
}

fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32, GraphicsError> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|index| index as u32)
        .ok_or_else(|| {
            GraphicsError::InitializationFailed("No graphics queue family found".to_string())
        })
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
) -> Result<ash::Device, GraphicsError> {
    let queue_priorities = [1.0f32];
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(&queue_priorities)];

    let mut vulkan_13_features =
        vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .push_next(&mut vulkan_13_features);

    unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
    })
}
