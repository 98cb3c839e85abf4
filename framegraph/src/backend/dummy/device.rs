use std::collections::HashMap;
use std::ops::Range;

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::frame::{DescriptorLayout, FrameDevice, PoolBuffer};
use crate::types::BufferUsage;

/// Counters of device objects created by a [`DummyDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Pool block buffers.
    pub buffers_created: usize,
    /// Graph resources (textures and buffers).
    pub resources_created: usize,
    /// Native descriptor pools.
    pub descriptor_pools_created: usize,
    /// Descriptor sets.
    pub descriptor_sets_allocated: usize,
    /// Semaphores created.
    pub semaphores_created: usize,
    /// Semaphores destroyed.
    pub semaphores_destroyed: usize,
    /// Fences created.
    pub fences_created: usize,
    /// Fences destroyed.
    pub fences_destroyed: usize,
    /// Queue submissions.
    pub submissions: usize,
}

#[derive(Default)]
struct DummyState {
    next_id: u64,
    stats: DummyStats,
    fences: HashMap<u64, bool>,
}

impl DummyState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Device that only tracks handles.
///
/// Submissions complete immediately: `submit` signals its fence before
/// returning.
pub struct DummyDevice {
    uniform_alignment: u64,
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Create a device with a 256-byte uniform alignment.
    pub fn new() -> Self {
        Self::with_uniform_alignment(256)
    }

    /// Create a device reporting `alignment` as its minimum uniform offset alignment.
    pub fn with_uniform_alignment(alignment: u64) -> Self {
        Self {
            uniform_alignment: alignment,
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    /// Snapshot of the creation counters.
    pub fn stats(&self) -> DummyStats {
        self.state.lock().stats
    }

    /// Signal a fence (for testing/simulation).
    pub fn signal_fence(&self, fence: u64) {
        if let Some(signaled) = self.state.lock().fences.get_mut(&fence) {
            *signaled = true;
        }
    }

    /// Check if a fence is signaled (non-blocking).
    pub fn is_fence_signaled(&self, fence: u64) -> bool {
        self.state.lock().fences.get(&fence).copied().unwrap_or(false)
    }

    pub(super) fn next_resource_id(&self) -> u64 {
        let mut state = self.state.lock();
        state.stats.resources_created += 1;
        state.next_id()
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// CPU-side pool block.
#[derive(Debug)]
pub struct DummyBuffer {
    id: u64,
    data: Vec<u8>,
}

impl DummyBuffer {
    /// Contents of `range`.
    pub fn bytes(&self, range: Range<u64>) -> &[u8] {
        &self.data[range.start as usize..range.end as usize]
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl PoolBuffer for DummyBuffer {
    type Handle = u64;

    fn handle(&self) -> u64 {
        self.id
    }

    fn write(&mut self, offset: u64, data: &[u8]) {
        let start = offset as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
    }
}

/// Descriptor pool with a hard set limit.
#[derive(Debug)]
pub struct DummyDescriptorPool {
    id: u64,
    max_sets: u32,
    allocated: u32,
}

impl DummyDescriptorPool {
    /// Pool id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sets allocated since the last reset.
    pub fn allocated(&self) -> u32 {
        self.allocated
    }
}

/// Command pool that counts its command buffers.
#[derive(Debug)]
pub struct DummyCommandPool {
    id: u64,
    buffers: u32,
}

impl DummyCommandPool {
    /// Pool id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Command buffers allocated from the pool.
    pub fn buffer_count(&self) -> u32 {
        self.buffers
    }
}

impl FrameDevice for DummyDevice {
    type Buffer = DummyBuffer;
    type DescriptorPool = DummyDescriptorPool;
    type DescriptorSet = u64;
    type Semaphore = u64;
    type Fence = u64;
    type CommandPool = DummyCommandPool;
    type CommandBuffer = u64;

    fn min_uniform_alignment(&self) -> u64 {
        self.uniform_alignment
    }

    fn create_pool_buffer(&self, size: u64, usage: BufferUsage) -> Result<DummyBuffer, GraphicsError> {
        let mut state = self.state.lock();
        state.stats.buffers_created += 1;
        let id = state.next_id();
        log::trace!("DummyDevice: creating {usage:?} block {id} ({size} bytes)");
        Ok(DummyBuffer {
            id,
            data: vec![0; size as usize],
        })
    }

    fn create_descriptor_pool(
        &self,
        _layout: &DescriptorLayout,
        max_sets: u32,
    ) -> Result<DummyDescriptorPool, GraphicsError> {
        let mut state = self.state.lock();
        state.stats.descriptor_pools_created += 1;
        Ok(DummyDescriptorPool {
            id: state.next_id(),
            max_sets,
            allocated: 0,
        })
    }

    fn allocate_descriptor_set(
        &self,
        pool: &mut DummyDescriptorPool,
        _layout: &DescriptorLayout,
    ) -> Result<u64, GraphicsError> {
        if pool.allocated >= pool.max_sets {
            return Err(GraphicsError::OutOfMemory);
        }
        pool.allocated += 1;
        let mut state = self.state.lock();
        state.stats.descriptor_sets_allocated += 1;
        Ok(state.next_id())
    }

    fn reset_descriptor_pool(&self, pool: &mut DummyDescriptorPool) -> Result<(), GraphicsError> {
        pool.allocated = 0;
        Ok(())
    }

    fn create_semaphore(&self) -> Result<u64, GraphicsError> {
        let mut state = self.state.lock();
        state.stats.semaphores_created += 1;
        Ok(state.next_id())
    }

    fn destroy_semaphore(&self, _semaphore: u64) {
        self.state.lock().stats.semaphores_destroyed += 1;
    }

    fn create_fence(&self, signaled: bool) -> Result<u64, GraphicsError> {
        let mut state = self.state.lock();
        state.stats.fences_created += 1;
        let id = state.next_id();
        state.fences.insert(id, signaled);
        Ok(id)
    }

    fn destroy_fence(&self, fence: u64) {
        let mut state = self.state.lock();
        state.fences.remove(&fence);
        state.stats.fences_destroyed += 1;
    }

    fn wait_for_fence(&self, fence: u64, timeout_ns: u64) -> Result<(), GraphicsError> {
        // Nothing runs asynchronously, so an unsignaled fence never signals.
        if self.is_fence_signaled(fence) {
            Ok(())
        } else {
            Err(GraphicsError::Timeout(format!(
                "fence {fence} not signaled within {timeout_ns} ns"
            )))
        }
    }

    fn reset_fence(&self, fence: u64) -> Result<(), GraphicsError> {
        match self.state.lock().fences.get_mut(&fence) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(GraphicsError::InvalidParameter(format!("unknown fence {fence}"))),
        }
    }

    fn create_command_pool(&self) -> Result<DummyCommandPool, GraphicsError> {
        Ok(DummyCommandPool {
            id: self.state.lock().next_id(),
            buffers: 0,
        })
    }

    fn allocate_command_buffer(&self, pool: &mut DummyCommandPool) -> Result<u64, GraphicsError> {
        pool.buffers += 1;
        Ok(self.state.lock().next_id())
    }

    fn reset_command_pool(&self, _pool: &mut DummyCommandPool) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn begin_command_buffer(&self, _command_buffer: u64) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn end_command_buffer(&self, _command_buffer: u64) -> Result<(), GraphicsError> {
        Ok(())
    }

    fn submit(
        &self,
        command_buffer: u64,
        wait: &[u64],
        signal: &[u64],
        fence: u64,
    ) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyDevice: submit {command_buffer} (wait {wait:?}, signal {signal:?})"
        );
        let mut state = self.state.lock();
        state.stats.submissions += 1;
        match state.fences.get_mut(&fence) {
            Some(signaled) => {
                *signaled = true;
                Ok(())
            }
            None => Err(GraphicsError::InvalidParameter(format!("unknown fence {fence}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_lifecycle() {
        let device = DummyDevice::new();
        let fence = device.create_fence(false).unwrap();
        assert!(device.wait_for_fence(fence, 0).is_err());

        device.submit(1, &[], &[], fence).unwrap();
        assert!(device.wait_for_fence(fence, 0).is_ok());

        device.reset_fence(fence).unwrap();
        assert!(!device.is_fence_signaled(fence));

        device.destroy_fence(fence);
        assert!(device.reset_fence(fence).is_err());
        assert_eq!(device.stats().fences_destroyed, 1);
    }

    #[test]
    fn test_descriptor_pool_enforces_capacity() {
        let device = DummyDevice::new();
        let layout = DescriptorLayout::uniform(0);
        let mut pool = device.create_descriptor_pool(&layout, 1).unwrap();
        device.allocate_descriptor_set(&mut pool, &layout).unwrap();
        assert_eq!(
            device.allocate_descriptor_set(&mut pool, &layout),
            Err(GraphicsError::OutOfMemory)
        );
        device.reset_descriptor_pool(&mut pool).unwrap();
        assert!(device.allocate_descriptor_set(&mut pool, &layout).is_ok());
    }
}
