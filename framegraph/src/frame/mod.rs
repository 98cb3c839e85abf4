//! Frame-in-flight state.
//!
//! A [`Frame`] owns everything that is recycled once per frame slot: a
//! command pool with its command buffer, one [`BufferPool`] per usage class,
//! one [`DescriptorPool`] per layout, a [`SemaphorePool`] and the completion
//! fence. [`FrameRing`] cycles through `frames_in_flight` frames:
//!
//! ```text
//! begin_frame(N)    wait fence[N % k] -> reset pools[N % k] -> begin recording
//! submit            end recording -> reset fence -> queue submit (signals fence)
//! ```
//!
//! Waiting on the slot's fence is the only blocking point; it bounds how far
//! the CPU can run ahead of the GPU.

mod buffer_pool;
mod descriptor_pool;
mod semaphore_pool;

pub use buffer_pool::{BufferAllocation, BufferPool};
pub use descriptor_pool::{
    DescriptorBinding, DescriptorKind, DescriptorLayout, DescriptorPool, DescriptorPoolEntry,
};
pub use semaphore_pool::SemaphorePool;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use redlilium_core::profile_scope;

use crate::error::GraphicsError;
use crate::types::BufferUsage;

/// Default number of frames in flight.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

/// A pool block the CPU can write into.
pub trait PoolBuffer {
    /// Copyable handle identifying the buffer in allocations.
    type Handle: Copy + Eq + fmt::Debug;

    /// Handle of this buffer.
    fn handle(&self) -> Self::Handle;

    /// Copy `data` to `offset`.
    fn write(&mut self, offset: u64, data: &[u8]);
}

/// Device operations the frame pools are built on.
///
/// Semaphores, fences, descriptor sets and command buffers are plain handles
/// destroyed through the device. Buffers, descriptor pools and command pools
/// are owned values released on drop.
pub trait FrameDevice {
    /// Pool block buffer.
    type Buffer: PoolBuffer;
    /// Native descriptor pool.
    type DescriptorPool;
    /// Descriptor set handle.
    type DescriptorSet: Copy + fmt::Debug;
    /// Binary semaphore handle.
    type Semaphore: Copy + Eq + fmt::Debug;
    /// Fence handle.
    type Fence: Copy + fmt::Debug;
    /// Native command pool.
    type CommandPool;
    /// Command buffer handle.
    type CommandBuffer: Copy + fmt::Debug;

    /// Minimum offset alignment of uniform buffer bindings.
    fn min_uniform_alignment(&self) -> u64;

    /// Create a host-visible block buffer.
    fn create_pool_buffer(&self, size: u64, usage: BufferUsage)
    -> Result<Self::Buffer, GraphicsError>;

    /// Create a descriptor pool holding up to `max_sets` sets of `layout`.
    fn create_descriptor_pool(
        &self,
        layout: &DescriptorLayout,
        max_sets: u32,
    ) -> Result<Self::DescriptorPool, GraphicsError>;

    /// Allocate a set of `layout` from `pool`.
    fn allocate_descriptor_set(
        &self,
        pool: &mut Self::DescriptorPool,
        layout: &DescriptorLayout,
    ) -> Result<Self::DescriptorSet, GraphicsError>;

    /// Return every set of `pool`.
    fn reset_descriptor_pool(&self, pool: &mut Self::DescriptorPool)
    -> Result<(), GraphicsError>;

    /// Create a binary semaphore.
    fn create_semaphore(&self) -> Result<Self::Semaphore, GraphicsError>;

    /// Destroy a semaphore.
    fn destroy_semaphore(&self, semaphore: Self::Semaphore);

    /// Create a fence.
    fn create_fence(&self, signaled: bool) -> Result<Self::Fence, GraphicsError>;

    /// Destroy a fence.
    fn destroy_fence(&self, fence: Self::Fence);

    /// Block until `fence` is signaled or `timeout_ns` elapses.
    fn wait_for_fence(&self, fence: Self::Fence, timeout_ns: u64) -> Result<(), GraphicsError>;

    /// Return `fence` to the unsignaled state.
    fn reset_fence(&self, fence: Self::Fence) -> Result<(), GraphicsError>;

    /// Create a command pool.
    fn create_command_pool(&self) -> Result<Self::CommandPool, GraphicsError>;

    /// Allocate a primary command buffer from `pool`.
    fn allocate_command_buffer(
        &self,
        pool: &mut Self::CommandPool,
    ) -> Result<Self::CommandBuffer, GraphicsError>;

    /// Reset `pool` and every command buffer allocated from it.
    fn reset_command_pool(&self, pool: &mut Self::CommandPool) -> Result<(), GraphicsError>;

    /// Start recording `command_buffer`.
    fn begin_command_buffer(&self, command_buffer: Self::CommandBuffer)
    -> Result<(), GraphicsError>;

    /// Finish recording `command_buffer`.
    fn end_command_buffer(&self, command_buffer: Self::CommandBuffer)
    -> Result<(), GraphicsError>;

    /// Submit `command_buffer`, signaling `fence` on completion.
    fn submit(
        &self,
        command_buffer: Self::CommandBuffer,
        wait: &[Self::Semaphore],
        signal: &[Self::Semaphore],
        fence: Self::Fence,
    ) -> Result<(), GraphicsError>;
}

/// Sizing of the per-frame pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Number of frame slots.
    pub frames_in_flight: usize,
    /// Block size of the uniform pool.
    pub uniform_block_size: u64,
    /// Block size of the vertex pool.
    pub vertex_block_size: u64,
    /// Block size of the index pool.
    pub index_block_size: u64,
    /// Block size of the storage pool and any other usage class.
    pub storage_block_size: u64,
    /// Capacity of each native descriptor pool.
    pub descriptor_sets_per_pool: u32,
    /// Maximum time to wait on a frame fence.
    pub fence_timeout_ns: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            uniform_block_size: 256 * 1024,
            vertex_block_size: 1024 * 1024,
            index_block_size: 1024 * 1024,
            storage_block_size: 1024 * 1024,
            descriptor_sets_per_pool: 16,
            fence_timeout_ns: 10_000_000_000,
        }
    }
}

impl FrameConfig {
    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, count: usize) -> Self {
        self.frames_in_flight = count;
        self
    }

    /// Set the uniform pool block size.
    pub fn with_uniform_block_size(mut self, size: u64) -> Self {
        self.uniform_block_size = size;
        self
    }

    /// Set the descriptor pool capacity.
    pub fn with_descriptor_sets_per_pool(mut self, count: u32) -> Self {
        self.descriptor_sets_per_pool = count;
        self
    }

    /// Set the fence wait timeout.
    pub fn with_fence_timeout_ns(mut self, timeout: u64) -> Self {
        self.fence_timeout_ns = timeout;
        self
    }

    /// Block size used for a buffer pool of `usage`.
    pub fn block_size_for(&self, usage: BufferUsage) -> u64 {
        if usage.contains(BufferUsage::UNIFORM) {
            self.uniform_block_size
        } else if usage.contains(BufferUsage::VERTEX) {
            self.vertex_block_size
        } else if usage.contains(BufferUsage::INDEX) {
            self.index_block_size
        } else {
            self.storage_block_size
        }
    }
}

/// Per-slot pools, command recording scope and completion fence.
pub struct Frame<D: FrameDevice> {
    command_pool: D::CommandPool,
    command_buffer: D::CommandBuffer,
    fence: D::Fence,
    buffer_pools: HashMap<BufferUsage, BufferPool<D>>,
    descriptor_pools: HashMap<DescriptorLayout, DescriptorPool<D>>,
    semaphore_pool: SemaphorePool<D>,
    config: FrameConfig,
    recording: bool,
    device: Arc<D>,
}

impl<D: FrameDevice> Frame<D> {
    /// Create a frame whose fence starts signaled, so the first wait returns.
    pub fn new(device: Arc<D>, config: FrameConfig) -> Result<Self, GraphicsError> {
        let mut command_pool = device.create_command_pool()?;
        let command_buffer = device.allocate_command_buffer(&mut command_pool)?;
        let fence = device.create_fence(true)?;

        Ok(Self {
            command_pool,
            command_buffer,
            fence,
            buffer_pools: HashMap::new(),
            descriptor_pools: HashMap::new(),
            semaphore_pool: SemaphorePool::new(Arc::clone(&device)),
            config,
            recording: false,
            device,
        })
    }

    /// Block until the GPU finished the work last submitted from this frame.
    pub fn wait(&self) -> Result<(), GraphicsError> {
        self.device
            .wait_for_fence(self.fence, self.config.fence_timeout_ns)
    }

    /// Wait for the fence, then recycle every pool of this frame.
    pub fn reset(&mut self) -> Result<(), GraphicsError> {
        assert!(!self.recording, "cannot reset a frame while it is recording");
        self.wait()?;

        self.device.reset_command_pool(&mut self.command_pool)?;
        for pool in self.buffer_pools.values_mut() {
            pool.reset();
        }
        for pool in self.descriptor_pools.values_mut() {
            pool.reset()?;
        }
        self.semaphore_pool.reset();
        Ok(())
    }

    /// Start recording the frame's command buffer.
    pub fn begin(&mut self) -> Result<(), GraphicsError> {
        assert!(!self.recording, "frame is already recording");
        self.device.begin_command_buffer(self.command_buffer)?;
        self.recording = true;
        Ok(())
    }

    /// Finish recording and submit, signaling the frame's fence on completion.
    pub fn submit(
        &mut self,
        wait: &[D::Semaphore],
        signal: &[D::Semaphore],
    ) -> Result<(), GraphicsError> {
        assert!(self.recording, "submit called on a frame that is not recording");
        self.device.end_command_buffer(self.command_buffer)?;
        self.recording = false;
        self.device.reset_fence(self.fence)?;
        self.device
            .submit(self.command_buffer, wait, signal, self.fence)
    }

    /// Buffer pool for `usage`, created on first use.
    pub fn buffer_pool(&mut self, usage: BufferUsage) -> &mut BufferPool<D> {
        let device = &self.device;
        let config = &self.config;
        self.buffer_pools
            .entry(usage)
            .or_insert_with(|| BufferPool::new(Arc::clone(device), config.block_size_for(usage), usage))
    }

    /// Reserve transient buffer space.
    pub fn allocate_buffer(
        &mut self,
        usage: BufferUsage,
        size: u64,
    ) -> Result<BufferAllocation<<D::Buffer as PoolBuffer>::Handle>, GraphicsError> {
        self.buffer_pool(usage).allocate(size)
    }

    /// Reserve transient buffer space and fill it.
    pub fn allocate_buffer_with_data(
        &mut self,
        usage: BufferUsage,
        data: &[u8],
    ) -> Result<BufferAllocation<<D::Buffer as PoolBuffer>::Handle>, GraphicsError> {
        self.buffer_pool(usage).allocate_with_data(data)
    }

    /// Allocate a descriptor set of `layout`.
    pub fn allocate_descriptor_set(
        &mut self,
        layout: &DescriptorLayout,
    ) -> Result<D::DescriptorSet, GraphicsError> {
        let device = &self.device;
        let sets_per_pool = self.config.descriptor_sets_per_pool;
        self.descriptor_pools
            .entry(layout.clone())
            .or_insert_with(|| DescriptorPool::new(Arc::clone(device), layout.clone(), sets_per_pool))
            .allocate()
    }

    /// Descriptor pool for `layout`, if one was created.
    pub fn descriptor_pool(&self, layout: &DescriptorLayout) -> Option<&DescriptorPool<D>> {
        self.descriptor_pools.get(layout)
    }

    /// Pool-owned semaphore, valid until the next reset.
    pub fn request_semaphore(&mut self) -> Result<D::Semaphore, GraphicsError> {
        self.semaphore_pool.request_semaphore()
    }

    /// Semaphore owned by the caller until released.
    pub fn request_owned_semaphore(&mut self) -> Result<D::Semaphore, GraphicsError> {
        self.semaphore_pool.request_owned_semaphore()
    }

    /// Return an owned semaphore.
    pub fn release_owned_semaphore(&mut self, semaphore: D::Semaphore) {
        self.semaphore_pool.release_owned_semaphore(semaphore);
    }

    /// The frame's semaphore pool.
    pub fn semaphore_pool(&self) -> &SemaphorePool<D> {
        &self.semaphore_pool
    }

    /// The command buffer being recorded.
    pub fn command_buffer(&self) -> D::CommandBuffer {
        self.command_buffer
    }

    /// The completion fence.
    pub fn fence(&self) -> D::Fence {
        self.fence
    }

    /// Returns true between [`begin`](Self::begin) and [`submit`](Self::submit).
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// The device the frame was created on.
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }
}

impl<D: FrameDevice> Drop for Frame<D> {
    fn drop(&mut self) {
        if let Err(err) = self.wait() {
            log::warn!("Dropping frame whose fence did not signal: {err}");
        }
        self.device.destroy_fence(self.fence);
    }
}

/// Ring of frames in flight.
pub struct FrameRing<D: FrameDevice> {
    frames: Vec<Frame<D>>,
    current: usize,
    frame_count: u64,
}

impl<D: FrameDevice> FrameRing<D> {
    /// Create `config.frames_in_flight` frames.
    pub fn new(device: Arc<D>, config: FrameConfig) -> Result<Self, GraphicsError> {
        if config.frames_in_flight == 0 {
            return Err(GraphicsError::InvalidParameter(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }

        let frames = (0..config.frames_in_flight)
            .map(|_| Frame::new(Arc::clone(&device), config.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!("Created frame ring with {} frames in flight", frames.len());

        Ok(Self {
            frames,
            current: 0,
            frame_count: 0,
        })
    }

    /// Advance to the next slot, wait for its previous work and start recording.
    pub fn begin_frame(&mut self) -> Result<&mut Frame<D>, GraphicsError> {
        profile_scope!("begin_frame");

        self.current = (self.frame_count % self.frames.len() as u64) as usize;
        self.frame_count += 1;
        log::trace!(
            "Beginning frame {} in slot {}",
            self.frame_count,
            self.current
        );

        let frame = &mut self.frames[self.current];
        frame.reset()?;
        frame.begin()?;
        Ok(frame)
    }

    /// The frame of the current slot.
    pub fn current_frame(&mut self) -> &mut Frame<D> {
        &mut self.frames[self.current]
    }

    /// Current slot index.
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Number of frames begun so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Number of slots.
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Wait for every slot's outstanding work.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        for frame in &self.frames {
            frame.wait()?;
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;

    fn ring(frames: usize) -> (Arc<DummyDevice>, FrameRing<DummyDevice>) {
        let device = Arc::new(DummyDevice::new());
        let ring = FrameRing::new(
            device.clone(),
            FrameConfig::default().with_frames_in_flight(frames),
        )
        .unwrap();
        (device, ring)
    }

    #[test]
    fn test_ring_cycles_slots() {
        let (_device, mut ring) = ring(2);
        let mut slots = Vec::new();
        for _ in 0..5 {
            ring.begin_frame().unwrap().submit(&[], &[]).unwrap();
            slots.push(ring.current_slot());
        }
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(ring.frame_count(), 5);
    }

    #[test]
    fn test_begin_frame_resets_pools() {
        let (_device, mut ring) = ring(1);
        {
            let frame = ring.begin_frame().unwrap();
            frame.allocate_buffer(BufferUsage::UNIFORM, 64).unwrap();
            frame.allocate_buffer(BufferUsage::UNIFORM, 64).unwrap();
            frame.request_semaphore().unwrap();
            frame.submit(&[], &[]).unwrap();
        }

        let frame = ring.begin_frame().unwrap();
        let allocation = frame.allocate_buffer(BufferUsage::UNIFORM, 64).unwrap();
        assert_eq!(allocation.offset, 0);
        assert_eq!(frame.semaphore_pool().active_count(), 0);
    }

    #[test]
    fn test_unsubmitted_slot_times_out() {
        let device = Arc::new(DummyDevice::new());
        let mut frame = Frame::new(device, FrameConfig::default()).unwrap();
        frame.reset().unwrap();
        frame.begin().unwrap();
        frame.submit(&[], &[]).unwrap();
        assert!(frame.wait().is_ok());

        // A fence reset without a submission never signals.
        frame.device().reset_fence(frame.fence()).unwrap();
        assert!(matches!(frame.wait(), Err(GraphicsError::Timeout(_))));
        frame.device().signal_fence(frame.fence());
    }

    #[test]
    fn test_descriptor_pools_are_per_layout() {
        let device = Arc::new(DummyDevice::new());
        let mut frame = Frame::new(
            device,
            FrameConfig::default().with_descriptor_sets_per_pool(2),
        )
        .unwrap();
        let uniforms = DescriptorLayout::uniform(0);
        let textures = DescriptorLayout::new().with(0, DescriptorKind::SampledTexture);

        for _ in 0..3 {
            frame.allocate_descriptor_set(&uniforms).unwrap();
        }
        frame.allocate_descriptor_set(&textures).unwrap();

        assert_eq!(frame.descriptor_pool(&uniforms).unwrap().entries().len(), 2);
        assert_eq!(frame.descriptor_pool(&textures).unwrap().entries().len(), 1);
    }

    #[test]
    fn test_zero_frames_in_flight_is_rejected() {
        let device = Arc::new(DummyDevice::new());
        let result = FrameRing::new(device, FrameConfig::default().with_frames_in_flight(0));
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }
}
