//! Linear block allocator for per-frame transient buffer data.

use std::sync::Arc;

use super::{FrameDevice, PoolBuffer};
use crate::error::GraphicsError;
use crate::types::BufferUsage;

/// A sub-range of a pool block.
///
/// Non-owning: the range stays valid until the owning pool is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAllocation<H> {
    /// Backing buffer.
    pub buffer: H,
    /// Index of the block within its pool.
    pub block: usize,
    /// Byte offset in the backing buffer.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
}

impl<H> BufferAllocation<H> {
    /// End of the range (exclusive).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

struct BufferBlock<B> {
    buffer: B,
    size: u64,
    offset: u64,
}

impl<B> BufferBlock<B> {
    fn try_allocate(&mut self, size: u64, alignment: u64) -> Option<u64> {
        let offset = self.offset.next_multiple_of(alignment);
        if offset.checked_add(size)? > self.size {
            return None;
        }
        self.offset = offset + size;
        Some(offset)
    }
}

/// A sequence of fixed-size blocks carved linearly.
///
/// Blocks are never split, compacted or freed individually. [`reset`](Self::reset)
/// rewinds everything at once and must only be called after the GPU finished
/// with the owning frame.
pub struct BufferPool<D: FrameDevice> {
    blocks: Vec<BufferBlock<D::Buffer>>,
    active: usize,
    block_size: u64,
    alignment: u64,
    usage: BufferUsage,
    // Dropped last so blocks are released while the device is alive.
    device: Arc<D>,
}

impl<D: FrameDevice> BufferPool<D> {
    /// Create an empty pool. Blocks are created on first use.
    ///
    /// Uniform pools align every allocation to the device's minimum uniform
    /// buffer offset alignment; other pools are unaligned.
    pub fn new(device: Arc<D>, block_size: u64, usage: BufferUsage) -> Self {
        let alignment = if usage.contains(BufferUsage::UNIFORM) {
            device.min_uniform_alignment().max(1)
        } else {
            1
        };
        Self {
            blocks: Vec::new(),
            active: 0,
            block_size,
            alignment,
            usage,
            device,
        }
    }

    /// Reserve `size` bytes.
    pub fn allocate(
        &mut self,
        size: u64,
    ) -> Result<BufferAllocation<<D::Buffer as PoolBuffer>::Handle>, GraphicsError> {
        loop {
            if let Some(block) = self.blocks.get_mut(self.active) {
                if let Some(offset) = block.try_allocate(size, self.alignment) {
                    return Ok(BufferAllocation {
                        buffer: block.buffer.handle(),
                        block: self.active,
                        offset,
                        size,
                    });
                }
                self.active += 1;
                continue;
            }

            let block_size = self.block_size.max(size);
            let buffer = self.device.create_pool_buffer(block_size, self.usage)?;
            log::debug!(
                "BufferPool({:?}): new block #{} of {} bytes",
                self.usage,
                self.blocks.len(),
                block_size
            );
            self.blocks.push(BufferBlock {
                buffer,
                size: block_size,
                offset: 0,
            });
        }
    }

    /// Reserve space for `data` and copy it in.
    pub fn allocate_with_data(
        &mut self,
        data: &[u8],
    ) -> Result<BufferAllocation<<D::Buffer as PoolBuffer>::Handle>, GraphicsError> {
        let allocation = self.allocate(data.len() as u64)?;
        self.blocks[allocation.block]
            .buffer
            .write(allocation.offset, data);
        Ok(allocation)
    }

    /// Rewind every block and the active index to zero.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.offset = 0;
        }
        self.active = 0;
    }

    /// Backing buffer of block `index`.
    pub fn block_buffer(&self, index: usize) -> Option<&D::Buffer> {
        self.blocks.get(index).map(|block| &block.buffer)
    }

    /// Number of blocks created so far.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Index of the block new allocations are carved from.
    pub fn active_block(&self) -> usize {
        self.active
    }

    /// Alignment applied to every allocation.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Usage class of the pool.
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}
