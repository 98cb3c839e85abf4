//! Per-layout descriptor set allocation.

use std::sync::Arc;

use super::FrameDevice;
use crate::error::GraphicsError;

/// Type of a descriptor binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Uniform buffer.
    UniformBuffer,
    /// Storage buffer.
    StorageBuffer,
    /// Combined image sampler.
    SampledTexture,
    /// Storage image.
    StorageTexture,
}

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    /// Binding location.
    pub binding: u32,
    /// Descriptor type.
    pub kind: DescriptorKind,
}

/// Descriptor set layout key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DescriptorLayout {
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorLayout {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Layout with a single uniform buffer at `binding`.
    pub fn uniform(binding: u32) -> Self {
        Self::new().with(binding, DescriptorKind::UniformBuffer)
    }

    /// Add a binding.
    pub fn with(mut self, binding: u32, kind: DescriptorKind) -> Self {
        self.bindings.push(DescriptorBinding { binding, kind });
        self
    }

    /// Bindings in declaration order.
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Number of bindings of `kind`.
    pub fn count_of(&self, kind: DescriptorKind) -> u32 {
        self.bindings.iter().filter(|b| b.kind == kind).count() as u32
    }
}

/// A native descriptor pool with a fixed set capacity.
pub struct DescriptorPoolEntry<P> {
    pool: P,
    allocated: u32,
    capacity: u32,
}

impl<P> DescriptorPoolEntry<P> {
    /// Returns true if another set fits.
    pub fn can_allocate(&self) -> bool {
        self.allocated < self.capacity
    }

    /// Sets allocated since the last reset.
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Maximum number of sets.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

/// Descriptor sets of one layout, carved from a growing list of native pools.
pub struct DescriptorPool<D: FrameDevice> {
    layout: DescriptorLayout,
    entries: Vec<DescriptorPoolEntry<D::DescriptorPool>>,
    active: usize,
    sets_per_pool: u32,
    device: Arc<D>,
}

impl<D: FrameDevice> DescriptorPool<D> {
    /// Create an empty pool for `layout`.
    pub fn new(device: Arc<D>, layout: DescriptorLayout, sets_per_pool: u32) -> Self {
        assert!(sets_per_pool > 0, "descriptor pool capacity must be non-zero");
        Self {
            layout,
            entries: Vec::new(),
            active: 0,
            sets_per_pool,
            device,
        }
    }

    /// Allocate a set, moving on to the next entry once the active one is full.
    pub fn allocate(&mut self) -> Result<D::DescriptorSet, GraphicsError> {
        while self
            .entries
            .get(self.active)
            .is_some_and(|entry| !entry.can_allocate())
        {
            self.active += 1;
        }

        if self.active == self.entries.len() {
            let pool = self
                .device
                .create_descriptor_pool(&self.layout, self.sets_per_pool)?;
            log::debug!(
                "DescriptorPool: new entry #{} ({} sets) for {:?}",
                self.entries.len(),
                self.sets_per_pool,
                self.layout
            );
            self.entries.push(DescriptorPoolEntry {
                pool,
                allocated: 0,
                capacity: self.sets_per_pool,
            });
        }

        let entry = &mut self.entries[self.active];
        let set = self
            .device
            .allocate_descriptor_set(&mut entry.pool, &self.layout)?;
        entry.allocated += 1;
        Ok(set)
    }

    /// Reset every native pool and count.
    pub fn reset(&mut self) -> Result<(), GraphicsError> {
        for entry in &mut self.entries {
            self.device.reset_descriptor_pool(&mut entry.pool)?;
            entry.allocated = 0;
        }
        self.active = 0;
        Ok(())
    }

    /// Layout the pool allocates.
    pub fn layout(&self) -> &DescriptorLayout {
        &self.layout
    }

    /// All entries created so far.
    pub fn entries(&self) -> &[DescriptorPoolEntry<D::DescriptorPool>] {
        &self.entries
    }

    /// Index of the entry new sets come from.
    pub fn active_entry(&self) -> usize {
        self.active
    }
}
