//! Barrier batching for the Vulkan backend.
//!
//! Barriers planned by the graph's hooks are collected here and flushed as a
//! single `vkCmdPipelineBarrier` right before the next pass or transfer.

use std::collections::HashMap;

use ash::vk;

use super::conversion::{convert_access, convert_layout, convert_stages};
use crate::sync::Barrier;

#[derive(Debug, Clone, Copy)]
struct ImageBarrierInfo {
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access_mask: vk::AccessFlags,
    dst_access_mask: vk::AccessFlags,
    aspect_mask: vk::ImageAspectFlags,
}

/// A batch of barriers to submit together.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    /// Image barriers keyed by image handle.
    image_barriers: HashMap<vk::Image, ImageBarrierInfo>,
    /// Buffer hazards collapse into one global memory barrier.
    memory_src_access: vk::AccessFlags,
    memory_dst_access: vk::AccessFlags,
    has_memory_barrier: bool,
    src_stage_mask: vk::PipelineStageFlags,
    dst_stage_mask: vk::PipelineStageFlags,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a barrier on an image.
    ///
    /// A second barrier on the same image in one batch keeps the first
    /// `old_layout` and takes the new destination.
    pub fn add_image_barrier(
        &mut self,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        barrier: &Barrier,
    ) {
        let info = ImageBarrierInfo {
            old_layout: convert_layout(barrier.old_layout),
            new_layout: convert_layout(barrier.new_layout),
            src_access_mask: convert_access(barrier.src_access),
            dst_access_mask: convert_access(barrier.dst_access),
            aspect_mask,
        };

        self.image_barriers
            .entry(image)
            .and_modify(|existing| {
                existing.new_layout = info.new_layout;
                existing.src_access_mask |= info.src_access_mask;
                existing.dst_access_mask = info.dst_access_mask;
            })
            .or_insert(info);
        self.add_stages(barrier);
    }

    /// Add a barrier on a buffer.
    pub fn add_buffer_barrier(&mut self, barrier: &Barrier) {
        self.memory_src_access |= convert_access(barrier.src_access);
        self.memory_dst_access |= convert_access(barrier.dst_access);
        self.has_memory_barrier = true;
        self.add_stages(barrier);
    }

    fn add_stages(&mut self, barrier: &Barrier) {
        self.src_stage_mask |= convert_stages(barrier.src_stages);
        self.dst_stage_mask |= convert_stages(barrier.dst_stages);
    }

    /// Check if the batch has any barriers.
    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty() && !self.has_memory_barrier
    }

    /// Number of image barriers in the batch.
    pub fn image_barrier_count(&self) -> usize {
        self.image_barriers.len()
    }

    /// Stage masks the flush will use.
    ///
    /// Empty masks are not valid in Vulkan: an empty source waits on nothing
    /// (`TOP_OF_PIPE`), an empty destination blocks nothing (`BOTTOM_OF_PIPE`).
    pub fn stage_masks(&self) -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
        let src = if self.src_stage_mask.is_empty() {
            vk::PipelineStageFlags::TOP_OF_PIPE
        } else {
            self.src_stage_mask
        };
        let dst = if self.dst_stage_mask.is_empty() {
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        } else {
            self.dst_stage_mask
        };
        (src, dst)
    }

    /// Record all barriers as one pipeline barrier command and clear the batch.
    ///
    /// Does nothing if the batch is empty.
    pub fn flush(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) {
        if self.is_empty() {
            return;
        }

        let image_barriers: Vec<vk::ImageMemoryBarrier> = self
            .image_barriers
            .iter()
            .map(|(&image, info)| {
                vk::ImageMemoryBarrier::default()
                    .old_layout(info.old_layout)
                    .new_layout(info.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: info.aspect_mask,
                        base_mip_level: 0,
                        level_count: vk::REMAINING_MIP_LEVELS,
                        base_array_layer: 0,
                        layer_count: vk::REMAINING_ARRAY_LAYERS,
                    })
                    .src_access_mask(info.src_access_mask)
                    .dst_access_mask(info.dst_access_mask)
            })
            .collect();

        let memory_barriers: Vec<vk::MemoryBarrier> = if self.has_memory_barrier {
            vec![
                vk::MemoryBarrier::default()
                    .src_access_mask(self.memory_src_access)
                    .dst_access_mask(self.memory_dst_access),
            ]
        } else {
            Vec::new()
        };

        let (src_stage_mask, dst_stage_mask) = self.stage_masks();
        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                src_stage_mask,
                dst_stage_mask,
                vk::DependencyFlags::empty(),
                &memory_barriers,
                &[],
                &image_barriers,
            );
        }

        self.clear();
    }

    /// Clear all barriers from the batch.
    pub fn clear(&mut self) {
        self.image_barriers.clear();
        self.memory_src_access = vk::AccessFlags::empty();
        self.memory_dst_access = vk::AccessFlags::empty();
        self.has_memory_barrier = false;
        self.src_stage_mask = vk::PipelineStageFlags::empty();
        self.dst_stage_mask = vk::PipelineStageFlags::empty();
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::graph::AccessInfo;
    use crate::sync::{AccessScope, plan_transition};

    fn barrier(from: AccessScope, to: AccessScope) -> Barrier {
        plan_transition(&from, &to)
            .0
            .expect("transition should need a barrier")
    }

    #[test]
    fn test_empty_batch() {
        let batch = BarrierBatch::new();
        assert!(batch.is_empty());
        assert_eq!(
            batch.stage_masks(),
            (
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE
            )
        );
    }

    #[test]
    fn test_same_image_merges_layouts() {
        let mut batch = BarrierBatch::new();
        let image = vk::Image::from_raw(1);
        let color = AccessScope::texture_write(&AccessInfo::COLOR);

        batch.add_image_barrier(
            image,
            vk::ImageAspectFlags::COLOR,
            &barrier(AccessScope::UNDEFINED, color),
        );
        batch.add_image_barrier(
            image,
            vk::ImageAspectFlags::COLOR,
            &barrier(color, AccessScope::TRANSFER_SRC),
        );

        assert_eq!(batch.image_barrier_count(), 1);
        let info = batch.image_barriers[&image];
        assert_eq!(info.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(info.new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert!(
            batch
                .stage_masks()
                .1
                .contains(vk::PipelineStageFlags::TRANSFER)
        );
    }

    #[test]
    fn test_buffer_barriers_collapse() {
        let mut batch = BarrierBatch::new();
        let write = AccessScope::buffer_write(&AccessInfo::binding(0, 0));
        let read = AccessScope::buffer_read(&AccessInfo::binding(0, 0));
        batch.add_buffer_barrier(&barrier(write, read));
        batch.add_buffer_barrier(&barrier(write, read));

        assert!(!batch.is_empty());
        assert_eq!(batch.image_barrier_count(), 0);
        assert!(batch.memory_src_access.contains(vk::AccessFlags::SHADER_WRITE));

        batch.clear();
        assert!(batch.is_empty());
    }
}
