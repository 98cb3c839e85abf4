//! Frame ring and per-frame pool behavior on the dummy device.

#![cfg(feature = "dummy")]

use std::sync::Arc;

use rstest::rstest;

use redlilium_framegraph::backend::dummy::DummyDevice;
use redlilium_framegraph::frame::{DescriptorKind, DescriptorLayout};
use redlilium_framegraph::{BufferUsage, FrameConfig, FrameDevice, FrameRing, GraphicsError};

fn ring(config: FrameConfig) -> (Arc<DummyDevice>, FrameRing<DummyDevice>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = Arc::new(DummyDevice::new());
    let ring = FrameRing::new(Arc::clone(&device), config).unwrap();
    (device, ring)
}

#[rstest]
#[case::single(1)]
#[case::double(2)]
#[case::triple(3)]
fn slots_cycle_through_every_frame(#[case] frames_in_flight: usize) {
    let (device, mut ring) = ring(FrameConfig::default().with_frames_in_flight(frames_in_flight));

    let mut slots = Vec::new();
    for _ in 0..frames_in_flight * 2 {
        ring.begin_frame().unwrap().submit(&[], &[]).unwrap();
        slots.push(ring.current_slot());
    }

    let expected: Vec<usize> = (0..frames_in_flight * 2)
        .map(|n| n % frames_in_flight)
        .collect();
    assert_eq!(slots, expected);
    assert_eq!(ring.frame_count(), (frames_in_flight * 2) as u64);
    assert_eq!(device.stats().submissions, frames_in_flight * 2);
}

#[test]
fn uniform_data_lands_aligned_in_the_frame_pool() {
    let (_device, mut ring) = ring(FrameConfig::default());
    let frame = ring.begin_frame().unwrap();

    let first = frame
        .allocate_buffer_with_data(BufferUsage::UNIFORM, &[1u8; 12])
        .unwrap();
    let second = frame
        .allocate_buffer_with_data(BufferUsage::UNIFORM, &[2u8; 8])
        .unwrap();

    assert_eq!(first.offset, 0);
    assert_eq!(second.offset, 256);
    assert_eq!(first.buffer, second.buffer);

    let pool = frame.buffer_pool(BufferUsage::UNIFORM);
    let block = pool.block_buffer(0).unwrap();
    assert_eq!(block.bytes(first.offset..first.end()), &[1u8; 12]);
    assert_eq!(block.bytes(second.offset..second.end()), &[2u8; 8]);
}

#[test]
fn vertex_pool_packs_without_alignment() {
    let (_device, mut ring) = ring(FrameConfig::default());
    let frame = ring.begin_frame().unwrap();

    let a = frame.allocate_buffer(BufferUsage::VERTEX, 12).unwrap();
    let b = frame.allocate_buffer(BufferUsage::VERTEX, 20).unwrap();
    assert_eq!(b.offset, a.end());
}

#[test]
fn full_block_spills_into_a_new_one_and_reset_rewinds() {
    let config = FrameConfig::default()
        .with_frames_in_flight(1)
        .with_uniform_block_size(512);
    let (device, mut ring) = ring(config);

    {
        let frame = ring.begin_frame().unwrap();
        for _ in 0..3 {
            frame.allocate_buffer(BufferUsage::UNIFORM, 200).unwrap();
        }
        let pool = frame.buffer_pool(BufferUsage::UNIFORM);
        assert_eq!(pool.block_count(), 2);
        assert_eq!(pool.active_block(), 1);
        frame.submit(&[], &[]).unwrap();
    }

    let frame = ring.begin_frame().unwrap();
    let allocation = frame.allocate_buffer(BufferUsage::UNIFORM, 200).unwrap();
    assert_eq!((allocation.block, allocation.offset), (0, 0));
    assert_eq!(frame.buffer_pool(BufferUsage::UNIFORM).block_count(), 2);
    assert_eq!(device.stats().buffers_created, 2);
}

#[test]
fn oversized_request_gets_a_dedicated_block() {
    let config = FrameConfig::default().with_uniform_block_size(256);
    let (_device, mut ring) = ring(config);
    let frame = ring.begin_frame().unwrap();

    let allocation = frame.allocate_buffer(BufferUsage::UNIFORM, 1000).unwrap();
    assert_eq!(allocation.offset, 0);
    assert_eq!(allocation.size, 1000);
    let pool = frame.buffer_pool(BufferUsage::UNIFORM);
    assert!(pool.block_buffer(0).unwrap().size() >= 1000);
}

#[test]
fn descriptor_sets_grow_new_pools_and_reuse_after_reset() {
    let config = FrameConfig::default()
        .with_frames_in_flight(1)
        .with_descriptor_sets_per_pool(2);
    let (device, mut ring) = ring(config);
    let layout = DescriptorLayout::new()
        .with(0, DescriptorKind::UniformBuffer)
        .with(1, DescriptorKind::SampledTexture);

    {
        let frame = ring.begin_frame().unwrap();
        for _ in 0..5 {
            frame.allocate_descriptor_set(&layout).unwrap();
        }
        assert_eq!(frame.descriptor_pool(&layout).unwrap().entries().len(), 3);
        frame.submit(&[], &[]).unwrap();
    }

    let frame = ring.begin_frame().unwrap();
    for _ in 0..4 {
        frame.allocate_descriptor_set(&layout).unwrap();
    }
    assert_eq!(frame.descriptor_pool(&layout).unwrap().entries().len(), 3);
    assert_eq!(device.stats().descriptor_pools_created, 3);
}

#[test]
fn semaphores_are_recycled_per_frame() {
    let (device, mut ring) = ring(FrameConfig::default().with_frames_in_flight(1));

    let (first, owned) = {
        let frame = ring.begin_frame().unwrap();
        let first = frame.request_semaphore().unwrap();
        let owned = frame.request_owned_semaphore().unwrap();
        frame.submit(&[], &[first]).unwrap();
        (first, owned)
    };

    let frame = ring.begin_frame().unwrap();
    assert_eq!(frame.request_semaphore().unwrap(), first);
    assert_eq!(frame.semaphore_pool().len(), 1);

    frame.release_owned_semaphore(owned);
    assert_eq!(frame.semaphore_pool().released_count(), 1);
    frame.submit(&[], &[]).unwrap();

    let frame = ring.begin_frame().unwrap();
    assert_eq!(frame.semaphore_pool().len(), 2);
    assert_eq!(device.stats().semaphores_created, 2);
}

#[test]
fn waiting_on_an_unsubmitted_slot_times_out() {
    let config = FrameConfig::default()
        .with_frames_in_flight(1)
        .with_fence_timeout_ns(1_000);
    let (device, mut ring) = ring(config);

    let fence = ring.begin_frame().unwrap().fence();
    ring.current_frame().submit(&[], &[]).unwrap();
    // A fence reset without a submission never signals.
    device.reset_fence(fence).unwrap();

    let result = ring.begin_frame().map(|_| ());
    assert!(matches!(result, Err(GraphicsError::Timeout(_))));

    device.signal_fence(fence);
    assert!(ring.begin_frame().is_ok());
}

#[test]
fn dropping_the_ring_releases_device_objects() {
    let (device, ring) = ring(FrameConfig::default().with_frames_in_flight(2));
    drop(ring);

    let stats = device.stats();
    assert_eq!(stats.fences_created, 2);
    assert_eq!(stats.fences_destroyed, 2);
}
