//! # Frame Demo
//!
//! Demonstrates:
//! - A shadow, geometry and blit frame recorded into a render graph
//! - Transient targets recycled through the pooled allocator
//! - Frames in flight with per-slot uniform and descriptor pools
//! - Imported backbuffers keeping their layout between frames
//!
//! Runs on the dummy backend, which records commands as events, so it works
//! on machines without a GPU.

use std::sync::Arc;

use redlilium_core::frame_mark;
use redlilium_demos::{FrameInputs, backbuffer_descriptor, demo_camera, grid_scene, record_frame};
use redlilium_framegraph::backend::dummy::{
    CommandEvent, DummyCommand, DummyContext, DummyDevice, DummyResource, DummyResourceFactory,
    DummyShaderCache,
};
use redlilium_framegraph::scene::MeshBinding;
use redlilium_framegraph::{
    FrameConfig, FrameRing, GraphicsError, MeshId, PooledAllocator, RenderGraph,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const GRID_SIDE: u32 = 8;
const FRAME_COUNT: u64 = 6;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    redlilium_core::init();
    redlilium_framegraph::init();

    if let Err(e) = run() {
        log::error!("Frame demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), GraphicsError> {
    let device = Arc::new(DummyDevice::new());
    let mut ring = FrameRing::new(Arc::clone(&device), FrameConfig::default())?;
    let mut allocator = PooledAllocator::new(DummyResourceFactory::new(Arc::clone(&device)));

    let mut context = DummyContext::new();
    context.shaders = DummyShaderCache::new()
        .with_shader("pbr")
        .with_shader("shadow");
    for index in 0..u64::from(GRID_SIDE * GRID_SIDE) {
        context.meshes.insert(
            MeshId(index),
            MeshBinding {
                vertex_buffer: 10_000 + index,
                index_buffer: 20_000 + index,
                index_count: 36,
            },
        );
    }

    let scene = grid_scene(GRID_SIDE);
    let inputs = FrameInputs::new(&scene, demo_camera(WIDTH as f32 / HEIGHT as f32));
    log::info!(
        "Scene: {} opaque, {} transparent primitives",
        inputs.batcher.opaques().len(),
        inputs.batcher.transparents().len()
    );

    // One backbuffer per frame slot, like swapchain images.
    let descriptor = backbuffer_descriptor(WIDTH, HEIGHT);
    let mut backbuffers: Vec<Option<DummyResource>> = (0..ring.frames_in_flight())
        .map(|_| Some(DummyResource::new(&device, &descriptor.clone().into())))
        .collect();

    for frame_index in 0..FRAME_COUNT {
        ring.begin_frame()?;
        let slot = ring.current_slot();
        let image = backbuffers[slot].take().ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("backbuffer {} was not returned", slot))
        })?;

        let events = {
            let mut cmd = DummyCommand::new(ring.current_frame(), &mut context);
            let mut graph = RenderGraph::new();
            let backbuffer = graph.import_texture("backbuffer", descriptor.clone(), image);
            record_frame(&mut graph, &inputs, backbuffer, WIDTH, HEIGHT);
            graph.compile();
            graph.execute(&mut allocator, &mut cmd)?;
            backbuffers[slot] = graph.take_imported(backbuffer);
            drop(graph);
            cmd.into_events()
        };
        ring.current_frame().submit(&[], &[])?;

        let draws = events
            .iter()
            .filter(|event| matches!(event, CommandEvent::DrawIndexed { .. }))
            .count();
        let barriers = events
            .iter()
            .filter(|event| matches!(event, CommandEvent::Barrier { .. }))
            .count();
        log::info!(
            "Frame {} (slot {}): {} commands, {} draws, {} barriers",
            frame_index,
            slot,
            events.len(),
            draws,
            barriers
        );
        frame_mark!();
    }

    ring.wait_idle()?;

    let stats = device.stats();
    log::info!(
        "Transients: {} created, {} pooled",
        allocator.created_count(),
        allocator.pooled_count()
    );
    log::info!(
        "Device: {} pool buffers, {} descriptor pools, {} descriptor sets, {} submissions",
        stats.buffers_created,
        stats.descriptor_pools_created,
        stats.descriptor_sets_allocated,
        stats.submissions
    );
    Ok(())
}
