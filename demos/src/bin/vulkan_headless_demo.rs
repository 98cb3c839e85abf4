//! # Vulkan Headless Demo
//!
//! Demonstrates:
//! - Creating a headless Vulkan device with optional validation
//! - Recording the demo frame against real images and barriers
//! - Transitioning the backbuffer for presentation after the graph
//!
//! No shaders are registered, so the scene is empty: the passes only clear
//! their targets and blit the HDR target into the backbuffer.

use std::sync::Arc;

use redlilium_core::frame_mark;
use redlilium_demos::{FrameInputs, backbuffer_descriptor, demo_camera, record_frame};
use redlilium_framegraph::backend::vulkan::{
    VulkanCommand, VulkanContext, VulkanDevice, VulkanDeviceParameters, VulkanResourceFactory,
};
use redlilium_framegraph::{
    FlatScene, FrameConfig, FrameRing, GraphAllocator, GraphicsError, PooledAllocator, RenderGraph,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;
const FRAME_COUNT: u64 = 4;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    redlilium_core::init();
    redlilium_framegraph::init();

    if let Err(e) = run() {
        log::error!("Vulkan headless demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), GraphicsError> {
    let device = Arc::new(VulkanDevice::new(
        VulkanDeviceParameters::default().with_app_name("RedLilium Headless Demo"),
    )?);
    log::info!("Using {}", device.name());

    let mut ring = FrameRing::new(Arc::clone(&device), FrameConfig::default())?;
    let mut context = VulkanContext::new(Arc::clone(&device));
    let mut allocator = PooledAllocator::new(VulkanResourceFactory::new(Arc::clone(&device)));

    let inputs = FrameInputs::new(&FlatScene::new(), demo_camera(WIDTH as f32 / HEIGHT as f32));

    let descriptor = backbuffer_descriptor(WIDTH, HEIGHT);
    let mut backbuffers = Vec::with_capacity(ring.frames_in_flight());
    for _ in 0..ring.frames_in_flight() {
        backbuffers.push(Some(allocator.allocate(&descriptor.clone().into())?));
    }

    for frame_index in 0..FRAME_COUNT {
        ring.begin_frame()?;
        let slot = ring.current_slot();
        let image = backbuffers[slot].take().ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("backbuffer {} was not returned", slot))
        })?;

        {
            let mut cmd = VulkanCommand::new(ring.current_frame(), &mut context);
            let mut graph = RenderGraph::new();
            let backbuffer = graph.import_texture("backbuffer", descriptor.clone(), image);
            record_frame(&mut graph, &inputs, backbuffer, WIDTH, HEIGHT);
            graph.compile();
            graph.execute(&mut allocator, &mut cmd)?;
            let mut image = graph.take_imported(backbuffer).ok_or_else(|| {
                GraphicsError::InvalidParameter("backbuffer was not imported".to_string())
            })?;
            drop(graph);

            cmd.prepare_present(&mut image);
            backbuffers[slot] = Some(image);
        }
        ring.current_frame().submit(&[], &[])?;

        log::info!("Submitted frame {} (slot {})", frame_index, slot);
        frame_mark!();
    }

    ring.wait_idle()?;
    log::info!(
        "Transients: {} created, {} pooled",
        allocator.created_count(),
        allocator.pooled_count()
    );
    Ok(())
}
