//! # RedLilium Frame Graph Demos
//!
//! Shared setup for the demo binaries: a grid scene, a camera, and the
//! three-pass frame (shadow, geometry, blit to the backbuffer) that every
//! backend records.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use redlilium_framegraph::{
    AccessInfo, AlphaMode, Batcher, Camera, DrawCommand, FlatScene, Material, MeshId, Primitive,
    RenderGraph, ShadowSettings, TextureDescriptor, TextureFormat, TextureHandle,
    TextureUsage,
};

/// Demo version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the render callbacks of one frame borrow.
pub struct FrameInputs {
    pub batcher: Batcher,
    pub camera: Camera,
    pub shadow: ShadowSettings,
}

impl FrameInputs {
    /// Batch `scene` as seen by `camera`.
    pub fn new(scene: &FlatScene, camera: Camera) -> Self {
        let mut batcher = Batcher::new();
        batcher.build_batches(scene, &camera);
        Self {
            batcher,
            camera,
            shadow: ShadowSettings {
                resolution: 1024,
                ..Default::default()
            },
        }
    }
}

/// A `side` x `side` grid of primitives in front of the origin.
///
/// Every third primitive is alpha blended. Mesh ids are `0..side * side`.
pub fn grid_scene(side: u32) -> FlatScene {
    let opaque = Arc::new(Material::new("pbr"));
    let glass = Arc::new(Material::new("pbr").with_alpha_mode(AlphaMode::Blend));

    let mut scene = FlatScene::new();
    for index in 0..side * side {
        let x = (index % side) as f32 - side as f32 * 0.5;
        let z = -2.0 - (index / side) as f32;
        let material = if index % 3 == 2 { &glass } else { &opaque };
        scene.push(
            Mat4::from_translation(Vec3::new(x, 0.0, z)),
            Primitive::new(MeshId(u64::from(index))),
            Arc::clone(material),
        );
    }
    scene
}

/// Camera above the grid looking down -Z.
pub fn demo_camera(aspect: f32) -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 3.0, 4.0),
        Vec3::new(0.0, 0.0, -4.0),
        std::f32::consts::FRAC_PI_3,
        aspect,
        0.1,
        200.0,
    )
}

/// Backbuffer description for a `width` x `height` window.
pub fn backbuffer_descriptor(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        width,
        height,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_DST,
    )
}

/// Record the shadow, geometry and blit passes into `graph`.
///
/// The HDR target and depth buffer match the backbuffer's extent. The HDR
/// target is blitted into `backbuffer` by the last pass.
pub fn record_frame<'g, C: DrawCommand + 'g>(
    graph: &mut RenderGraph<'g, C>,
    inputs: &'g FrameInputs,
    backbuffer: TextureHandle,
    width: u32,
    height: u32,
) {
    let shadow_size = inputs.shadow.resolution;

    graph.add_pass(
        "shadow",
        |builder| {
            let map = builder.allocate_texture(
                "shadow_map",
                TextureDescriptor::new_2d(
                    shadow_size,
                    shadow_size,
                    TextureFormat::Depth32Float,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ),
            );
            builder.write(map, AccessInfo::DEPTH);
        },
        move |_, cmd: &mut C, _| cmd.draw_shadow(&inputs.batcher, &inputs.shadow),
    );

    let mut hdr = None;
    graph.add_pass(
        "geometry",
        |builder| {
            let color = builder.allocate_texture(
                "hdr",
                TextureDescriptor::new_2d(
                    width,
                    height,
                    TextureFormat::Rgba16Float,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
                ),
            );
            let depth = builder.allocate_texture(
                "depth",
                TextureDescriptor::new_2d(
                    width,
                    height,
                    TextureFormat::Depth32Float,
                    TextureUsage::RENDER_ATTACHMENT,
                ),
            );
            builder.write(color, AccessInfo::COLOR);
            builder.write(depth, AccessInfo::DEPTH);
            hdr = Some(color);
        },
        move |_, cmd: &mut C, _| cmd.draw_geometry(&inputs.batcher, &inputs.camera),
    );
    let hdr = hdr.expect("pass setup runs during add_pass");

    graph.add_pass(
        "present_blit",
        |builder| {
            builder.read(hdr, AccessInfo::Transfer);
            builder.write(backbuffer, AccessInfo::Transfer);
            (hdr, backbuffer)
        },
        |&(src, dst), cmd: &mut C, resources| {
            let (src, dst) = resources.pair_mut(src, dst);
            cmd.blit(src, dst)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_scene_blends_every_third_primitive() {
        let scene = grid_scene(3);
        let inputs = FrameInputs::new(&scene, demo_camera(1.0));
        assert_eq!(scene.len(), 9);
        assert_eq!(inputs.batcher.transparents().len(), 3);
        assert_eq!(inputs.batcher.opaques().len(), 6);
    }

    #[test]
    fn test_frame_synchronizes_only_declared_uses() {
        use redlilium_framegraph::backend::dummy::{
            CommandEvent, DummyCommand, DummyContext, DummyDevice, DummyResource,
            DummyResourceFactory,
        };
        use redlilium_framegraph::sync::TextureLayout;
        use redlilium_framegraph::{FrameConfig, FrameRing, PooledAllocator};

        let device = Arc::new(DummyDevice::new());
        let mut ring = FrameRing::new(Arc::clone(&device), FrameConfig::default()).unwrap();
        let mut context = DummyContext::new();
        let mut allocator = PooledAllocator::new(DummyResourceFactory::new(Arc::clone(&device)));
        let inputs = FrameInputs::new(&FlatScene::new(), demo_camera(1.0));
        let descriptor = backbuffer_descriptor(64, 64);
        let image = DummyResource::new(&device, &descriptor.clone().into());

        let frame = ring.begin_frame().unwrap();
        let mut cmd = DummyCommand::new(frame, &mut context);
        let mut graph = RenderGraph::new();
        let backbuffer = graph.import_texture("backbuffer", descriptor, image);
        record_frame(&mut graph, &inputs, backbuffer, 64, 64);
        graph.compile();
        graph.execute(&mut allocator, &mut cmd).unwrap();
        drop(graph);

        let layouts: Vec<TextureLayout> = cmd
            .events()
            .iter()
            .filter_map(|event| match event {
                CommandEvent::Barrier { barrier, .. } => Some(barrier.new_layout),
                _ => None,
            })
            .collect();
        assert_eq!(
            layouts,
            vec![
                TextureLayout::DepthStencilAttachment,
                TextureLayout::ColorAttachment,
                TextureLayout::DepthStencilAttachment,
                TextureLayout::TransferSrc,
                TextureLayout::TransferDst,
            ]
        );
    }
}
