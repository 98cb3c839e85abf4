//! Shared fixtures for the frame graph integration tests.
//!
//! Everything runs on the dummy backend, which records commands as events
//! instead of talking to a GPU.

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Mat4, Vec3};
use redlilium_framegraph::backend::dummy::{
    CommandEvent, DummyContext, DummyDevice, DummyResourceFactory, DummyShaderCache,
};
use redlilium_framegraph::scene::MeshBinding;
use redlilium_framegraph::{
    AlphaMode, Camera, FlatScene, FrameConfig, FrameRing, Material, MeshId, PooledAllocator,
    Primitive, TextureDescriptor, TextureFormat, TextureUsage,
};

/// Device, frame ring, caches and transient allocator of one test.
pub struct Harness {
    pub device: Arc<DummyDevice>,
    pub ring: FrameRing<DummyDevice>,
    pub context: DummyContext,
    pub allocator: PooledAllocator<DummyResourceFactory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default().with_frames_in_flight(2))
    }

    pub fn with_config(config: FrameConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let device = Arc::new(DummyDevice::new());
        let ring = FrameRing::new(Arc::clone(&device), config).expect("frame ring");
        let mut context = DummyContext::new();
        context.shaders = DummyShaderCache::new()
            .with_shader("pbr")
            .with_shader("shadow");
        let allocator = PooledAllocator::new(DummyResourceFactory::new(Arc::clone(&device)));

        Self {
            device,
            ring,
            context,
            allocator,
        }
    }

    /// Make `mesh` resident with `index_count` indices.
    pub fn add_mesh(&mut self, mesh: MeshId, index_count: u32) {
        self.context.meshes.insert(
            mesh,
            MeshBinding {
                vertex_buffer: 1000 + mesh.0,
                index_buffer: 2000 + mesh.0,
                index_count,
            },
        );
    }
}

pub fn color_target() -> TextureDescriptor {
    TextureDescriptor::new_2d(
        128,
        128,
        TextureFormat::Rgba16Float,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    )
}

pub fn depth_target() -> TextureDescriptor {
    TextureDescriptor::new_2d(
        128,
        128,
        TextureFormat::Depth32Float,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    )
}

/// Camera at the origin looking down -Z.
pub fn camera() -> Camera {
    Camera::look_at(
        Vec3::ZERO,
        Vec3::new(0.0, 0.0, -1.0),
        std::f32::consts::FRAC_PI_3,
        1.0,
        0.1,
        100.0,
    )
}

/// One primitive per `(mesh, distance, alpha)` entry, placed on the -Z axis.
pub fn scene(harness: &mut Harness, entries: &[(u64, f32, AlphaMode)]) -> FlatScene {
    let mut scene = FlatScene::new();
    for &(mesh, distance, alpha_mode) in entries {
        harness.add_mesh(MeshId(mesh), 36);
        let material = Arc::new(Material::new("pbr").with_alpha_mode(alpha_mode));
        scene.push(
            Mat4::from_translation(Vec3::new(0.0, 0.0, -distance)),
            Primitive::new(MeshId(mesh)),
            material,
        );
    }
    scene
}

/// Meshes of every indexed draw, in recording order.
pub fn drawn_meshes(events: &[CommandEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| match event {
            CommandEvent::DrawIndexed { mesh, .. } => Some(mesh.0),
            _ => None,
        })
        .collect()
}

/// Attachments of every pass start, in recording order.
pub fn pass_attachments(
    events: &[CommandEvent],
) -> Vec<(String, Vec<(u64, redlilium_framegraph::LoadOp)>)> {
    events
        .iter()
        .filter_map(|event| match event {
            CommandEvent::BeginPass { name, attachments } => {
                Some((name.clone(), attachments.clone()))
            }
            _ => None,
        })
        .collect()
}
