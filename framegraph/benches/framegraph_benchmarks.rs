use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::{Mat4, Vec3};

use redlilium_framegraph::backend::dummy::{
    DummyCommand, DummyContext, DummyDevice, DummyResourceFactory,
};
use redlilium_framegraph::sync::plan_transition;
use redlilium_framegraph::{
    AccessInfo, AccessScope, AlphaMode, Batcher, BufferUsage, Camera, FlatScene, FrameConfig,
    FrameRing, Material, MeshId, PooledAllocator, Primitive, RenderGraph, SamplerKind,
    TextureDescriptor, TextureFormat, TextureUsage,
};

fn grid_scene(count: usize) -> FlatScene {
    let opaque = Arc::new(Material::new("pbr"));
    let blended = Arc::new(Material::new("pbr").with_alpha_mode(AlphaMode::Blend));
    let mut scene = FlatScene::new();
    for i in 0..count {
        let position = Vec3::new((i % 32) as f32, 0.0, -((i / 32) as f32));
        let material = if i % 4 == 0 { &blended } else { &opaque };
        scene.push(
            Mat4::from_translation(position),
            Primitive::new(MeshId(i as u64)),
            Arc::clone(material),
        );
    }
    scene
}

fn camera() -> Camera {
    Camera::look_at(
        Vec3::new(16.0, 10.0, 10.0),
        Vec3::new(16.0, 0.0, -16.0),
        std::f32::consts::FRAC_PI_3,
        16.0 / 9.0,
        0.1,
        500.0,
    )
}

fn target(format: TextureFormat) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        1920,
        1080,
        format,
        TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
    )
}

// ---------------------------------------------------------------------------
// Batching
// ---------------------------------------------------------------------------

fn bench_build_batches(c: &mut Criterion) {
    let scene = grid_scene(4096);
    let camera = camera();
    let mut batcher = Batcher::new();

    c.bench_function("build_batches_4096", |b| {
        b.iter(|| {
            batcher.reset();
            batcher.build_batches(black_box(&scene), &camera);
            black_box(batcher.len())
        });
    });
}

// ---------------------------------------------------------------------------
// Graph compile and execute
// ---------------------------------------------------------------------------

fn bench_post_chain(c: &mut Criterion) {
    let device = Arc::new(DummyDevice::new());
    let mut ring = FrameRing::new(Arc::clone(&device), FrameConfig::default()).unwrap();
    let mut context = DummyContext::new();
    let mut allocator = PooledAllocator::new(DummyResourceFactory::new(Arc::clone(&device)));

    c.bench_function("graph_post_chain_16_passes", |b| {
        b.iter(|| {
            let frame = ring.begin_frame().unwrap();
            {
                let mut cmd = DummyCommand::new(frame, &mut context);
                let mut graph = RenderGraph::new();

                let mut previous = None;
                for index in 0..16 {
                    let mut output = None;
                    graph.add_pass(
                        "post",
                        |builder| {
                            if let Some(input) = previous {
                                builder.read(input, AccessInfo::sampled(0, 0, SamplerKind::Linear));
                            }
                            let format = if index % 2 == 0 {
                                TextureFormat::Rgba16Float
                            } else {
                                TextureFormat::Rgba8Unorm
                            };
                            let handle = builder.allocate_texture("post", target(format));
                            output = Some(builder.write(handle, AccessInfo::COLOR));
                        },
                        |_, _: &mut DummyCommand<'_>, _| Ok(()),
                    );
                    previous = output;
                }

                graph.compile();
                graph.execute(&mut allocator, &mut cmd).unwrap();
                black_box(cmd.events().len());
            }
            frame.submit(&[], &[]).unwrap();
        });
    });
}

// ---------------------------------------------------------------------------
// Frame pools and synchronization
// ---------------------------------------------------------------------------

fn bench_uniform_allocations(c: &mut Criterion) {
    let device = Arc::new(DummyDevice::new());
    let mut ring = FrameRing::new(Arc::clone(&device), FrameConfig::default()).unwrap();
    let data = [0u8; 128];

    c.bench_function("uniform_allocate_1024", |b| {
        b.iter(|| {
            let frame = ring.begin_frame().unwrap();
            for _ in 0..1024 {
                black_box(
                    frame
                        .allocate_buffer_with_data(BufferUsage::UNIFORM, &data)
                        .unwrap(),
                );
            }
            frame.submit(&[], &[]).unwrap();
        });
    });
}

fn bench_plan_transition(c: &mut Criterion) {
    let write = AccessScope::texture_write(&AccessInfo::COLOR);
    let read = AccessScope::texture_read(&AccessInfo::sampled(0, 0, SamplerKind::Linear));

    c.bench_function("plan_transition_write_read", |b| {
        b.iter(|| plan_transition(black_box(&write), black_box(&read)));
    });
}

criterion_group!(
    benches,
    bench_build_batches,
    bench_post_chain,
    bench_uniform_allocations,
    bench_plan_transition,
);
criterion_main!(benches);
