//! End-to-end graph execution on the dummy backend.
//!
//! These tests drive whole frames: a frame ring slot is begun, a graph is
//! recorded, compiled and executed through [`DummyCommand`], and the recorded
//! command events are checked.

#![cfg(feature = "dummy")]

mod common;

use rstest::rstest;

use common::{Harness, camera, color_target, depth_target, drawn_meshes, pass_attachments, scene};
use redlilium_framegraph::backend::dummy::{CommandEvent, DummyCommand, DummyResource};
use redlilium_framegraph::cache::BlendMode;
use redlilium_framegraph::sync::TextureLayout;
use redlilium_framegraph::{
    AccessInfo, AccessScope, AlphaMode, Batcher, DrawCommand, GraphicsError, LoadOp, RenderGraph,
    ResourceDescriptor, SamplerKind, ShadowSettings, TrackedResource,
};

// ============================================================================
// Geometry and shadow draws
// ============================================================================

#[test]
fn geometry_pass_draws_opaques_front_to_back_then_transparents_back_to_front() {
    let mut harness = Harness::new();
    let scene = scene(
        &mut harness,
        &[
            (1, 10.0, AlphaMode::Opaque),
            (2, 3.0, AlphaMode::Blend),
            (3, 5.0, AlphaMode::Mask),
            (4, 8.0, AlphaMode::Blend),
        ],
    );
    let camera = camera();
    let mut batcher = Batcher::new();
    batcher.build_batches(&scene, &camera);

    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();
    graph.add_pass(
        "geometry",
        |builder| {
            let color = builder.allocate_texture("color", color_target());
            let depth = builder.allocate_texture("depth", depth_target());
            builder.write(color, AccessInfo::COLOR);
            builder.write(depth, AccessInfo::DEPTH);
        },
        |_, cmd: &mut DummyCommand<'_>, _| cmd.draw_geometry(&batcher, &camera),
    );
    graph.compile();
    graph.execute(&mut harness.allocator, &mut cmd).unwrap();

    let events = cmd.into_events();
    assert_eq!(drawn_meshes(&events), vec![3, 1, 4, 2]);

    let blends: Vec<BlendMode> = events
        .iter()
        .filter_map(|event| match event {
            CommandEvent::BindPipeline { blend, .. } => Some(*blend),
            _ => None,
        })
        .collect();
    assert_eq!(
        blends,
        vec![
            BlendMode::Opaque,
            BlendMode::Opaque,
            BlendMode::Alpha,
            BlendMode::Alpha
        ]
    );

    // Camera and object uniforms per draw.
    let uniforms = events
        .iter()
        .filter(|event| matches!(event, CommandEvent::BindUniform { .. }))
        .count();
    assert_eq!(uniforms, 8);
    assert_eq!(events.last(), Some(&CommandEvent::EndPass));
}

#[test]
fn shadow_pass_draws_only_opaques_with_light_uniforms() {
    let mut harness = Harness::new();
    let scene = scene(
        &mut harness,
        &[(1, 4.0, AlphaMode::Opaque), (2, 2.0, AlphaMode::Blend)],
    );
    let camera = camera();
    let mut batcher = Batcher::new();
    batcher.build_batches(&scene, &camera);
    let settings = ShadowSettings::default();

    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();
    graph.add_pass(
        "shadow",
        |builder| {
            let map = builder.allocate_texture("shadow_map", depth_target());
            builder.write(map, AccessInfo::DEPTH);
        },
        |_, cmd: &mut DummyCommand<'_>, _| cmd.draw_shadow(&batcher, &settings),
    );
    graph.compile();
    graph.execute(&mut harness.allocator, &mut cmd).unwrap();

    let events = cmd.into_events();
    assert_eq!(drawn_meshes(&events), vec![1]);
    assert!(events.iter().any(|event| matches!(
        event,
        CommandEvent::BindUniform {
            set: 0,
            binding: 0,
            ..
        }
    )));
}

#[test]
fn geometry_without_color_attachment_is_an_error() {
    let mut harness = Harness::new();
    let scene = scene(&mut harness, &[(1, 4.0, AlphaMode::Opaque)]);
    let camera = camera();
    let mut batcher = Batcher::new();
    batcher.build_batches(&scene, &camera);

    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();
    graph.add_pass(
        "depth_only",
        |builder| {
            let depth = builder.allocate_texture("depth", depth_target());
            builder.write(depth, AccessInfo::DEPTH);
        },
        |_, cmd: &mut DummyCommand<'_>, _| cmd.draw_geometry(&batcher, &camera),
    );
    graph.compile();

    let result = graph.execute(&mut harness.allocator, &mut cmd);
    assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
}

#[test]
fn missing_shader_aborts_execution() {
    let mut harness = Harness::new();
    let mut scene = scene(&mut harness, &[]);
    harness.add_mesh(redlilium_framegraph::MeshId(9), 6);
    scene.push(
        glam::Mat4::IDENTITY,
        redlilium_framegraph::Primitive::new(redlilium_framegraph::MeshId(9)),
        std::sync::Arc::new(redlilium_framegraph::Material::new("unknown")),
    );
    let camera = camera();
    let mut batcher = Batcher::new();
    batcher.build_batches(&scene, &camera);

    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();
    graph.add_pass(
        "geometry",
        |builder| {
            let color = builder.allocate_texture("color", color_target());
            builder.write(color, AccessInfo::COLOR);
        },
        |_, cmd: &mut DummyCommand<'_>, _| cmd.draw_geometry(&batcher, &camera),
    );
    graph.compile();

    let result = graph.execute(&mut harness.allocator, &mut cmd);
    assert!(matches!(result, Err(GraphicsError::MissingCollaborator(_))));
    assert!(drawn_meshes(cmd.events()).is_empty());
    // The aborted pass's target is back in the pool.
    assert_eq!(harness.allocator.created_count(), 1);
    assert_eq!(harness.allocator.pooled_count(), 1);
}

// ============================================================================
// Lifetimes and load operations
// ============================================================================

#[test]
fn first_write_clears_and_later_writes_load() {
    let mut harness = Harness::new();
    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();

    let mut color = None;
    graph.add_pass(
        "first",
        |builder| {
            let handle = builder.allocate_texture("color", color_target());
            color = Some(builder.write(handle, AccessInfo::COLOR));
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    let color = color.unwrap();
    graph.add_pass(
        "second",
        |builder| {
            builder.write(color, AccessInfo::COLOR);
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    graph.compile();
    graph.execute(&mut harness.allocator, &mut cmd).unwrap();

    let passes = pass_attachments(cmd.events());
    assert_eq!(passes.len(), 2);
    assert_eq!(passes[0].1[0].1, LoadOp::Clear);
    assert_eq!(passes[1].1[0].1, LoadOp::Load);
    assert_eq!(passes[0].1[0].0, passes[1].1[0].0);
}

#[test]
fn transient_is_reused_after_its_last_accessor() {
    let mut harness = Harness::new();
    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();

    let mut first = None;
    graph.add_pass(
        "produce",
        |builder| {
            let handle = builder.allocate_texture("first", color_target());
            first = Some(builder.write(handle, AccessInfo::COLOR));
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    let first = first.unwrap();
    graph.add_pass(
        "consume",
        |builder| {
            builder.read(first, AccessInfo::sampled(0, 0, SamplerKind::Linear));
            let out = builder.allocate_texture("out", depth_target());
            builder.write(out, AccessInfo::DEPTH);
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    graph.add_pass(
        "reuse",
        |builder| {
            let handle = builder.allocate_texture("second", color_target());
            builder.write(handle, AccessInfo::COLOR);
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    graph.compile();
    graph.execute(&mut harness.allocator, &mut cmd).unwrap();

    let passes = pass_attachments(cmd.events());
    let first_id = passes[0].1[0].0;
    let reused_id = passes[2].1[0].0;
    assert_eq!(first_id, reused_id);
    assert_eq!(passes[2].1[0].1, LoadOp::Clear);

    // Two distinct descriptors were ever created; both are back in the pool.
    assert_eq!(harness.allocator.created_count(), 2);
    assert_eq!(harness.allocator.pooled_count(), 2);
    assert_eq!(
        harness
            .allocator
            .pooled_for(&ResourceDescriptor::Texture(color_target())),
        1
    );
}

#[rstest]
#[case::one_graph(1)]
#[case::three_graphs(3)]
fn pooled_objects_survive_across_graphs(#[case] graphs: usize) {
    let mut harness = Harness::new();

    for _ in 0..graphs {
        {
            let frame = harness.ring.begin_frame().unwrap();
            let mut cmd = DummyCommand::new(frame, &mut harness.context);
            let mut graph = RenderGraph::new();
            graph.add_pass(
                "draw",
                |builder| {
                    let color = builder.allocate_texture("color", color_target());
                    builder.write(color, AccessInfo::COLOR);
                },
                |_, _: &mut DummyCommand<'_>, _| Ok(()),
            );
            graph.compile();
            graph.execute(&mut harness.allocator, &mut cmd).unwrap();
        }
        harness.ring.current_frame().submit(&[], &[]).unwrap();
    }

    assert_eq!(harness.allocator.created_count(), 1);
    assert_eq!(harness.allocator.pooled_count(), 1);
}

// ============================================================================
// Imported resources and synchronization
// ============================================================================

#[test]
fn imported_texture_keeps_its_scope_between_graphs() {
    let mut harness = Harness::new();
    let mut backbuffer = DummyResource::new(
        &harness.device,
        &ResourceDescriptor::Texture(color_target()),
    );
    let backbuffer_id = backbuffer.id();

    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);

    let mut graph = RenderGraph::new();
    let target = graph.import_texture("backbuffer", color_target(), backbuffer);
    graph.add_pass(
        "write",
        |builder| {
            builder.write(target, AccessInfo::COLOR);
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    graph.compile();
    graph.execute(&mut harness.allocator, &mut cmd).unwrap();
    backbuffer = graph.take_imported(target).unwrap();
    drop(graph);

    assert_eq!(
        backbuffer.access_scope(),
        AccessScope::texture_write(&AccessInfo::COLOR)
    );
    // Imported attachments are never cleared.
    assert_eq!(pass_attachments(cmd.events())[0].1, vec![(backbuffer_id, LoadOp::Load)]);

    let mut graph = RenderGraph::new();
    let source = graph.import_texture("backbuffer", color_target(), backbuffer);
    graph.add_pass(
        "sample",
        |builder| {
            builder.read(source, AccessInfo::sampled(0, 0, SamplerKind::Linear));
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    graph.compile();
    graph.execute(&mut harness.allocator, &mut cmd).unwrap();

    let barriers: Vec<_> = cmd
        .events()
        .iter()
        .filter_map(|event| match event {
            CommandEvent::Barrier { resource, barrier } if *resource == backbuffer_id => {
                Some(*barrier)
            }
            _ => None,
        })
        .collect();
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[0].old_layout, TextureLayout::Undefined);
    assert_eq!(barriers[1].old_layout, TextureLayout::ColorAttachment);
    assert_eq!(barriers[1].new_layout, TextureLayout::ShaderReadOnly);
}

#[test]
fn repeated_sampled_reads_need_one_barrier() {
    let mut harness = Harness::new();
    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();

    let mut color = None;
    graph.add_pass(
        "produce",
        |builder| {
            let handle = builder.allocate_texture("color", color_target());
            color = Some(builder.write(handle, AccessInfo::COLOR));
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    let color = color.unwrap();
    for name in ["read_a", "read_b", "read_c"] {
        graph.add_pass(
            name,
            |builder| {
                builder.read(color, AccessInfo::sampled(0, 0, SamplerKind::Linear));
            },
            |_, _: &mut DummyCommand<'_>, _| Ok(()),
        );
    }
    graph.compile();
    graph.execute(&mut harness.allocator, &mut cmd).unwrap();

    let barriers = cmd
        .events()
        .iter()
        .filter(|event| matches!(event, CommandEvent::Barrier { .. }))
        .count();
    // Undefined -> color attachment, then color attachment -> shader read.
    assert_eq!(barriers, 2);
}

/// A render pass filling `src`, then a pass blitting it into `dst` with the
/// given declarations.
fn record_blit<'g, 'a: 'g>(
    graph: &mut RenderGraph<'g, DummyCommand<'a>>,
    src_access: AccessInfo,
    dst_access: AccessInfo,
) {
    let mut handles = None;
    graph.add_pass(
        "render",
        |builder| {
            let src = builder.allocate_texture("src", color_target());
            let dst = builder.allocate_texture("dst", color_target());
            builder.write(src, AccessInfo::COLOR);
            handles = Some((src, dst));
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    let (src, dst) = handles.unwrap();
    graph.add_pass(
        "blit",
        |builder| {
            builder.read(src, src_access);
            builder.write(dst, dst_access);
            (src, dst)
        },
        |&(src, dst), cmd: &mut DummyCommand<'_>, resources| {
            let (src, dst) = resources.pair_mut(src, dst);
            cmd.blit(src, dst)
        },
    );
}

#[test]
fn blit_needs_one_barrier_per_declared_access() {
    let mut harness = Harness::new();
    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();
    record_blit(&mut graph, AccessInfo::Transfer, AccessInfo::Transfer);
    graph.compile();
    graph.execute(&mut harness.allocator, &mut cmd).unwrap();

    let events = cmd.into_events();
    let begin = events
        .iter()
        .position(|event| matches!(event, CommandEvent::BeginPass { name, .. } if name == "blit"))
        .expect("blit pass started");
    let render_end = events[..begin]
        .iter()
        .rposition(|event| *event == CommandEvent::EndPass)
        .expect("render pass ended");
    let blit = events
        .iter()
        .position(|event| matches!(event, CommandEvent::Blit { .. }))
        .expect("blit recorded");
    let &CommandEvent::Blit {
        src: src_id,
        dst: dst_id,
    } = &events[blit]
    else {
        unreachable!()
    };

    let hooked: Vec<(u64, TextureLayout, TextureLayout)> = events[render_end + 1..begin]
        .iter()
        .filter_map(|event| match event {
            CommandEvent::Barrier { resource, barrier } => {
                Some((*resource, barrier.old_layout, barrier.new_layout))
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        hooked,
        vec![
            (src_id, TextureLayout::ColorAttachment, TextureLayout::TransferSrc),
            (dst_id, TextureLayout::Undefined, TextureLayout::TransferDst),
        ]
    );
    // The blit itself records no synchronization.
    assert!(
        !events[begin..blit]
            .iter()
            .any(|event| matches!(event, CommandEvent::Barrier { .. }))
    );
}

#[test]
#[should_panic(expected = "must be read with AccessInfo::Transfer")]
fn blit_of_shader_bound_source_panics() {
    let mut harness = Harness::new();
    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();
    record_blit(&mut graph, AccessInfo::binding(0, 0), AccessInfo::Transfer);
    graph.compile();
    let _ = graph.execute(&mut harness.allocator, &mut cmd);
}

// ============================================================================
// Misuse
// ============================================================================

#[test]
#[should_panic(expected = "without declaring it")]
fn undeclared_access_panics() {
    let mut harness = Harness::new();
    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph = RenderGraph::new();

    let mut color = None;
    graph.add_pass(
        "produce",
        |builder| {
            let handle = builder.allocate_texture("color", color_target());
            color = Some(builder.write(handle, AccessInfo::COLOR));
        },
        |_, _: &mut DummyCommand<'_>, _| Ok(()),
    );
    let color = color.unwrap();
    graph.add_pass(
        "sneaky",
        |_| color,
        |&color, _: &mut DummyCommand<'_>, resources| {
            let _ = resources.get(color);
            Ok(())
        },
    );
    graph.compile();
    let _ = graph.execute(&mut harness.allocator, &mut cmd);
}

#[test]
#[should_panic(expected = "must be compiled")]
fn execute_without_compile_panics() {
    let mut harness = Harness::new();
    let frame = harness.ring.begin_frame().unwrap();
    let mut cmd = DummyCommand::new(frame, &mut harness.context);
    let mut graph: RenderGraph<'_, DummyCommand<'_>> = RenderGraph::new();
    let _ = graph.execute(&mut harness.allocator, &mut cmd);
}
