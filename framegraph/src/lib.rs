//! # RedLilium Frame Graph
//!
//! Render-graph execution and frame-scoped GPU allocation.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderGraph`] - Passes declared in order against a resource table,
//!   compiled to per-resource free points and executed with minimal
//!   synchronization
//! - [`PooledAllocator`] - Descriptor-keyed reuse of transient GPU objects
//! - [`GraphCommand`] / [`DrawCommand`] - The protocol a backend implements
//! - [`FrameRing`] - Frames in flight with buffer, descriptor and semaphore pools
//! - [`Batcher`] - Distance-sorted opaque and transparent draw lists
//! - Backends: Vulkan and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_framegraph::{AccessInfo, RenderGraph};
//!
//! let mut graph = RenderGraph::new();
//! let backbuffer = graph.import_texture("backbuffer", desc, swap_image);
//! graph.add_pass(
//!     "geometry",
//!     |builder| builder.write(backbuffer, AccessInfo::COLOR),
//!     |_, cmd, _| cmd.draw_geometry(&batcher, &camera),
//! );
//! graph.compile();
//! graph.execute(&mut allocator, &mut cmd)?;
//! ```

pub mod allocator;
pub mod backend;
pub mod batcher;
pub mod cache;
pub mod command;
pub mod error;
pub mod frame;
pub mod graph;
pub mod scene;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use allocator::{GraphAllocator, PooledAllocator, ResourceFactory};
pub use batcher::{Batcher, DrawItem};
pub use command::{DrawCommand, GraphCommand, LoadOp, PassAttachment, ShadowSettings};
pub use error::GraphicsError;
pub use frame::{Frame, FrameConfig, FrameDevice, FrameRing};
pub use graph::{
    AccessInfo, AttachmentAspect, BufferHandle, GraphBuilder, GraphPhase, PassHandle,
    PassResources, RenderGraph, RenderPass, SamplerKind, TextureHandle,
};
pub use scene::{AlphaMode, Camera, DrawableScene, FlatScene, Material, MeshId, Primitive};
pub use sync::{AccessScope, Barrier, TrackedResource};
pub use types::{
    BufferDescriptor, BufferUsage, Extent3d, ResourceDescriptor, TextureDescriptor,
    TextureFormat, TextureUsage,
};

/// Frame graph library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version. Binaries call this once after installing a logger.
pub fn init() {
    log::info!("RedLilium Frame Graph v{} initialized", VERSION);
}
