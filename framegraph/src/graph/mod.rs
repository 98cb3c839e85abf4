//! Render graph: resource table, pass records, compile and execute.
//!
//! A [`RenderGraph`] is rebuilt every frame. Passes are added in order, each
//! declaring through a [`GraphBuilder`] which resources it allocates, reads
//! and writes. [`compile`](RenderGraph::compile) records the last record
//! touching every resource; [`execute`](RenderGraph::execute) then walks the
//! records in declaration order:
//!
//! ```text
//! for record in records:
//!     allocate record.allocates          (GraphAllocator)
//!     before_read_*  for record.reads    (GraphCommand)
//!     before_write_* for record.writes
//!     begin_pass -> render -> end_pass
//!     free transients whose last record is this one
//! ```
//!
//! Passes are never reordered, even though their read/write sets are known.

mod access;
mod builder;
mod pass;
mod resource;

pub use access::{AccessInfo, AttachmentAspect, SamplerKind};
pub use builder::{GraphBuilder, PassAccesses};
pub use pass::{PassHandle, PassResources, RenderPass};
pub use resource::{
    BufferHandle, BufferKind, GraphResource, HandleKind, RawHandle, ResourceHandle,
    ResourceOrigin, TextureHandle, TextureKind,
};

use std::sync::atomic::{AtomicU32, Ordering};

use redlilium_core::profile_scope;

use crate::allocator::GraphAllocator;
use crate::command::{GraphCommand, LoadOp, PassAttachment};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, ResourceDescriptor, TextureDescriptor};
use pass::{CallbackPass, PassRecord};

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// Lifecycle phase of a [`RenderGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphPhase {
    /// Passes and imports are being added.
    Recording,
    /// Last records are resolved; ready to execute.
    Compiled,
    /// Executed once; the graph can only be inspected or drained.
    Executed,
}

/// A frame's worth of passes over a table of resources.
///
/// All passes share the command type `C`; each pass carries its own data.
pub struct RenderGraph<'g, C: GraphCommand> {
    id: u32,
    resources: Vec<GraphResource<C::Resource>>,
    records: Vec<PassRecord<'g, C>>,
    phase: GraphPhase,
}

impl<'g, C: GraphCommand> Default for RenderGraph<'g, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'g, C: GraphCommand> RenderGraph<'g, C> {
    /// Create an empty graph with a fresh id.
    pub fn new() -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            resources: Vec::new(),
            records: Vec::new(),
            phase: GraphPhase::Recording,
        }
    }

    /// Register an externally owned texture.
    pub fn import_texture(
        &mut self,
        name: &str,
        descriptor: TextureDescriptor,
        texture: C::Resource,
    ) -> TextureHandle {
        let index = self.push_imported(name, descriptor.into(), texture);
        TextureHandle::new(self.id, index)
    }

    /// Register an externally owned buffer.
    pub fn import_buffer(
        &mut self,
        name: &str,
        descriptor: BufferDescriptor,
        buffer: C::Resource,
    ) -> BufferHandle {
        let index = self.push_imported(name, descriptor.into(), buffer);
        BufferHandle::new(self.id, index)
    }

    fn push_imported(
        &mut self,
        name: &str,
        descriptor: ResourceDescriptor,
        object: C::Resource,
    ) -> u32 {
        self.assert_recording("import");
        let index =
            u32::try_from(self.resources.len()).expect("resource table exceeds u32::MAX entries");
        self.resources
            .push(GraphResource::imported(name, descriptor, object));
        index
    }

    /// Add a pass from a setup callback and a render callback.
    ///
    /// `setup` runs immediately with a builder and returns the pass data,
    /// typically the handles it declared. `render` receives that data during
    /// [`execute`](Self::execute).
    pub fn add_pass<D, S, F>(&mut self, name: &str, setup: S, render: F) -> PassHandle
    where
        D: 'g,
        S: FnOnce(&mut GraphBuilder<'_, C::Resource>) -> D,
        F: FnMut(&D, &mut C, &mut PassResources<'_, C::Resource>) -> Result<(), GraphicsError>
            + 'g,
    {
        self.add_render_pass(name, |builder| {
            CallbackPass::new(setup(builder), render)
        })
    }

    /// Add a pass implemented as a [`RenderPass`] value built by `setup`.
    pub fn add_render_pass<P, S>(&mut self, name: &str, setup: S) -> PassHandle
    where
        P: RenderPass<C> + 'g,
        S: FnOnce(&mut GraphBuilder<'_, C::Resource>) -> P,
    {
        self.assert_recording("add a pass");

        let mut accesses = PassAccesses::default();
        let pass = {
            let mut builder = GraphBuilder::new(self.id, &mut self.resources, &mut accesses);
            setup(&mut builder)
        };

        let handle = PassHandle::new(
            u32::try_from(self.records.len()).expect("pass list exceeds u32::MAX entries"),
        );
        log::trace!(
            "Recorded pass '{}': {} allocates, {} writes, {} reads",
            name,
            accesses.allocates.len(),
            accesses.writes.len(),
            accesses.reads.len()
        );
        self.records.push(PassRecord {
            name: name.to_string(),
            pass: Box::new(pass),
            accesses,
        });
        handle
    }

    /// Resolve every resource's last accessing record.
    ///
    /// Records are walked in order and each touch overwrites the previous
    /// value, so the final accessor wins.
    pub fn compile(&mut self) {
        profile_scope!("graph_compile");
        self.assert_recording("compile");

        for (index, record) in self.records.iter().enumerate() {
            for handle in record.accesses.touched() {
                self.resources[handle.index()].last_record = Some(index);
            }
        }

        self.phase = GraphPhase::Compiled;
        log::debug!(
            "Compiled graph #{}: {} passes, {} resources",
            self.id,
            self.records.len(),
            self.resources.len()
        );
    }

    /// Run every pass in declaration order.
    ///
    /// Errors from the allocator, the command backend or a render callback
    /// abort execution and are returned as-is. Transients that are live at
    /// that point go back to the allocator.
    pub fn execute<A>(&mut self, allocator: &mut A, cmd: &mut C) -> Result<(), GraphicsError>
    where
        A: GraphAllocator<Resource = C::Resource>,
    {
        profile_scope!("graph_execute");
        assert_eq!(
            self.phase,
            GraphPhase::Compiled,
            "graph must be compiled exactly once before execution"
        );
        self.phase = GraphPhase::Executed;

        let result = self.execute_records(allocator, cmd);
        if let Err(error) = &result {
            log::warn!("Graph #{} aborted: {}", self.id, error);
            for resource in &mut self.resources {
                if resource.origin == ResourceOrigin::Transient
                    && let Some(object) = resource.object.take()
                {
                    allocator.free(object, &resource.descriptor);
                }
            }
        }
        result
    }

    fn execute_records<A>(&mut self, allocator: &mut A, cmd: &mut C) -> Result<(), GraphicsError>
    where
        A: GraphAllocator<Resource = C::Resource>,
    {
        let graph_id = self.id;
        let resources = &mut self.resources;

        for (index, record) in self.records.iter_mut().enumerate() {
            log::trace!("Executing pass #{} '{}'", index, record.name);
            let accesses = &record.accesses;

            for handle in &accesses.allocates {
                let resource = &mut resources[handle.index()];
                assert!(
                    resource.object.is_none(),
                    "transient '{}' allocated twice",
                    resource.name
                );
                log::trace!("Allocating '{}'", resource.name);
                resource.object = Some(allocator.allocate(&resource.descriptor)?);
            }

            for (handle, access) in &accesses.reads {
                let resource = &mut resources[handle.index()];
                let object = resource
                    .object
                    .as_mut()
                    .unwrap_or_else(|| panic!("read of unallocated resource '{}'", resource.name));
                match &resource.descriptor {
                    ResourceDescriptor::Texture(desc) => cmd.before_read_texture(object, desc, access),
                    ResourceDescriptor::Buffer(desc) => cmd.before_read_buffer(object, desc, access),
                }
            }

            for (handle, access) in &accesses.writes {
                let resource = &mut resources[handle.index()];
                let object = resource
                    .object
                    .as_mut()
                    .unwrap_or_else(|| panic!("write of unallocated resource '{}'", resource.name));
                match &resource.descriptor {
                    ResourceDescriptor::Texture(desc) => {
                        cmd.before_write_texture(object, desc, access)
                    }
                    ResourceDescriptor::Buffer(desc) => cmd.before_write_buffer(object, desc, access),
                }
            }

            {
                let attachments: Vec<PassAttachment<'_, C::Resource>> = accesses
                    .writes
                    .iter()
                    .filter_map(|(handle, access)| {
                        let aspect = access.attachment_aspect()?;
                        let resource = &resources[handle.index()];
                        let descriptor = resource.descriptor.as_texture()?;
                        let load_op = if accesses.allocates.contains(handle) {
                            LoadOp::Clear
                        } else {
                            LoadOp::Load
                        };
                        Some(PassAttachment {
                            resource: resource.object.as_ref()?,
                            descriptor,
                            aspect,
                            load_op,
                        })
                    })
                    .collect();
                cmd.begin_pass(&record.name, &attachments)?;
            }

            {
                let mut pass_resources =
                    PassResources::new(graph_id, resources.as_mut_slice(), accesses);
                record.pass.render(cmd, &mut pass_resources)?;
            }
            cmd.end_pass()?;

            for handle in accesses.touched() {
                let resource = &mut resources[handle.index()];
                if resource.origin != ResourceOrigin::Transient
                    || resource.last_record != Some(index)
                {
                    continue;
                }
                // A handle can appear in several lists of the same record.
                if let Some(object) = resource.object.take() {
                    log::trace!("Freeing '{}' after pass '{}'", resource.name, record.name);
                    allocator.free(object, &resource.descriptor);
                }
            }
        }

        Ok(())
    }

    /// Take an imported object back out of the graph, with its updated
    /// access state, so it can be imported into the next frame's graph.
    pub fn take_imported<K: HandleKind>(&mut self, handle: ResourceHandle<K>) -> Option<C::Resource> {
        let resource = self.entry_mut(handle);
        assert_eq!(
            resource.origin,
            ResourceOrigin::Imported,
            "only imported resources can be taken; '{}' is transient",
            resource.name
        );
        resource.object.take()
    }

    /// Table entry behind `handle`.
    pub fn resource<K: HandleKind>(&self, handle: ResourceHandle<K>) -> &GraphResource<C::Resource> {
        self.check_handle(handle.raw());
        &self.resources[handle.index()]
    }

    fn entry_mut<K: HandleKind>(
        &mut self,
        handle: ResourceHandle<K>,
    ) -> &mut GraphResource<C::Resource> {
        self.check_handle(handle.raw());
        &mut self.resources[handle.index()]
    }

    fn check_handle(&self, handle: RawHandle) {
        assert_eq!(
            handle.graph_id(),
            self.id,
            "handle {handle:?} belongs to another graph"
        );
        assert!(
            handle.index() < self.resources.len(),
            "handle {handle:?} is out of range ({} resources)",
            self.resources.len()
        );
    }

    fn assert_recording(&self, action: &str) {
        assert_eq!(
            self.phase,
            GraphPhase::Recording,
            "cannot {action} once the graph left the recording phase"
        );
    }

    /// Declared accesses of pass `pass`.
    pub fn pass_accesses(&self, pass: PassHandle) -> &PassAccesses {
        &self.records[pass.index() as usize].accesses
    }

    /// Name of pass `pass`.
    pub fn pass_name(&self, pass: PassHandle) -> &str {
        &self.records[pass.index() as usize].name
    }

    /// Number of resources in the table.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Number of recorded passes.
    pub fn pass_count(&self) -> usize {
        self.records.len()
    }

    /// Current phase.
    pub fn phase(&self) -> GraphPhase {
        self.phase
    }

    /// Unique id of this graph instance.
    pub fn id(&self) -> u32 {
        self.id
    }
}
