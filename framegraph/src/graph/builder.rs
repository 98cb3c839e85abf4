//! Per-pass declaration surface.

use super::access::AccessInfo;
use super::resource::{
    BufferHandle, GraphResource, HandleKind, RawHandle, ResourceHandle, TextureHandle,
};
use crate::types::{BufferDescriptor, ResourceKind, TextureDescriptor};

/// Resource usage recorded for one pass, in declaration order.
#[derive(Debug, Default, Clone)]
pub struct PassAccesses {
    pub(crate) allocates: Vec<RawHandle>,
    pub(crate) writes: Vec<(RawHandle, AccessInfo)>,
    pub(crate) reads: Vec<(RawHandle, AccessInfo)>,
}

impl PassAccesses {
    /// Resources allocated by the pass.
    pub fn allocates(&self) -> &[RawHandle] {
        &self.allocates
    }

    /// Declared writes.
    pub fn writes(&self) -> &[(RawHandle, AccessInfo)] {
        &self.writes
    }

    /// Declared reads.
    pub fn reads(&self) -> &[(RawHandle, AccessInfo)] {
        &self.reads
    }

    /// Every handle the pass touches, in any role.
    pub fn touched(&self) -> impl Iterator<Item = RawHandle> + '_ {
        self.allocates
            .iter()
            .copied()
            .chain(self.writes.iter().map(|(handle, _)| *handle))
            .chain(self.reads.iter().map(|(handle, _)| *handle))
    }

    /// Returns true if the pass declared any access to `handle`.
    pub fn declares(&self, handle: RawHandle) -> bool {
        self.touched().any(|touched| touched == handle)
    }
}

/// Recording surface handed to a pass's setup callback.
///
/// The builder performs no GPU work and no conflict resolution; it only
/// transcribes what the pass declares into its record.
pub struct GraphBuilder<'a, R> {
    graph_id: u32,
    resources: &'a mut Vec<GraphResource<R>>,
    accesses: &'a mut PassAccesses,
}

impl<'a, R> GraphBuilder<'a, R> {
    pub(crate) fn new(
        graph_id: u32,
        resources: &'a mut Vec<GraphResource<R>>,
        accesses: &'a mut PassAccesses,
    ) -> Self {
        Self {
            graph_id,
            resources,
            accesses,
        }
    }

    /// Declare a transient texture allocated at the start of this pass.
    pub fn allocate_texture(&mut self, name: &str, descriptor: TextureDescriptor) -> TextureHandle {
        let handle = TextureHandle::new(self.graph_id, self.next_index());
        self.resources
            .push(GraphResource::transient(name, descriptor.into()));
        self.accesses.allocates.push(handle.raw());
        handle
    }

    /// Declare a transient buffer allocated at the start of this pass.
    pub fn allocate_buffer(&mut self, name: &str, descriptor: BufferDescriptor) -> BufferHandle {
        let handle = BufferHandle::new(self.graph_id, self.next_index());
        self.resources
            .push(GraphResource::transient(name, descriptor.into()));
        self.accesses.allocates.push(handle.raw());
        handle
    }

    /// Declare a read of `handle`.
    pub fn read<K: HandleKind>(
        &mut self,
        handle: ResourceHandle<K>,
        access: AccessInfo,
    ) -> ResourceHandle<K> {
        self.validate(handle, &access);
        self.accesses.reads.push((handle.raw(), access));
        handle
    }

    /// Declare a write of `handle`.
    pub fn write<K: HandleKind>(
        &mut self,
        handle: ResourceHandle<K>,
        access: AccessInfo,
    ) -> ResourceHandle<K> {
        self.validate(handle, &access);
        self.accesses.writes.push((handle.raw(), access));
        handle
    }

    fn next_index(&self) -> u32 {
        u32::try_from(self.resources.len()).expect("resource table exceeds u32::MAX entries")
    }

    fn validate<K: HandleKind>(&self, handle: ResourceHandle<K>, access: &AccessInfo) {
        assert_eq!(
            handle.raw().graph_id(),
            self.graph_id,
            "handle {handle:?} belongs to another graph"
        );
        assert!(
            handle.index() < self.resources.len(),
            "handle {handle:?} is out of range ({} resources)",
            self.resources.len()
        );
        if K::KIND == ResourceKind::Buffer {
            assert!(
                access.attachment_aspect().is_none(),
                "buffer '{}' cannot be used as an attachment",
                self.resources[handle.index()].name
            );
        }
    }
}
