//! Resource handles and the graph's resource table entries.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::types::{ResourceDescriptor, ResourceKind};

mod sealed {
    pub trait Sealed {}
}

/// Marker trait for the kinds a [`ResourceHandle`] can be typed with.
pub trait HandleKind: sealed::Sealed {
    /// Resource kind the handle refers to.
    const KIND: ResourceKind;
}

/// Handle kind marker for textures.
#[derive(Debug)]
pub enum TextureKind {}

/// Handle kind marker for buffers.
#[derive(Debug)]
pub enum BufferKind {}

impl sealed::Sealed for TextureKind {}
impl sealed::Sealed for BufferKind {}

impl HandleKind for TextureKind {
    const KIND: ResourceKind = ResourceKind::Texture;
}

impl HandleKind for BufferKind {
    const KIND: ResourceKind = ResourceKind::Buffer;
}

/// Untyped handle as stored in pass records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle {
    graph: u32,
    index: u32,
}

impl RawHandle {
    /// Index into the owning graph's resource table.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Id of the graph that issued the handle.
    pub fn graph_id(&self) -> u32 {
        self.graph
    }
}

/// Typed handle to a resource in a [`RenderGraph`](super::RenderGraph).
///
/// Handles are assigned monotonically at import/allocate time, are never
/// reused within one graph and are only valid for the graph that issued them.
pub struct ResourceHandle<K> {
    raw: RawHandle,
    _kind: PhantomData<fn() -> K>,
}

/// Handle to a texture resource.
pub type TextureHandle = ResourceHandle<TextureKind>;

/// Handle to a buffer resource.
pub type BufferHandle = ResourceHandle<BufferKind>;

impl<K: HandleKind> ResourceHandle<K> {
    pub(crate) fn new(graph: u32, index: u32) -> Self {
        Self {
            raw: RawHandle { graph, index },
            _kind: PhantomData,
        }
    }

    /// Index into the graph's resource table.
    pub fn index(&self) -> usize {
        self.raw.index()
    }

    /// The untyped handle.
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    /// Resource kind of this handle.
    pub fn kind(&self) -> ResourceKind {
        K::KIND
    }
}

impl<K> Clone for ResourceHandle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for ResourceHandle<K> {}

impl<K> PartialEq for ResourceHandle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for ResourceHandle<K> {}

impl<K> Hash for ResourceHandle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: HandleKind> fmt::Debug for ResourceHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}Handle({})", K::KIND, self.raw.index)
    }
}

/// Who owns a resource's backend object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceOrigin {
    /// Externally owned; the allocator never sees it.
    Imported,
    /// Owned by the allocator's pool for the duration of the graph.
    Transient,
}

/// An entry of the graph's resource table.
#[derive(Debug)]
pub struct GraphResource<R> {
    pub(crate) name: String,
    pub(crate) descriptor: ResourceDescriptor,
    pub(crate) origin: ResourceOrigin,
    pub(crate) object: Option<R>,
    pub(crate) last_record: Option<usize>,
}

impl<R> GraphResource<R> {
    pub(crate) fn imported(name: &str, descriptor: ResourceDescriptor, object: R) -> Self {
        Self {
            name: name.to_string(),
            descriptor,
            origin: ResourceOrigin::Imported,
            object: Some(object),
            last_record: None,
        }
    }

    pub(crate) fn transient(name: &str, descriptor: ResourceDescriptor) -> Self {
        Self {
            name: name.to_string(),
            descriptor,
            origin: ResourceOrigin::Transient,
            object: None,
            last_record: None,
        }
    }

    /// Debug name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor of the resource.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Whether the resource is imported or transient.
    pub fn origin(&self) -> ResourceOrigin {
        self.origin
    }

    /// Index of the last pass record that touches the resource, set by compile.
    pub fn last_record(&self) -> Option<usize> {
        self.last_record
    }

    /// The backend object, if currently bound.
    pub fn object(&self) -> Option<&R> {
        self.object.as_ref()
    }

    /// Returns true if a backend object is currently bound.
    pub fn is_allocated(&self) -> bool {
        self.object.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_handles_compare_by_graph_and_index() {
        let a = TextureHandle::new(1, 0);
        let b = TextureHandle::new(1, 0);
        let c = TextureHandle::new(2, 0);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_handle_kind_and_debug() {
        let handle = BufferHandle::new(7, 3);
        assert_eq!(handle.kind(), ResourceKind::Buffer);
        assert_eq!(handle.index(), 3);
        assert_eq!(handle.raw().graph_id(), 7);
        assert_eq!(format!("{handle:?}"), "BufferHandle(3)");
    }
}
