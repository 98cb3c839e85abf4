//! Type-erased pass dispatch.
//!
//! The graph stores passes as `Box<dyn RenderPass<C>>`, so every pass in one
//! graph shares the command type while carrying its own data type.

use super::builder::PassAccesses;
use super::resource::{GraphResource, HandleKind, ResourceHandle};
use crate::command::GraphCommand;
use crate::error::GraphicsError;
use crate::types::ResourceDescriptor;

/// Handle to a pass in a render graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassHandle(u32);

impl PassHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the index of this pass.
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// Render invocation shared by all passes of a graph.
pub trait RenderPass<C: GraphCommand> {
    /// Record the pass's GPU work.
    fn render(
        &mut self,
        cmd: &mut C,
        resources: &mut PassResources<'_, C::Resource>,
    ) -> Result<(), GraphicsError>;
}

/// A pass built from a data value and a render callback.
pub(crate) struct CallbackPass<D, F> {
    data: D,
    render: F,
}

impl<D, F> CallbackPass<D, F> {
    pub(crate) fn new(data: D, render: F) -> Self {
        Self { data, render }
    }
}

impl<C, D, F> RenderPass<C> for CallbackPass<D, F>
where
    C: GraphCommand,
    F: FnMut(&D, &mut C, &mut PassResources<'_, C::Resource>) -> Result<(), GraphicsError>,
{
    fn render(
        &mut self,
        cmd: &mut C,
        resources: &mut PassResources<'_, C::Resource>,
    ) -> Result<(), GraphicsError> {
        (self.render)(&self.data, cmd, resources)
    }
}

/// One entry of the graph's ordered pass list.
pub(crate) struct PassRecord<'g, C: GraphCommand> {
    pub(crate) name: String,
    pub(crate) pass: Box<dyn RenderPass<C> + 'g>,
    pub(crate) accesses: PassAccesses,
}

/// Backend objects visible to a pass while it renders.
///
/// Only handles the pass declared through its builder resolve; anything
/// else panics.
pub struct PassResources<'r, R> {
    graph_id: u32,
    resources: &'r mut [GraphResource<R>],
    accesses: &'r PassAccesses,
}

impl<'r, R> PassResources<'r, R> {
    pub(crate) fn new(
        graph_id: u32,
        resources: &'r mut [GraphResource<R>],
        accesses: &'r PassAccesses,
    ) -> Self {
        Self {
            graph_id,
            resources,
            accesses,
        }
    }

    /// Backend object behind `handle`.
    pub fn get<K: HandleKind>(&self, handle: ResourceHandle<K>) -> &R {
        let index = self.check(handle);
        let resource = &self.resources[index];
        resource
            .object
            .as_ref()
            .unwrap_or_else(|| panic!("resource '{}' is not allocated", resource.name))
    }

    /// Mutable backend object behind `handle`.
    pub fn get_mut<K: HandleKind>(&mut self, handle: ResourceHandle<K>) -> &mut R {
        let index = self.check(handle);
        let resource = &mut self.resources[index];
        let name = &resource.name;
        resource
            .object
            .as_mut()
            .unwrap_or_else(|| panic!("resource '{name}' is not allocated"))
    }

    /// Two distinct backend objects at once, e.g. blit source and destination.
    pub fn pair_mut<A: HandleKind, B: HandleKind>(
        &mut self,
        first: ResourceHandle<A>,
        second: ResourceHandle<B>,
    ) -> (&mut R, &mut R) {
        let a = self.check(first);
        let b = self.check(second);
        assert_ne!(a, b, "pair_mut requires two distinct resources");

        let (low, high) = (a.min(b), a.max(b));
        let (head, tail) = self.resources.split_at_mut(high);
        let low_object = head[low]
            .object
            .as_mut()
            .unwrap_or_else(|| panic!("resource at index {low} is not allocated"));
        let high_object = tail[0]
            .object
            .as_mut()
            .unwrap_or_else(|| panic!("resource at index {high} is not allocated"));

        if a < b {
            (low_object, high_object)
        } else {
            (high_object, low_object)
        }
    }

    /// Descriptor of `handle`.
    pub fn descriptor<K: HandleKind>(&self, handle: ResourceHandle<K>) -> &ResourceDescriptor {
        let index = self.check(handle);
        &self.resources[index].descriptor
    }

    fn check<K: HandleKind>(&self, handle: ResourceHandle<K>) -> usize {
        assert_eq!(
            handle.raw().graph_id(),
            self.graph_id,
            "handle {handle:?} belongs to another graph"
        );
        assert!(
            self.accesses.declares(handle.raw()),
            "pass accessed {handle:?} without declaring it"
        );
        handle.index()
    }
}
