use std::sync::Arc;

use super::DummyDevice;
use crate::allocator::ResourceFactory;
use crate::error::GraphicsError;
use crate::sync::{AccessScope, TrackedResource};
use crate::types::{ResourceDescriptor, ResourceKind};

/// A texture or buffer of the dummy device.
#[derive(Debug, Clone, PartialEq)]
pub struct DummyResource {
    id: u64,
    kind: ResourceKind,
    scope: AccessScope,
}

impl DummyResource {
    /// Create a resource for `descriptor`, e.g. to import into a graph.
    pub fn new(device: &DummyDevice, descriptor: &ResourceDescriptor) -> Self {
        let id = device.next_resource_id();
        log::trace!("DummyDevice: creating {:?} {id}", descriptor.kind());
        Self {
            id,
            kind: descriptor.kind(),
            scope: AccessScope::UNDEFINED,
        }
    }

    /// Resource id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Texture or buffer.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

impl TrackedResource for DummyResource {
    fn access_scope(&self) -> AccessScope {
        self.scope
    }

    fn set_access_scope(&mut self, scope: AccessScope) {
        self.scope = scope;
    }
}

/// Creates [`DummyResource`]s for a [`PooledAllocator`](crate::allocator::PooledAllocator).
pub struct DummyResourceFactory {
    device: Arc<DummyDevice>,
}

impl DummyResourceFactory {
    /// Create a factory on `device`.
    pub fn new(device: Arc<DummyDevice>) -> Self {
        Self { device }
    }
}

impl ResourceFactory for DummyResourceFactory {
    type Resource = DummyResource;

    fn create(&mut self, descriptor: &ResourceDescriptor) -> Result<DummyResource, GraphicsError> {
        Ok(DummyResource::new(&self.device, descriptor))
    }
}
