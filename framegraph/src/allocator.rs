//! Graph allocator: descriptor-keyed pooling of transient GPU objects.
//!
//! [`PooledAllocator`] never destroys an object it created. Freed objects go
//! back onto a free list keyed by their descriptor and are handed out again to
//! any later request with a structurally equal descriptor. Memory is traded
//! for zero allocation churn in steady state.

use std::collections::HashMap;

use redlilium_core::{profile_function, profile_plot};

use crate::error::GraphicsError;
use crate::sync::{AccessScope, TrackedResource};
use crate::types::ResourceDescriptor;

/// Supplies and recycles the backend objects behind transient resources.
pub trait GraphAllocator {
    /// Backend object type.
    type Resource;

    /// Get an object matching `descriptor`.
    fn allocate(&mut self, descriptor: &ResourceDescriptor) -> Result<Self::Resource, GraphicsError>;

    /// Return an object previously obtained for `descriptor`.
    fn free(&mut self, resource: Self::Resource, descriptor: &ResourceDescriptor);
}

/// Creates backend objects for the [`PooledAllocator`].
pub trait ResourceFactory {
    /// Backend object type.
    type Resource: TrackedResource;

    /// Create a new object for `descriptor`.
    fn create(&mut self, descriptor: &ResourceDescriptor) -> Result<Self::Resource, GraphicsError>;
}

/// Free-list allocator over a [`ResourceFactory`].
pub struct PooledAllocator<F: ResourceFactory> {
    factory: F,
    free_lists: HashMap<ResourceDescriptor, Vec<F::Resource>>,
    created: usize,
}

impl<F: ResourceFactory> PooledAllocator<F> {
    /// Create an allocator with empty free lists.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            free_lists: HashMap::new(),
            created: 0,
        }
    }

    /// The underlying factory.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Number of objects created over the allocator's lifetime.
    pub fn created_count(&self) -> usize {
        self.created
    }

    /// Number of objects currently sitting in free lists.
    pub fn pooled_count(&self) -> usize {
        self.free_lists.values().map(Vec::len).sum()
    }

    /// Number of pooled objects matching `descriptor`.
    pub fn pooled_for(&self, descriptor: &ResourceDescriptor) -> usize {
        self.free_lists.get(descriptor).map_or(0, Vec::len)
    }
}

impl<F: ResourceFactory> GraphAllocator for PooledAllocator<F> {
    type Resource = F::Resource;

    fn allocate(&mut self, descriptor: &ResourceDescriptor) -> Result<F::Resource, GraphicsError> {
        profile_function!();
        let mut resource = match self.free_lists.get_mut(descriptor).and_then(Vec::pop) {
            Some(resource) => {
                log::trace!("Reusing pooled {:?}", descriptor.kind());
                resource
            }
            None => {
                let resource = self.factory.create(descriptor)?;
                self.created += 1;
                profile_plot!("transients_created", self.created);
                log::debug!(
                    "Created transient {:?} ({} total): {:?}",
                    descriptor.kind(),
                    self.created,
                    descriptor
                );
                resource
            }
        };
        resource.set_access_scope(AccessScope::UNDEFINED);
        Ok(resource)
    }

    fn free(&mut self, resource: F::Resource, descriptor: &ResourceDescriptor) {
        self.free_lists
            .entry(descriptor.clone())
            .or_default()
            .push(resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AccessInfo;
    use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor, TextureFormat, TextureUsage};

    #[derive(Debug, PartialEq)]
    struct Object {
        id: u32,
        scope: AccessScope,
    }

    impl TrackedResource for Object {
        fn access_scope(&self) -> AccessScope {
            self.scope
        }
        fn set_access_scope(&mut self, scope: AccessScope) {
            self.scope = scope;
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        next: u32,
        fail: bool,
    }

    impl ResourceFactory for CountingFactory {
        type Resource = Object;

        fn create(&mut self, _descriptor: &ResourceDescriptor) -> Result<Object, GraphicsError> {
            if self.fail {
                return Err(GraphicsError::OutOfMemory);
            }
            self.next += 1;
            Ok(Object {
                id: self.next,
                scope: AccessScope::UNDEFINED,
            })
        }
    }

    fn color_target() -> ResourceDescriptor {
        TextureDescriptor::new_2d(
            640,
            480,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )
        .into()
    }

    #[test]
    fn test_free_then_allocate_equal_descriptor_reuses_object() {
        let mut allocator = PooledAllocator::new(CountingFactory::default());
        let first = allocator.allocate(&color_target()).unwrap();
        let id = first.id;
        allocator.free(first, &color_target());

        // A freshly built, structurally equal descriptor.
        let again = allocator.allocate(&color_target()).unwrap();
        assert_eq!(again.id, id);
        assert_eq!(allocator.created_count(), 1);
        assert_eq!(allocator.pooled_count(), 0);
    }

    #[test]
    fn test_different_descriptor_creates_new_object() {
        let mut allocator = PooledAllocator::new(CountingFactory::default());
        let texture = allocator.allocate(&color_target()).unwrap();
        allocator.free(texture, &color_target());

        let buffer_desc: ResourceDescriptor =
            BufferDescriptor::new(256, BufferUsage::UNIFORM).into();
        let buffer = allocator.allocate(&buffer_desc).unwrap();
        assert_eq!(buffer.id, 2);
        assert_eq!(allocator.pooled_for(&color_target()), 1);
        assert_eq!(allocator.created_count(), 2);
    }

    #[test]
    fn test_reused_object_state_is_reset() {
        let mut allocator = PooledAllocator::new(CountingFactory::default());
        let mut texture = allocator.allocate(&color_target()).unwrap();
        texture.set_access_scope(AccessScope::texture_write(&AccessInfo::COLOR));
        allocator.free(texture, &color_target());

        let texture = allocator.allocate(&color_target()).unwrap();
        assert_eq!(texture.access_scope(), AccessScope::UNDEFINED);
    }

    #[test]
    fn test_creation_failure_propagates() {
        let mut allocator = PooledAllocator::new(CountingFactory {
            next: 0,
            fail: true,
        });
        assert_eq!(
            allocator.allocate(&color_target()),
            Err(GraphicsError::OutOfMemory)
        );
        assert_eq!(allocator.created_count(), 0);
    }
}
