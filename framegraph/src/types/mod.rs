//! Resource descriptors.
//!
//! Descriptors are plain values with structural equality and a stable hash.
//! They are the key the graph allocator uses for pooled reuse, so they
//! deliberately carry no debug label: two descriptors that compare equal are
//! interchangeable no matter which pass asked for them.

mod buffer;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};

/// 3D extent (width, height, depth).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels (or array layers).
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 2D extent (depth = 1).
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }
}

/// Kind of a graph resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Image resource.
    Texture,
    /// Linear memory resource.
    Buffer,
}

/// Descriptor of any resource the graph can own or import.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceDescriptor {
    /// Texture descriptor.
    Texture(TextureDescriptor),
    /// Buffer descriptor.
    Buffer(BufferDescriptor),
}

impl ResourceDescriptor {
    /// The resource kind this descriptor describes.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Texture(_) => ResourceKind::Texture,
            Self::Buffer(_) => ResourceKind::Buffer,
        }
    }

    /// The texture descriptor, if this describes a texture.
    pub fn as_texture(&self) -> Option<&TextureDescriptor> {
        match self {
            Self::Texture(desc) => Some(desc),
            Self::Buffer(_) => None,
        }
    }

    /// The buffer descriptor, if this describes a buffer.
    pub fn as_buffer(&self) -> Option<&BufferDescriptor> {
        match self {
            Self::Buffer(desc) => Some(desc),
            Self::Texture(_) => None,
        }
    }
}

impl From<TextureDescriptor> for ResourceDescriptor {
    fn from(desc: TextureDescriptor) -> Self {
        Self::Texture(desc)
    }
}

impl From<BufferDescriptor> for ResourceDescriptor {
    fn from(desc: BufferDescriptor) -> Self {
        Self::Buffer(desc)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::*;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_structurally_equal_descriptors_hash_equal() {
        let a: ResourceDescriptor = TextureDescriptor::new_2d(
            1024,
            1024,
            TextureFormat::Depth32Float,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        )
        .into();
        let b: ResourceDescriptor = TextureDescriptor::new_2d(
            1024,
            1024,
            TextureFormat::Depth32Float,
            TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
        )
        .into();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_kind_distinguishes_textures_from_buffers() {
        let tex: ResourceDescriptor =
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::COPY_SRC)
                .into();
        let buf: ResourceDescriptor = BufferDescriptor::new(64, BufferUsage::UNIFORM).into();
        assert_eq!(tex.kind(), ResourceKind::Texture);
        assert_eq!(buf.kind(), ResourceKind::Buffer);
        assert!(tex.as_buffer().is_none());
        assert_eq!(buf.as_buffer().map(|b| b.size), Some(64));
        assert_ne!(tex, buf);
    }
}
