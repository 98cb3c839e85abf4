//! How a pass touches a resource.

/// Which part of a render target an attachment access uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentAspect {
    /// Color render target.
    Color,
    /// Depth (and stencil, if the format has one) render target.
    Depth,
}

/// Sampler a shader binding reads a texture through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SamplerKind {
    /// No sampler: uniform/storage buffers and storage images.
    #[default]
    None,
    /// Linear filtering.
    Linear,
    /// Nearest filtering.
    Nearest,
    /// Depth comparison sampler, used for shadow lookups.
    Comparison,
}

/// Access information attached to every declared read or write.
///
/// An access is a render-target use ([`AccessInfo::Attachment`]), a
/// shader-visible binding ([`AccessInfo::Binding`]) or a copy/blit operand
/// ([`AccessInfo::Transfer`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessInfo {
    /// Render attachment of the pass.
    Attachment {
        /// Attachment aspect.
        aspect: AttachmentAspect,
    },
    /// Shader binding.
    Binding {
        /// Descriptor set index.
        set: u32,
        /// Binding location within the set.
        location: u32,
        /// Sampler used for texture reads.
        sampler: SamplerKind,
    },
    /// Source (when read) or destination (when written) of a blit or copy.
    Transfer,
}

impl AccessInfo {
    /// Color attachment access.
    pub const COLOR: Self = Self::Attachment {
        aspect: AttachmentAspect::Color,
    };

    /// Depth attachment access.
    pub const DEPTH: Self = Self::Attachment {
        aspect: AttachmentAspect::Depth,
    };

    /// Shader binding without a sampler.
    pub const fn binding(set: u32, location: u32) -> Self {
        Self::Binding {
            set,
            location,
            sampler: SamplerKind::None,
        }
    }

    /// Sampled texture binding.
    pub const fn sampled(set: u32, location: u32, sampler: SamplerKind) -> Self {
        Self::Binding {
            set,
            location,
            sampler,
        }
    }

    /// Returns the attachment aspect if this is an attachment access.
    pub fn attachment_aspect(&self) -> Option<AttachmentAspect> {
        match self {
            Self::Attachment { aspect } => Some(*aspect),
            Self::Binding { .. } | Self::Transfer => None,
        }
    }
}
