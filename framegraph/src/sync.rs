//! Resource access scopes and minimal barrier planning.
//!
//! Every GPU object the graph touches records the [`AccessScope`] it was last
//! used with. Before the next access, [`plan_transition`] compares the
//! recorded scope with the requested one and decides which synchronization,
//! if any, is required:
//!
//! | previous        | next                 | result                               |
//! |-----------------|----------------------|--------------------------------------|
//! | never used      | same layout          | nothing                              |
//! | read            | covered read         | nothing                              |
//! | read            | read, new stages     | execution dependency, scope widened  |
//! | read            | write                | execution dependency only            |
//! | write           | anything             | full memory barrier                  |
//! | any             | different layout     | barrier with layout transition       |
//!
//! Backends translate the returned [`Barrier`] into native commands.

use bitflags::bitflags;

use crate::graph::{AccessInfo, AttachmentAspect};

bitflags! {
    /// Pipeline stages an access happens in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_INPUT = 1 << 2;
        const VERTEX_SHADER = 1 << 3;
        const FRAGMENT_SHADER = 1 << 4;
        const EARLY_FRAGMENT_TESTS = 1 << 5;
        const LATE_FRAGMENT_TESTS = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER = 1 << 8;
        const TRANSFER = 1 << 9;
        const BOTTOM_OF_PIPE = 1 << 10;
    }
}

bitflags! {
    /// Memory access types.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u32 {
        const INDEX_READ = 1 << 0;
        const VERTEX_ATTRIBUTE_READ = 1 << 1;
        const UNIFORM_READ = 1 << 2;
        const SHADER_READ = 1 << 3;
        const SHADER_WRITE = 1 << 4;
        const COLOR_ATTACHMENT_READ = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 7;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 8;
        const TRANSFER_READ = 1 << 9;
        const TRANSFER_WRITE = 1 << 10;
    }
}

impl AccessFlags {
    /// Every flag that writes memory.
    pub const WRITES: Self = Self::SHADER_WRITE
        .union(Self::COLOR_ATTACHMENT_WRITE)
        .union(Self::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .union(Self::TRANSFER_WRITE);

    /// The write subset of these flags.
    pub fn writes(self) -> Self {
        self & Self::WRITES
    }

    /// Returns true if any flag writes memory.
    pub fn has_writes(self) -> bool {
        self.intersects(Self::WRITES)
    }
}

/// Image layout states a texture can be in.
///
/// Buffers stay in [`TextureLayout::Undefined`] for their whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureLayout {
    /// Initial state, contents undefined.
    #[default]
    Undefined,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for depth/stencil attachment writes.
    DepthStencilAttachment,
    /// Depth attachment that is only tested against.
    DepthStencilReadOnly,
    /// Optimal for shader sampling.
    ShaderReadOnly,
    /// Optimal for transfer source operations.
    TransferSrc,
    /// Optimal for transfer destination operations.
    TransferDst,
    /// Ready for presentation.
    PresentSrc,
    /// Storage image access.
    General,
}

/// Stage, memory access and layout a resource was last used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessScope {
    /// Pipeline stages of the access.
    pub stages: PipelineStages,
    /// Memory accesses performed.
    pub access: AccessFlags,
    /// Image layout (textures only).
    pub layout: TextureLayout,
}

impl AccessScope {
    /// State of a resource that has never been accessed.
    pub const UNDEFINED: Self = Self {
        stages: PipelineStages::empty(),
        access: AccessFlags::empty(),
        layout: TextureLayout::Undefined,
    };

    /// Source of a blit or copy.
    pub const TRANSFER_SRC: Self = Self {
        stages: PipelineStages::TRANSFER,
        access: AccessFlags::TRANSFER_READ,
        layout: TextureLayout::TransferSrc,
    };

    /// Destination of a blit or copy.
    pub const TRANSFER_DST: Self = Self {
        stages: PipelineStages::TRANSFER,
        access: AccessFlags::TRANSFER_WRITE,
        layout: TextureLayout::TransferDst,
    };

    /// Presentation engine handoff.
    pub const PRESENT: Self = Self {
        stages: PipelineStages::BOTTOM_OF_PIPE,
        access: AccessFlags::empty(),
        layout: TextureLayout::PresentSrc,
    };

    /// Create a new scope.
    pub const fn new(stages: PipelineStages, access: AccessFlags, layout: TextureLayout) -> Self {
        Self {
            stages,
            access,
            layout,
        }
    }

    /// Returns true if the resource has not been used since it was created.
    pub fn is_undefined(&self) -> bool {
        self.stages.is_empty() && self.layout == TextureLayout::Undefined
    }

    /// Scope of a declared texture read.
    pub fn texture_read(access: &AccessInfo) -> Self {
        match access {
            AccessInfo::Attachment {
                aspect: AttachmentAspect::Color,
            } => Self::new(
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_READ,
                TextureLayout::ColorAttachment,
            ),
            AccessInfo::Attachment {
                aspect: AttachmentAspect::Depth,
            } => Self::new(
                PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS,
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                TextureLayout::DepthStencilReadOnly,
            ),
            AccessInfo::Binding { .. } => Self::new(
                PipelineStages::FRAGMENT_SHADER,
                AccessFlags::SHADER_READ,
                TextureLayout::ShaderReadOnly,
            ),
            AccessInfo::Transfer => Self::TRANSFER_SRC,
        }
    }

    /// Scope of a declared texture write.
    pub fn texture_write(access: &AccessInfo) -> Self {
        match access {
            AccessInfo::Attachment {
                aspect: AttachmentAspect::Color,
            } => Self::new(
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
                TextureLayout::ColorAttachment,
            ),
            AccessInfo::Attachment {
                aspect: AttachmentAspect::Depth,
            } => Self::new(
                PipelineStages::EARLY_FRAGMENT_TESTS | PipelineStages::LATE_FRAGMENT_TESTS,
                AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                TextureLayout::DepthStencilAttachment,
            ),
            AccessInfo::Binding { .. } => Self::new(
                PipelineStages::FRAGMENT_SHADER | PipelineStages::COMPUTE_SHADER,
                AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
                TextureLayout::General,
            ),
            AccessInfo::Transfer => Self::TRANSFER_DST,
        }
    }

    /// Scope of a declared buffer read.
    pub fn buffer_read(access: &AccessInfo) -> Self {
        assert_buffer_access(access);
        if *access == AccessInfo::Transfer {
            return Self::new(
                PipelineStages::TRANSFER,
                AccessFlags::TRANSFER_READ,
                TextureLayout::Undefined,
            );
        }
        Self::new(
            PipelineStages::VERTEX_SHADER
                | PipelineStages::FRAGMENT_SHADER
                | PipelineStages::COMPUTE_SHADER,
            AccessFlags::UNIFORM_READ | AccessFlags::SHADER_READ,
            TextureLayout::Undefined,
        )
    }

    /// Scope of a declared buffer write.
    pub fn buffer_write(access: &AccessInfo) -> Self {
        assert_buffer_access(access);
        if *access == AccessInfo::Transfer {
            return Self::new(
                PipelineStages::TRANSFER,
                AccessFlags::TRANSFER_WRITE,
                TextureLayout::Undefined,
            );
        }
        Self::new(
            PipelineStages::VERTEX_SHADER
                | PipelineStages::FRAGMENT_SHADER
                | PipelineStages::COMPUTE_SHADER,
            AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            TextureLayout::Undefined,
        )
    }
}

fn assert_buffer_access(access: &AccessInfo) {
    assert!(
        access.attachment_aspect().is_none(),
        "buffers can only be accessed through shader bindings or transfers"
    );
}

/// A synchronization command between two accesses of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Barrier {
    /// Stages that must complete first.
    pub src_stages: PipelineStages,
    /// Writes that must be made available. Empty for execution-only dependencies.
    pub src_access: AccessFlags,
    /// Stages that wait.
    pub dst_stages: PipelineStages,
    /// Accesses that must see the memory.
    pub dst_access: AccessFlags,
    /// Layout before the barrier.
    pub old_layout: TextureLayout,
    /// Layout after the barrier.
    pub new_layout: TextureLayout,
}

impl Barrier {
    /// Returns true if the barrier changes the image layout.
    pub fn is_layout_transition(&self) -> bool {
        self.old_layout != self.new_layout
    }
}

/// Compute the minimal synchronization from `current` to `next`.
///
/// Returns the barrier to record, if any, and the scope the resource must
/// record afterwards.
pub fn plan_transition(current: &AccessScope, next: &AccessScope) -> (Option<Barrier>, AccessScope) {
    let layout_change = current.layout != next.layout;
    let prior_writes = current.access.writes();

    if !layout_change {
        if current.stages.is_empty() {
            return (None, *next);
        }
        if prior_writes.is_empty() && !next.access.has_writes() {
            let widened = AccessScope {
                stages: current.stages | next.stages,
                access: current.access | next.access,
                layout: current.layout,
            };
            if current.stages.contains(next.stages) && current.access.contains(next.access) {
                return (None, widened);
            }
            // Earlier writes are only visible to the recorded reader stages.
            let barrier = Barrier {
                src_stages: current.stages,
                src_access: AccessFlags::empty(),
                dst_stages: next.stages,
                dst_access: next.access,
                old_layout: current.layout,
                new_layout: current.layout,
            };
            return (Some(barrier), widened);
        }
    }

    let src_stages = if current.stages.is_empty() {
        PipelineStages::TOP_OF_PIPE
    } else {
        current.stages
    };

    let barrier = Barrier {
        src_stages,
        src_access: prior_writes,
        dst_stages: next.stages,
        dst_access: next.access,
        old_layout: current.layout,
        new_layout: next.layout,
    };
    (Some(barrier), *next)
}

/// A backend object whose last access scope is tracked.
///
/// Transient objects are reset to [`AccessScope::UNDEFINED`] whenever the
/// allocator hands them out. Imported objects keep their scope across graphs.
pub trait TrackedResource {
    /// The scope the object was last accessed with.
    fn access_scope(&self) -> AccessScope;

    /// Record a new scope.
    fn set_access_scope(&mut self, scope: AccessScope);

    /// Plan the transition to `next`, record the resulting scope and return
    /// the barrier the caller must issue.
    fn transition_to(&mut self, next: AccessScope) -> Option<Barrier> {
        let (barrier, recorded) = plan_transition(&self.access_scope(), &next);
        self.set_access_scope(recorded);
        barrier
    }
}
