use std::collections::HashMap;

use super::{DummyDevice, DummyPipelineCache, DummyResource, DummyShaderCache};
use crate::cache::{BlendMode, PipelineCache, PipelineState, ShaderCache, ShaderStage, ShaderVariant};
use crate::command::{
    DrawCommand, GraphCommand, LoadOp, PassAttachment, TargetFormats, assert_transfer_operands,
    material_texture_layout,
};
use crate::error::GraphicsError;
use crate::frame::{BufferAllocation, DescriptorLayout, Frame};
use crate::graph::AccessInfo;
use crate::scene::{Material, MeshBinding, MeshId, MeshSource, TextureId, TextureSource};
use crate::sync::{AccessScope, Barrier, TrackedResource};
use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor};

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    /// A pipeline barrier on a resource.
    Barrier {
        /// Resource id.
        resource: u64,
        /// The barrier.
        barrier: Barrier,
    },
    /// Start of a pass.
    BeginPass {
        /// Pass name.
        name: String,
        /// Attachment ids with their load operation.
        attachments: Vec<(u64, LoadOp)>,
    },
    /// End of a pass.
    EndPass,
    /// Pipeline bind.
    BindPipeline {
        /// Cached pipeline handle.
        pipeline: u64,
        /// Blend state of the pipeline.
        blend: BlendMode,
    },
    /// Uniform data copied into the frame's pool and bound.
    BindUniform {
        /// Descriptor set index.
        set: u32,
        /// Binding within the set.
        binding: u32,
        /// Where the data landed.
        allocation: BufferAllocation<u64>,
        /// Descriptor set pointing at it.
        descriptor_set: u64,
    },
    /// Material textures bound.
    BindTextures {
        /// Texture views in binding order.
        views: Vec<u64>,
        /// Descriptor set holding them.
        descriptor_set: u64,
    },
    /// Indexed draw of a mesh.
    DrawIndexed {
        /// Mesh drawn.
        mesh: MeshId,
        /// Number of indices.
        index_count: u32,
    },
    /// Full-resource blit.
    Blit {
        /// Source id.
        src: u64,
        /// Destination id.
        dst: u64,
    },
}

/// Long-lived collaborators shared by every frame's command recorder.
#[derive(Debug, Default)]
pub struct DummyContext {
    /// Shader modules.
    pub shaders: DummyShaderCache,
    /// Layouts and pipelines.
    pub pipelines: DummyPipelineCache,
    /// Resident meshes.
    pub meshes: HashMap<MeshId, MeshBinding<u64>>,
    /// Resident texture views.
    pub textures: HashMap<TextureId, u64>,
}

impl DummyContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Records the graph's commands into an event list.
pub struct DummyCommand<'a> {
    frame: &'a mut Frame<DummyDevice>,
    context: &'a mut DummyContext,
    events: Vec<CommandEvent>,
    targets: TargetFormats,
    in_pass: bool,
    pipeline_bound: bool,
}

impl<'a> DummyCommand<'a> {
    /// Create a recorder writing transient data into `frame`.
    pub fn new(frame: &'a mut Frame<DummyDevice>, context: &'a mut DummyContext) -> Self {
        Self {
            frame,
            context,
            events: Vec::new(),
            targets: TargetFormats::default(),
            in_pass: false,
            pipeline_bound: false,
        }
    }

    /// Events recorded so far.
    pub fn events(&self) -> &[CommandEvent] {
        &self.events
    }

    /// Consume the recorder and return its events.
    pub fn into_events(self) -> Vec<CommandEvent> {
        self.events
    }

    fn transition(&mut self, resource: &mut DummyResource, next: AccessScope) {
        if let Some(barrier) = resource.transition_to(next) {
            log::trace!("Barrier on {}: {:?}", resource.id(), barrier);
            self.events.push(CommandEvent::Barrier {
                resource: resource.id(),
                barrier,
            });
        }
    }
}

impl GraphCommand for DummyCommand<'_> {
    type Resource = DummyResource;

    fn before_read_texture(
        &mut self,
        texture: &mut DummyResource,
        _descriptor: &TextureDescriptor,
        access: &AccessInfo,
    ) {
        self.transition(texture, AccessScope::texture_read(access));
    }

    fn before_write_texture(
        &mut self,
        texture: &mut DummyResource,
        _descriptor: &TextureDescriptor,
        access: &AccessInfo,
    ) {
        self.transition(texture, AccessScope::texture_write(access));
    }

    fn before_read_buffer(
        &mut self,
        buffer: &mut DummyResource,
        _descriptor: &BufferDescriptor,
        access: &AccessInfo,
    ) {
        self.transition(buffer, AccessScope::buffer_read(access));
    }

    fn before_write_buffer(
        &mut self,
        buffer: &mut DummyResource,
        _descriptor: &BufferDescriptor,
        access: &AccessInfo,
    ) {
        self.transition(buffer, AccessScope::buffer_write(access));
    }

    fn begin_pass(
        &mut self,
        name: &str,
        attachments: &[PassAttachment<'_, DummyResource>],
    ) -> Result<(), GraphicsError> {
        assert!(!self.in_pass, "begin_pass('{name}') inside an open pass");
        self.in_pass = true;
        self.targets = TargetFormats::from_attachments(attachments);
        self.events.push(CommandEvent::BeginPass {
            name: name.to_string(),
            attachments: attachments
                .iter()
                .map(|attachment| (attachment.resource.id(), attachment.load_op))
                .collect(),
        });
        Ok(())
    }

    fn end_pass(&mut self) -> Result<(), GraphicsError> {
        assert!(self.in_pass, "end_pass without begin_pass");
        self.in_pass = false;
        self.pipeline_bound = false;
        self.targets = TargetFormats::default();
        self.events.push(CommandEvent::EndPass);
        Ok(())
    }
}

impl DrawCommand for DummyCommand<'_> {
    fn target_formats(&self) -> TargetFormats {
        self.targets
    }

    fn bind_uniform_buffer(
        &mut self,
        set: u32,
        binding: u32,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let allocation = self
            .frame
            .allocate_buffer_with_data(BufferUsage::UNIFORM, data)?;
        let descriptor_set = self
            .frame
            .allocate_descriptor_set(&DescriptorLayout::uniform(binding))?;
        self.events.push(CommandEvent::BindUniform {
            set,
            binding,
            allocation,
            descriptor_set,
        });
        Ok(())
    }

    fn bind_pipeline(
        &mut self,
        shader: &str,
        variant: &ShaderVariant,
        state: &PipelineState,
    ) -> Result<(), GraphicsError> {
        let shaders = self.context.shaders.get(
            shader,
            variant,
            &[ShaderStage::Vertex, ShaderStage::Fragment],
        )?;
        let layout = self.context.pipelines.request_pipeline_layout(&shaders)?;
        let pipeline = self
            .context
            .pipelines
            .request_pipeline(layout, &shaders, state)?;
        self.pipeline_bound = true;
        self.events.push(CommandEvent::BindPipeline {
            pipeline,
            blend: state.blend,
        });
        Ok(())
    }

    fn bind_material_textures(&mut self, material: &Material) -> Result<(), GraphicsError> {
        let views = material
            .textures()
            .map(|id| {
                self.context.textures.texture(id).ok_or_else(|| {
                    GraphicsError::MissingCollaborator(format!("texture {id:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let descriptor_set = self
            .frame
            .allocate_descriptor_set(&material_texture_layout(material))?;
        self.events.push(CommandEvent::BindTextures {
            views,
            descriptor_set,
        });
        Ok(())
    }

    fn draw_mesh(&mut self, mesh: MeshId) -> Result<(), GraphicsError> {
        assert!(self.pipeline_bound, "draw_mesh without a bound pipeline");
        let binding = self
            .context
            .meshes
            .mesh(mesh)
            .ok_or_else(|| GraphicsError::MissingCollaborator(format!("mesh {mesh:?}")))?;
        self.events.push(CommandEvent::DrawIndexed {
            mesh,
            index_count: binding.index_count,
        });
        Ok(())
    }

    fn blit(&mut self, src: &mut DummyResource, dst: &mut DummyResource) -> Result<(), GraphicsError> {
        if self.targets != TargetFormats::default() {
            return Err(GraphicsError::InvalidParameter(
                "blit inside a pass with attachments".to_string(),
            ));
        }
        assert_transfer_operands(src.access_scope(), dst.access_scope());
        self.events.push(CommandEvent::Blit {
            src: src.id(),
            dst: dst.id(),
        });
        Ok(())
    }
}
