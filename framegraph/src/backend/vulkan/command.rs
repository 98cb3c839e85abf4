//! Command buffer recording for graph execution.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;

use super::barriers::BarrierBatch;
use super::conversion::{convert_layout, convert_load_op};
use super::pipeline::{VulkanPipelineCache, VulkanShaderCache};
use super::resource::{VulkanObject, VulkanResource};
use super::VulkanDevice;
use crate::cache::{PipelineCache, PipelineState, ShaderCache, ShaderStage, ShaderVariant};
use crate::command::{
    DrawCommand, GraphCommand, MATERIAL_SET, PassAttachment, TargetFormats,
    assert_transfer_operands, full_material_texture_layout,
};
use crate::error::GraphicsError;
use crate::frame::{DescriptorLayout, Frame};
use crate::graph::{AccessInfo, AttachmentAspect};
use crate::scene::{Material, MeshBinding, MeshId, MeshSource, TextureId, TextureSource};
use crate::sync::{AccessScope, TrackedResource};
use crate::types::{BufferDescriptor, BufferUsage, TextureDescriptor};

/// Sampled view of a resident texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanTextureView {
    /// Image view.
    pub view: vk::ImageView,
    /// Sampler used for material lookups.
    pub sampler: vk::Sampler,
}

/// Long-lived collaborators shared by every frame's command recorder.
pub struct VulkanContext {
    /// Shader modules.
    pub shaders: VulkanShaderCache,
    /// Layouts and pipelines.
    pub pipelines: VulkanPipelineCache,
    /// Resident meshes.
    pub meshes: HashMap<MeshId, MeshBinding<vk::Buffer>>,
    /// Resident texture views.
    pub textures: HashMap<TextureId, VulkanTextureView>,
}

impl VulkanContext {
    /// Create empty caches on `device`.
    pub fn new(device: Arc<VulkanDevice>) -> Self {
        Self {
            shaders: VulkanShaderCache::new(Arc::clone(&device)),
            pipelines: VulkanPipelineCache::new(device),
            meshes: HashMap::new(),
            textures: HashMap::new(),
        }
    }
}

/// Records graph execution into the current frame's command buffer.
pub struct VulkanCommand<'a> {
    frame: &'a mut Frame<VulkanDevice>,
    context: &'a mut VulkanContext,
    device: Arc<VulkanDevice>,
    cmd: vk::CommandBuffer,
    barriers: BarrierBatch,
    targets: TargetFormats,
    in_pass: bool,
    rendering: bool,
    pipeline_layout: Option<vk::PipelineLayout>,
}

impl<'a> VulkanCommand<'a> {
    /// Create a recorder for `frame`, which must be between `begin` and `submit`.
    pub fn new(frame: &'a mut Frame<VulkanDevice>, context: &'a mut VulkanContext) -> Self {
        assert!(frame.is_recording(), "frame is not recording");
        let device = Arc::clone(frame.device());
        let cmd = frame.command_buffer();
        Self {
            frame,
            context,
            device,
            cmd,
            barriers: BarrierBatch::new(),
            targets: TargetFormats::default(),
            in_pass: false,
            rendering: false,
            pipeline_layout: None,
        }
    }

    /// Move an imported image into the presentable layout.
    pub fn prepare_present(&mut self, texture: &mut VulkanResource) {
        self.transition(texture, AccessScope::PRESENT);
        self.barriers.flush(self.device.raw(), self.cmd);
    }

    fn transition(&mut self, resource: &mut VulkanResource, next: AccessScope) {
        let Some(barrier) = resource.transition_to(next) else {
            return;
        };
        match *resource.object() {
            VulkanObject::Texture { image, aspect, .. } => {
                self.barriers.add_image_barrier(image, aspect, &barrier);
            }
            VulkanObject::Buffer { .. } => self.barriers.add_buffer_barrier(&barrier),
        }
    }

    fn bound_layout(&self, what: &str) -> Result<vk::PipelineLayout, GraphicsError> {
        self.pipeline_layout.ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("{what} bound before any pipeline"))
        })
    }

    fn bind_set(&self, layout: vk::PipelineLayout, set: u32, descriptor_set: vk::DescriptorSet) {
        unsafe {
            self.device.raw().cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set,
                &[descriptor_set],
                &[],
            );
        }
    }
}

fn rendering_attachment(
    attachment: &PassAttachment<'_, VulkanResource>,
) -> Result<vk::RenderingAttachmentInfo<'static>, GraphicsError> {
    let view = attachment.resource.view().ok_or_else(|| {
        GraphicsError::InvalidParameter("attachment is not a texture".to_string())
    })?;
    let depth = attachment.aspect == AttachmentAspect::Depth;
    let (load_op, clear_value) = convert_load_op(attachment.load_op, depth);

    Ok(vk::RenderingAttachmentInfo::default()
        .image_view(view)
        .image_layout(convert_layout(attachment.resource.access_scope().layout))
        .load_op(load_op)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(clear_value))
}

impl GraphCommand for VulkanCommand<'_> {
    type Resource = VulkanResource;

    fn before_read_texture(
        &mut self,
        texture: &mut VulkanResource,
        _descriptor: &TextureDescriptor,
        access: &AccessInfo,
    ) {
        self.transition(texture, AccessScope::texture_read(access));
    }

    fn before_write_texture(
        &mut self,
        texture: &mut VulkanResource,
        _descriptor: &TextureDescriptor,
        access: &AccessInfo,
    ) {
        self.transition(texture, AccessScope::texture_write(access));
    }

    fn before_read_buffer(
        &mut self,
        buffer: &mut VulkanResource,
        _descriptor: &BufferDescriptor,
        access: &AccessInfo,
    ) {
        self.transition(buffer, AccessScope::buffer_read(access));
    }

    fn before_write_buffer(
        &mut self,
        buffer: &mut VulkanResource,
        _descriptor: &BufferDescriptor,
        access: &AccessInfo,
    ) {
        self.transition(buffer, AccessScope::buffer_write(access));
    }

    fn begin_pass(
        &mut self,
        name: &str,
        attachments: &[PassAttachment<'_, VulkanResource>],
    ) -> Result<(), GraphicsError> {
        assert!(!self.in_pass, "begin_pass('{name}') inside an open pass");
        self.barriers.flush(self.device.raw(), self.cmd);
        self.in_pass = true;
        self.targets = TargetFormats::from_attachments(attachments);

        let Some(first) = attachments.first() else {
            return Ok(());
        };

        let mut color_attachments = Vec::new();
        let mut depth_attachment = None;
        for attachment in attachments {
            let info = rendering_attachment(attachment)?;
            match attachment.aspect {
                AttachmentAspect::Color => color_attachments.push(info),
                AttachmentAspect::Depth => depth_attachment = Some(info),
            }
        }

        let extent = vk::Extent2D {
            width: first.descriptor.size.width,
            height: first.descriptor.size.height,
        };
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        // Negative viewport height keeps the Y-up convention of the shaders.
        let viewport = vk::Viewport {
            x: 0.0,
            y: extent.height as f32,
            width: extent.width as f32,
            height: -(extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };

        let raw = self.device.raw();
        unsafe {
            raw.cmd_begin_rendering(self.cmd, &rendering_info);
            raw.cmd_set_viewport(self.cmd, 0, &[viewport]);
            raw.cmd_set_scissor(self.cmd, 0, &[render_area]);
        }
        self.rendering = true;
        log::trace!("Vulkan: begin pass '{}' ({:?})", name, extent);
        Ok(())
    }

    fn end_pass(&mut self) -> Result<(), GraphicsError> {
        assert!(self.in_pass, "end_pass without begin_pass");
        if self.rendering {
            unsafe { self.device.raw().cmd_end_rendering(self.cmd) };
        }
        self.in_pass = false;
        self.rendering = false;
        self.pipeline_layout = None;
        self.targets = TargetFormats::default();
        Ok(())
    }
}

impl DrawCommand for VulkanCommand<'_> {
    fn target_formats(&self) -> TargetFormats {
        self.targets
    }

    fn bind_uniform_buffer(
        &mut self,
        set: u32,
        binding: u32,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let layout = self.bound_layout("uniform buffer")?;
        let allocation = self
            .frame
            .allocate_buffer_with_data(BufferUsage::UNIFORM, data)?;
        let descriptor_set = self
            .frame
            .allocate_descriptor_set(&DescriptorLayout::uniform(binding))?;

        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(allocation.buffer)
            .offset(allocation.offset)
            .range(allocation.size)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(descriptor_set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);

        unsafe { self.device.raw().update_descriptor_sets(&[write], &[]) };
        self.bind_set(layout, set, descriptor_set);
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

        unsafe {
            self.device
                .raw()
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
        self.pipeline_layout = Some(layout);
        Ok(())
    }

    fn bind_material_textures(&mut self, material: &Material) -> Result<(), GraphicsError> {
        let layout = self.bound_layout("material textures")?;

        let mut image_infos = Vec::new();
        for (slot, texture) in material.texture_slots().into_iter().enumerate() {
            let Some(texture) = texture else { continue };
            let view = self.context.textures.texture(texture).ok_or_else(|| {
                GraphicsError::MissingCollaborator(format!("texture {texture:?}"))
            })?;
            image_infos.push((
                slot as u32,
                [vk::DescriptorImageInfo::default()
                    .sampler(view.sampler)
                    .image_view(view.view)
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)],
            ));
        }

        // Absent slots stay unwritten; the set layout must match the pipeline's.
        let descriptor_set = self
            .frame
            .allocate_descriptor_set(&full_material_texture_layout())?;
        let writes: Vec<_> = image_infos
            .iter()
            .map(|(slot, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(descriptor_set)
                    .dst_binding(*slot)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(info)
            })
            .collect();

        unsafe { self.device.raw().update_descriptor_sets(&writes, &[]) };
        self.bind_set(layout, MATERIAL_SET, descriptor_set);
        Ok(())
    }

    fn draw_mesh(&mut self, mesh: MeshId) -> Result<(), GraphicsError> {
        assert!(
            self.pipeline_layout.is_some(),
            "draw_mesh without a bound pipeline"
        );
        let binding = self
            .context
            .meshes
            .mesh(mesh)
            .ok_or_else(|| GraphicsError::MissingCollaborator(format!("mesh {mesh:?}")))?;

        let raw = self.device.raw();
        unsafe {
            raw.cmd_bind_vertex_buffers(self.cmd, 0, &[binding.vertex_buffer], &[0]);
            raw.cmd_bind_index_buffer(self.cmd, binding.index_buffer, 0, vk::IndexType::UINT32);
            raw.cmd_draw_indexed(self.cmd, binding.index_count, 1, 0, 0, 0);
        }
        Ok(())
    }

    fn blit(
        &mut self,
        src: &mut VulkanResource,
        dst: &mut VulkanResource,
    ) -> Result<(), GraphicsError> {
        if self.rendering {
            return Err(GraphicsError::InvalidParameter(
                "blit inside a pass with attachments".to_string(),
            ));
        }
        let (
            VulkanObject::Texture {
                image: src_image,
                aspect,
                extent: src_extent,
                ..
            },
            VulkanObject::Texture {
                image: dst_image,
                extent: dst_extent,
                ..
            },
        ) = (*src.object(), *dst.object())
        else {
            return Err(GraphicsError::InvalidParameter(
                "blit between non-texture resources".to_string(),
            ));
        };

        assert_transfer_operands(src.access_scope(), dst.access_scope());

        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: aspect,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let corner = |extent: vk::Extent3D| vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: 1,
        };
        let region = vk::ImageBlit::default()
            .src_subresource(subresource)
            .src_offsets([vk::Offset3D::default(), corner(src_extent)])
            .dst_subresource(subresource)
            .dst_offsets([vk::Offset3D::default(), corner(dst_extent)]);
        let filter = if aspect.contains(vk::ImageAspectFlags::COLOR) {
            vk::Filter::LINEAR
        } else {
            vk::Filter::NEAREST
        };

        unsafe {
            self.device.raw().cmd_blit_image(
                self.cmd,
                src_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                filter,
            );
        }
        Ok(())
    }
}
