//! The command protocol between the graph and a backend.
//!
//! [`GraphCommand`] is what the graph itself drives during execution:
//! pre-access hooks and the pass bracket. [`DrawCommand`] adds the draw work
//! render callbacks issue. Its geometry and shadow draws are provided methods
//! built on a handful of backend primitives, so every backend follows the
//! same ordering policy.

mod policy;

pub use policy::{
    CAMERA_SET, CameraUniforms, MATERIAL_SET, MATERIAL_TEXTURE_SLOTS, OBJECT_SET, ObjectUniforms,
    ShadowSettings, ShadowUniforms, full_material_texture_layout, geometry_draw_order,
    material_texture_layout, scaled_bias,
};

use crate::batcher::Batcher;
use crate::cache::{BlendMode, PipelineState, ShaderVariant};
use crate::error::GraphicsError;
use crate::graph::{AccessInfo, AttachmentAspect};
use crate::scene::{Camera, Material, MeshId};
use crate::sync::{AccessScope, TextureLayout, TrackedResource};
use crate::types::{BufferDescriptor, TextureDescriptor, TextureFormat};

/// What happens to an attachment's contents when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    /// Clear to the default clear value. Used for freshly allocated targets.
    Clear,
    /// Keep previous contents.
    Load,
}

/// An attachment write of the pass being started.
#[derive(Debug)]
pub struct PassAttachment<'a, R> {
    /// Backend object.
    pub resource: &'a R,
    /// Its descriptor.
    pub descriptor: &'a TextureDescriptor,
    /// Color or depth.
    pub aspect: AttachmentAspect,
    /// Load behavior.
    pub load_op: LoadOp,
}

/// Render target formats of the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetFormats {
    /// First color attachment format.
    pub color: Option<TextureFormat>,
    /// Depth attachment format.
    pub depth: Option<TextureFormat>,
}

impl TargetFormats {
    /// Collect formats from a pass's attachments.
    pub fn from_attachments<R>(attachments: &[PassAttachment<'_, R>]) -> Self {
        let mut formats = Self::default();
        for attachment in attachments {
            match attachment.aspect {
                AttachmentAspect::Color if formats.color.is_none() => {
                    formats.color = Some(attachment.descriptor.format);
                }
                AttachmentAspect::Depth => formats.depth = Some(attachment.descriptor.format),
                AttachmentAspect::Color => {}
            }
        }
        formats
    }
}

/// Hooks the graph invokes while executing.
///
/// The `before_*` hooks must issue the minimal synchronization between the
/// object's recorded [`AccessScope`](crate::sync::AccessScope) and the
/// declared access, then record the new scope.
pub trait GraphCommand {
    /// Backend object stored behind graph handles.
    type Resource: TrackedResource;

    /// Prepare a texture for a declared read.
    fn before_read_texture(
        &mut self,
        texture: &mut Self::Resource,
        descriptor: &TextureDescriptor,
        access: &AccessInfo,
    );

    /// Prepare a texture for a declared write.
    fn before_write_texture(
        &mut self,
        texture: &mut Self::Resource,
        descriptor: &TextureDescriptor,
        access: &AccessInfo,
    );

    /// Prepare a buffer for a declared read.
    fn before_read_buffer(
        &mut self,
        buffer: &mut Self::Resource,
        descriptor: &BufferDescriptor,
        access: &AccessInfo,
    );

    /// Prepare a buffer for a declared write.
    fn before_write_buffer(
        &mut self,
        buffer: &mut Self::Resource,
        descriptor: &BufferDescriptor,
        access: &AccessInfo,
    );

    /// Open the backend's render scope for a pass.
    fn begin_pass(
        &mut self,
        name: &str,
        attachments: &[PassAttachment<'_, Self::Resource>],
    ) -> Result<(), GraphicsError>;

    /// Close the scope opened by [`begin_pass`](Self::begin_pass).
    fn end_pass(&mut self) -> Result<(), GraphicsError>;
}

/// Panics unless the blit operands were declared as transfer accesses.
pub fn assert_transfer_operands(src: AccessScope, dst: AccessScope) {
    assert_eq!(
        src.layout,
        TextureLayout::TransferSrc,
        "blit source must be read with AccessInfo::Transfer"
    );
    assert_eq!(
        dst.layout,
        TextureLayout::TransferDst,
        "blit destination must be written with AccessInfo::Transfer"
    );
}

/// Draw work issued from inside render callbacks.
pub trait DrawCommand: GraphCommand {
    /// Formats of the current pass's attachments.
    fn target_formats(&self) -> TargetFormats;

    /// Copy `data` into the current frame's uniform pool and bind it.
    fn bind_uniform_buffer(&mut self, set: u32, binding: u32, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Resolve shader and pipeline through the caches and bind the pipeline.
    fn bind_pipeline(
        &mut self,
        shader: &str,
        variant: &ShaderVariant,
        state: &PipelineState,
    ) -> Result<(), GraphicsError>;

    /// Bind the material's albedo, normal and metallic-roughness textures.
    fn bind_material_textures(&mut self, material: &Material) -> Result<(), GraphicsError>;

    /// Bind a mesh's buffers and draw it.
    fn draw_mesh(&mut self, mesh: MeshId) -> Result<(), GraphicsError>;

    /// Blit the whole of `src` onto the whole of `dst`.
    ///
    /// The pass must declare `src` as a read and `dst` as a write with
    /// [`AccessInfo::Transfer`]; the graph's hooks have already transitioned
    /// both, so the blit records no synchronization of its own.
    fn blit(&mut self, src: &mut Self::Resource, dst: &mut Self::Resource)
    -> Result<(), GraphicsError>;

    /// Draw the batched geometry: opaques first, then blended transparents.
    fn draw_geometry(&mut self, batcher: &Batcher, camera: &Camera) -> Result<(), GraphicsError> {
        let targets = self.target_formats();
        let color = targets.color.ok_or_else(|| {
            GraphicsError::InvalidParameter("geometry pass has no color attachment".to_string())
        })?;
        let camera_uniforms = CameraUniforms::new(camera);

        for (item, blend) in geometry_draw_order(batcher) {
            let state = match blend {
                BlendMode::Opaque => PipelineState::opaque(color, targets.depth),
                BlendMode::Alpha => PipelineState::transparent(color, targets.depth),
            };
            self.bind_pipeline(&item.material.shader, &item.material.variant, &state)?;
            self.bind_uniform_buffer(CAMERA_SET, 0, bytemuck::bytes_of(&camera_uniforms))?;
            self.bind_uniform_buffer(
                OBJECT_SET,
                0,
                bytemuck::bytes_of(&ObjectUniforms::new(item)),
            )?;
            if item.material.textures().next().is_some() {
                self.bind_material_textures(&item.material)?;
            }
            self.draw_mesh(item.primitive.mesh)?;
        }
        Ok(())
    }

    /// Draw opaque geometry into a shadow map.
    fn draw_shadow(
        &mut self,
        batcher: &Batcher,
        settings: &ShadowSettings,
    ) -> Result<(), GraphicsError> {
        let depth = self.target_formats().depth.ok_or_else(|| {
            GraphicsError::InvalidParameter("shadow pass has no depth attachment".to_string())
        })?;
        let state = PipelineState::shadow(depth);
        let light_view_projection = settings.view_projection();
        let variant = ShaderVariant::default();

        for item in batcher.opaques() {
            self.bind_pipeline(&settings.shader, &variant, &state)?;
            let uniforms = ShadowUniforms::new(light_view_projection, item, settings);
            self.bind_uniform_buffer(0, 0, bytemuck::bytes_of(&uniforms))?;
            self.draw_mesh(item.primitive.mesh)?;
        }
        Ok(())
    }
}
