//! Scene-side inputs consumed by the batcher and the draw commands.
//!
//! The frame graph does not own a scene. It only queries drawables through
//! [`DrawableScene`] and resolves GPU data for meshes and textures through
//! [`MeshSource`] and [`TextureSource`].

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use crate::cache::ShaderVariant;

/// Id of a mesh known to a [`MeshSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u64);

/// Id of a texture known to a [`TextureSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// A drawable piece of geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    /// Mesh holding the vertex and index data.
    pub mesh: MeshId,
    /// Bounds center in object space, used for distance sorting.
    pub center: Vec3,
}

impl Primitive {
    /// Create a primitive centered at the object origin.
    pub fn new(mesh: MeshId) -> Self {
        Self {
            mesh,
            center: Vec3::ZERO,
        }
    }

    /// Set the object-space bounds center.
    pub fn with_center(mut self, center: Vec3) -> Self {
        self.center = center;
        self
    }
}

/// How a material treats alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    /// Fully opaque.
    #[default]
    Opaque,
    /// Alpha tested; drawn with the opaques.
    Mask,
    /// Alpha blended; drawn back-to-front after the opaques.
    Blend,
}

impl AlphaMode {
    /// Returns true if geometry with this mode goes into the transparent list.
    pub fn is_transparent(self) -> bool {
        matches!(self, Self::Blend)
    }
}

/// Surface description of a primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Shader name resolved through the shader cache.
    pub shader: String,
    /// Shader variant.
    pub variant: ShaderVariant,
    /// Alpha mode.
    pub alpha_mode: AlphaMode,
    /// Base color in linear RGBA.
    pub base_color: Vec4,
    /// Albedo texture.
    pub albedo: Option<TextureId>,
    /// Normal map.
    pub normal: Option<TextureId>,
    /// Metallic-roughness texture.
    pub metallic_roughness: Option<TextureId>,
}

impl Material {
    /// Create an untextured material.
    pub fn new(shader: impl Into<String>) -> Self {
        Self {
            shader: shader.into(),
            variant: ShaderVariant::default(),
            alpha_mode: AlphaMode::Opaque,
            base_color: Vec4::ONE,
            albedo: None,
            normal: None,
            metallic_roughness: None,
        }
    }

    /// Set the alpha mode.
    pub fn with_alpha_mode(mut self, alpha_mode: AlphaMode) -> Self {
        self.alpha_mode = alpha_mode;
        self
    }

    /// Set the base color.
    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    /// Set the shader variant.
    pub fn with_variant(mut self, variant: ShaderVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set the albedo, normal and metallic-roughness textures.
    pub fn with_textures(
        mut self,
        albedo: Option<TextureId>,
        normal: Option<TextureId>,
        metallic_roughness: Option<TextureId>,
    ) -> Self {
        self.albedo = albedo;
        self.normal = normal;
        self.metallic_roughness = metallic_roughness;
        self
    }

    /// Textures by slot: albedo, normal, metallic-roughness.
    pub fn texture_slots(&self) -> [Option<TextureId>; 3] {
        [self.albedo, self.normal, self.metallic_roughness]
    }

    /// Bound textures in binding order (albedo, normal, metallic-roughness).
    pub fn textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.texture_slots().into_iter().flatten()
    }
}

/// Camera parameters for one view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World-space position.
    pub position: Vec3,
    /// World to view transform.
    pub view: Mat4,
    /// View to clip transform.
    pub projection: Mat4,
}

impl Camera {
    /// Create a perspective camera looking at `target`.
    pub fn look_at(position: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            view: Mat4::look_at_rh(position, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
        }
    }

    /// Combined view-projection matrix.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// One drawable as exposed by a scene.
#[derive(Debug, Clone, Copy)]
pub struct Drawable<'a> {
    /// World transform of the primitive.
    pub transform: Mat4,
    /// The primitive.
    pub primitive: &'a Primitive,
    /// Its material.
    pub material: &'a Arc<Material>,
}

/// Query contract a scene exposes to the batcher.
pub trait DrawableScene {
    /// Visit every drawable with its resolved world transform.
    fn for_each_drawable(&self, visit: &mut dyn FnMut(Drawable<'_>));
}

/// A flat list of drawables, for tools and tests without a scene graph.
#[derive(Debug, Default, Clone)]
pub struct FlatScene {
    entries: Vec<(Mat4, Primitive, Arc<Material>)>,
}

impl FlatScene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a drawable.
    pub fn push(&mut self, transform: Mat4, primitive: Primitive, material: Arc<Material>) {
        self.entries.push((transform, primitive, material));
    }

    /// Number of drawables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the scene has no drawables.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DrawableScene for FlatScene {
    fn for_each_drawable(&self, visit: &mut dyn FnMut(Drawable<'_>)) {
        for (transform, primitive, material) in &self.entries {
            visit(Drawable {
                transform: *transform,
                primitive,
                material,
            });
        }
    }
}

/// GPU buffers backing a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshBinding<B> {
    /// Vertex buffer.
    pub vertex_buffer: B,
    /// 32-bit index buffer.
    pub index_buffer: B,
    /// Number of indices to draw.
    pub index_count: u32,
}

/// Resolves mesh ids to GPU buffers.
pub trait MeshSource {
    /// Backend buffer handle.
    type Buffer: Copy;

    /// Buffers for `mesh`, or `None` if the mesh is not resident.
    fn mesh(&self, mesh: MeshId) -> Option<MeshBinding<Self::Buffer>>;
}

/// Resolves texture ids to sampled views.
pub trait TextureSource {
    /// Backend view handle.
    type View: Copy;

    /// View for `texture`, or `None` if the texture is not resident.
    fn texture(&self, texture: TextureId) -> Option<Self::View>;
}

impl<B: Copy> MeshSource for HashMap<MeshId, MeshBinding<B>> {
    type Buffer = B;

    fn mesh(&self, mesh: MeshId) -> Option<MeshBinding<B>> {
        self.get(&mesh).copied()
    }
}

impl<V: Copy> TextureSource for HashMap<TextureId, V> {
    type View = V;

    fn texture(&self, texture: TextureId) -> Option<V> {
        self.get(&texture).copied()
    }
}
