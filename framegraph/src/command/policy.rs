//! Backend-independent draw policy: uniform layouts, shadow projection and
//! bias scaling, draw ordering.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::batcher::{Batcher, DrawItem};
use crate::cache::BlendMode;
use crate::frame::{DescriptorKind, DescriptorLayout};
use crate::scene::{Camera, Material};

/// Descriptor set holding [`CameraUniforms`].
pub const CAMERA_SET: u32 = 0;
/// Descriptor set holding [`ObjectUniforms`].
pub const OBJECT_SET: u32 = 1;
/// Descriptor set holding material textures.
pub const MATERIAL_SET: u32 = 2;

/// Per-view uniforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniforms {
    /// View-projection matrix.
    pub view_projection: [[f32; 4]; 4],
    /// Camera world position (w unused).
    pub position: [f32; 4],
}

impl CameraUniforms {
    /// Uniforms for `camera`.
    pub fn new(camera: &Camera) -> Self {
        Self {
            view_projection: camera.view_projection().to_cols_array_2d(),
            position: camera.position.extend(1.0).to_array(),
        }
    }
}

/// Per-draw uniforms.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniforms {
    /// Model matrix.
    pub model: [[f32; 4]; 4],
    /// Material base color.
    pub base_color: [f32; 4],
}

impl ObjectUniforms {
    /// Uniforms for a batched draw.
    pub fn new(item: &DrawItem) -> Self {
        Self {
            model: item.transform.to_cols_array_2d(),
            base_color: item.material.base_color.to_array(),
        }
    }
}

/// Per-draw uniforms of a shadow caster.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShadowUniforms {
    /// Light view-projection matrix.
    pub light_view_projection: [[f32; 4]; 4],
    /// Model matrix.
    pub model: [[f32; 4]; 4],
    /// Light direction in xyz.
    pub light_direction: [f32; 4],
    /// Scaled depth bias in x, scaled normal bias in y.
    pub bias: [f32; 4],
}

impl ShadowUniforms {
    /// Uniforms for one caster.
    pub fn new(light_view_projection: Mat4, item: &DrawItem, settings: &ShadowSettings) -> Self {
        Self {
            light_view_projection: light_view_projection.to_cols_array_2d(),
            model: item.transform.to_cols_array_2d(),
            light_direction: settings.direction().extend(0.0).to_array(),
            bias: [
                settings.scaled_depth_bias(),
                settings.scaled_normal_bias(),
                0.0,
                0.0,
            ],
        }
    }
}

static_assertions::assert_eq_size!(CameraUniforms, [u8; 80]);
static_assertions::assert_eq_size!(ObjectUniforms, [u8; 80]);
static_assertions::assert_eq_size!(ShadowUniforms, [u8; 160]);

/// Directional shadow configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSettings {
    /// Shader used for shadow casters.
    pub shader: String,
    /// Direction the light travels in.
    pub light_direction: Vec3,
    /// Center of the scene bounds.
    pub center: Vec3,
    /// Radius of the scene bounds.
    pub radius: f32,
    /// Shadow map resolution in texels.
    pub resolution: u32,
    /// Depth bias in texels.
    pub depth_bias: f32,
    /// Normal bias in texels.
    pub normal_bias: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            shader: "shadow".to_string(),
            light_direction: Vec3::new(-0.4, -1.0, -0.3),
            center: Vec3::ZERO,
            radius: 50.0,
            resolution: 2048,
            depth_bias: 1.0,
            normal_bias: 1.5,
        }
    }
}

impl ShadowSettings {
    /// Normalized light direction.
    pub fn direction(&self) -> Vec3 {
        self.light_direction.try_normalize().unwrap_or(Vec3::NEG_Y)
    }

    /// Side length of the orthographic projection.
    pub fn projection_size(&self) -> f32 {
        2.0 * self.radius
    }

    /// Depth bias in world units.
    pub fn scaled_depth_bias(&self) -> f32 {
        scaled_bias(self.depth_bias, self.projection_size(), self.resolution)
    }

    /// Normal bias in world units.
    pub fn scaled_normal_bias(&self) -> f32 {
        scaled_bias(self.normal_bias, self.projection_size(), self.resolution)
    }

    /// Orthographic light view-projection covering the scene sphere.
    pub fn view_projection(&self) -> Mat4 {
        let direction = self.direction();
        let eye = self.center - direction * self.radius;
        let up = if direction.y.abs() > 0.999 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(eye, self.center, up);
        let r = self.radius;
        let projection = Mat4::orthographic_rh(-r, r, -r, r, 0.0, 2.0 * r);
        projection * view
    }
}

/// Scale a bias given in shadow-map texels to world units.
pub fn scaled_bias(bias: f32, projection_size: f32, resolution: u32) -> f32 {
    assert!(resolution > 0, "shadow map resolution must be non-zero");
    bias * projection_size / resolution as f32
}

/// Geometry in draw order: opaques unblended, then transparents blended.
pub fn geometry_draw_order(batcher: &Batcher) -> impl Iterator<Item = (&DrawItem, BlendMode)> {
    batcher
        .opaques()
        .iter()
        .map(|item| (item, BlendMode::Opaque))
        .chain(
            batcher
                .transparents()
                .iter()
                .map(|item| (item, BlendMode::Alpha)),
        )
}

/// Material texture slots: albedo, normal, metallic-roughness.
pub const MATERIAL_TEXTURE_SLOTS: u32 = 3;

/// Layout of the material texture set: a sampled binding at the slot of each
/// present texture.
pub fn material_texture_layout(material: &Material) -> DescriptorLayout {
    material
        .texture_slots()
        .iter()
        .enumerate()
        .filter(|(_, texture)| texture.is_some())
        .fold(DescriptorLayout::new(), |layout, (slot, _)| {
            layout.with(slot as u32, DescriptorKind::SampledTexture)
        })
}

/// Layout with every material texture slot bound.
pub fn full_material_texture_layout() -> DescriptorLayout {
    (0..MATERIAL_TEXTURE_SLOTS).fold(DescriptorLayout::new(), |layout, slot| {
        layout.with(slot, DescriptorKind::SampledTexture)
    })
}
