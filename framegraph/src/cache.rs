//! Interfaces of the long-lived shader and pipeline caches.
//!
//! Both caches live outside the frame graph and are shared across frames.
//! Lookups are content addressed: the same name, variant and stage set, or
//! the same shader set and [`PipelineState`], must return the same object.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::GraphicsError;
use crate::types::TextureFormat;

/// Shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex stage.
    Vertex,
    /// Fragment stage.
    Fragment,
    /// Compute stage.
    Compute,
}

/// Preprocessor defines selecting a shader permutation.
///
/// Defines are kept sorted so that insertion order does not change the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderVariant {
    defines: Vec<String>,
}

impl ShaderVariant {
    /// Create the default variant.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a define.
    pub fn with_define(mut self, define: impl Into<String>) -> Self {
        let define = define.into();
        if let Err(position) = self.defines.binary_search(&define) {
            self.defines.insert(position, define);
        }
        self
    }

    /// Sorted defines.
    pub fn defines(&self) -> &[String] {
        &self.defines
    }
}

impl fmt::Display for ShaderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.defines.is_empty() {
            write!(f, "default")
        } else {
            write!(f, "{}", self.defines.join("+"))
        }
    }
}

/// Color blending of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending.
    #[default]
    Opaque,
    /// Straight alpha blending (`src * a + dst * (1 - a)`).
    Alpha,
}

/// Face culling of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both faces.
    None,
    /// Cull back faces.
    #[default]
    Back,
    /// Cull front faces.
    Front,
}

/// Fixed-function state a pipeline is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    /// Color blending.
    pub blend: BlendMode,
    /// Face culling.
    pub cull: CullMode,
    /// Whether depth testing is enabled.
    pub depth_test: bool,
    /// Whether depth writes are enabled.
    pub depth_write: bool,
    /// Color attachment format, if any.
    pub color_format: Option<TextureFormat>,
    /// Depth attachment format, if any.
    pub depth_format: Option<TextureFormat>,
}

impl PipelineState {
    /// Depth-tested, depth-writing opaque geometry.
    pub fn opaque(color_format: TextureFormat, depth_format: Option<TextureFormat>) -> Self {
        Self {
            blend: BlendMode::Opaque,
            cull: CullMode::Back,
            depth_test: depth_format.is_some(),
            depth_write: depth_format.is_some(),
            color_format: Some(color_format),
            depth_format,
        }
    }

    /// Alpha-blended geometry: depth tested, no depth writes, both faces.
    pub fn transparent(color_format: TextureFormat, depth_format: Option<TextureFormat>) -> Self {
        Self {
            blend: BlendMode::Alpha,
            cull: CullMode::None,
            depth_write: false,
            ..Self::opaque(color_format, depth_format)
        }
    }

    /// Depth-only shadow caster, culling front faces.
    pub fn shadow(depth_format: TextureFormat) -> Self {
        Self {
            blend: BlendMode::Opaque,
            cull: CullMode::Front,
            depth_test: true,
            depth_write: true,
            color_format: None,
            depth_format: Some(depth_format),
        }
    }

    /// Content hash used as the cache key.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Compiled shader lookup.
pub trait ShaderCache {
    /// Backend shader handle.
    type Shader: Copy + Eq + Hash + fmt::Debug;

    /// One shader per requested stage, in request order.
    fn get(
        &mut self,
        name: &str,
        variant: &ShaderVariant,
        stages: &[ShaderStage],
    ) -> Result<Vec<Self::Shader>, GraphicsError>;
}

/// Pipeline layout and pipeline lookup.
pub trait PipelineCache {
    /// Backend shader handle.
    type Shader: Copy + Eq + Hash + fmt::Debug;
    /// Backend pipeline layout handle.
    type Layout: Copy + fmt::Debug;
    /// Backend pipeline handle.
    type Pipeline: Copy + fmt::Debug;

    /// Layout for the shader set.
    fn request_pipeline_layout(
        &mut self,
        shaders: &[Self::Shader],
    ) -> Result<Self::Layout, GraphicsError>;

    /// Pipeline for the shader set and fixed-function state.
    fn request_pipeline(
        &mut self,
        layout: Self::Layout,
        shaders: &[Self::Shader],
        state: &PipelineState,
    ) -> Result<Self::Pipeline, GraphicsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_is_order_independent() {
        let a = ShaderVariant::new().with_define("SHADOWS").with_define("NORMAL_MAP");
        let b = ShaderVariant::new()
            .with_define("NORMAL_MAP")
            .with_define("SHADOWS")
            .with_define("SHADOWS");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "NORMAL_MAP+SHADOWS");
        assert_eq!(ShaderVariant::new().to_string(), "default");
    }

    #[test]
    fn test_pipeline_state_hash_is_content_based() {
        let opaque = PipelineState::opaque(TextureFormat::Rgba16Float, Some(TextureFormat::Depth32Float));
        let again = PipelineState::opaque(TextureFormat::Rgba16Float, Some(TextureFormat::Depth32Float));
        let blended =
            PipelineState::transparent(TextureFormat::Rgba16Float, Some(TextureFormat::Depth32Float));
        assert_eq!(opaque.content_hash(), again.content_hash());
        assert_ne!(opaque.content_hash(), blended.content_hash());
        assert!(!blended.depth_write);
        assert!(blended.depth_test);
    }
}
