use std::collections::{HashMap, HashSet};

use crate::cache::{PipelineCache, PipelineState, ShaderCache, ShaderStage, ShaderVariant};
use crate::error::GraphicsError;

/// Shader cache over a set of registered shader names.
///
/// Each distinct `(name, variant, stage)` key is "compiled" once and keeps
/// its handle for the cache's lifetime.
#[derive(Debug, Default)]
pub struct DummyShaderCache {
    sources: HashSet<String>,
    modules: HashMap<(String, ShaderVariant, ShaderStage), u64>,
}

impl DummyShaderCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shader source under `name`.
    pub fn with_shader(mut self, name: &str) -> Self {
        self.sources.insert(name.to_string());
        self
    }

    /// Number of compiled modules.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

impl ShaderCache for DummyShaderCache {
    type Shader = u64;

    fn get(
        &mut self,
        name: &str,
        variant: &ShaderVariant,
        stages: &[ShaderStage],
    ) -> Result<Vec<u64>, GraphicsError> {
        if !self.sources.contains(name) {
            return Err(GraphicsError::MissingCollaborator(format!("shader '{name}'")));
        }

        let mut shaders = Vec::with_capacity(stages.len());
        for stage in stages {
            let next = self.modules.len() as u64 + 1;
            let key = (name.to_string(), variant.clone(), *stage);
            let module = *self.modules.entry(key).or_insert_with(|| {
                log::debug!("DummyShaderCache: compiled {name} [{variant}] {stage:?}");
                next
            });
            shaders.push(module);
        }
        Ok(shaders)
    }
}

/// Content-addressed pipeline layout and pipeline cache.
#[derive(Debug, Default)]
pub struct DummyPipelineCache {
    layouts: HashMap<Vec<u64>, u64>,
    pipelines: HashMap<(u64, Vec<u64>, PipelineState), u64>,
}

impl DummyPipelineCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct layouts created.
    pub fn layout_count(&self) -> usize {
        self.layouts.len()
    }

    /// Number of distinct pipelines created.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

impl PipelineCache for DummyPipelineCache {
    type Shader = u64;
    type Layout = u64;
    type Pipeline = u64;

    fn request_pipeline_layout(&mut self, shaders: &[u64]) -> Result<u64, GraphicsError> {
        let next = self.layouts.len() as u64 + 1;
        Ok(*self.layouts.entry(shaders.to_vec()).or_insert(next))
    }

    fn request_pipeline(
        &mut self,
        layout: u64,
        shaders: &[u64],
        state: &PipelineState,
    ) -> Result<u64, GraphicsError> {
        let next = self.pipelines.len() as u64 + 1;
        let key = (layout, shaders.to_vec(), *state);
        Ok(*self.pipelines.entry(key).or_insert_with(|| {
            log::debug!(
                "DummyPipelineCache: pipeline {next} for state {:016x}",
                state.content_hash()
            );
            next
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureFormat;

    const STAGES: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Fragment];

    #[test]
    fn test_same_key_returns_same_shaders() {
        let mut cache = DummyShaderCache::new().with_shader("pbr");
        let variant = ShaderVariant::new().with_define("NORMAL_MAP");
        let first = cache.get("pbr", &variant, &STAGES).unwrap();
        let second = cache.get("pbr", &variant, &STAGES).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.module_count(), 2);

        let other = cache.get("pbr", &ShaderVariant::new(), &STAGES).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn test_unknown_shader_is_missing() {
        let mut cache = DummyShaderCache::new();
        assert!(matches!(
            cache.get("pbr", &ShaderVariant::new(), &STAGES),
            Err(GraphicsError::MissingCollaborator(_))
        ));
    }

    #[test]
    fn test_pipelines_are_content_addressed() {
        let mut cache = DummyPipelineCache::new();
        let layout = cache.request_pipeline_layout(&[1, 2]).unwrap();
        assert_eq!(cache.request_pipeline_layout(&[1, 2]).unwrap(), layout);

        let opaque = PipelineState::opaque(TextureFormat::Rgba8Unorm, None);
        let blended = PipelineState::transparent(TextureFormat::Rgba8Unorm, None);
        let a = cache.request_pipeline(layout, &[1, 2], &opaque).unwrap();
        let b = cache.request_pipeline(layout, &[1, 2], &opaque).unwrap();
        let c = cache.request_pipeline(layout, &[1, 2], &blended).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(cache.pipeline_count(), 2);
    }
}
