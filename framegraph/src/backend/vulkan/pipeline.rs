//! Shader module and pipeline caches.
//!
//! Every pipeline shares one layout shape: the camera uniform at set 0,
//! the object uniform at set 1 and the material textures at set 2. Shadow
//! pipelines only touch set 0.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;

use super::VulkanDevice;
use super::conversion::{convert_blend_state, convert_cull_mode, convert_texture_format};
use crate::cache::{PipelineCache, PipelineState, ShaderCache, ShaderStage, ShaderVariant};
use crate::command::full_material_texture_layout;
use crate::error::GraphicsError;
use crate::frame::DescriptorLayout;

/// Interleaved position, normal and uv.
pub const VERTEX_STRIDE: u32 = 32;

const ENTRY_POINT: &std::ffi::CStr = c"main";

type ShaderKey = (String, ShaderVariant, ShaderStage);

/// SPIR-V modules keyed by name, variant and stage.
///
/// Modules are registered up front; the frame graph never compiles shaders.
pub struct VulkanShaderCache {
    modules: HashMap<ShaderKey, vk::ShaderModule>,
    device: Arc<VulkanDevice>,
}

impl VulkanShaderCache {
    /// Create an empty cache.
    pub fn new(device: Arc<VulkanDevice>) -> Self {
        Self {
            modules: HashMap::new(),
            device,
        }
    }

    /// Create a module from SPIR-V words, replacing any previous one.
    pub fn register(
        &mut self,
        name: &str,
        variant: &ShaderVariant,
        stage: ShaderStage,
        spirv: &[u32],
    ) -> Result<vk::ShaderModule, GraphicsError> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(spirv);
        let module = unsafe { self.device.raw().create_shader_module(&create_info, None) }
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create shader module '{}': {:?}",
                    name, e
                ))
            })?;

        let key = (name.to_string(), variant.clone(), stage);
        if let Some(old) = self.modules.insert(key, module) {
            unsafe { self.device.raw().destroy_shader_module(old, None) };
        }
        log::debug!("Registered shader '{}' ({}, {:?})", name, variant, stage);
        Ok(module)
    }

    /// Number of registered modules.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}

impl ShaderCache for VulkanShaderCache {
    type Shader = vk::ShaderModule;

    fn get(
        &mut self,
        name: &str,
        variant: &ShaderVariant,
        stages: &[ShaderStage],
    ) -> Result<Vec<vk::ShaderModule>, GraphicsError> {
        stages
            .iter()
            .map(|&stage| {
                self.modules
                    .get(&(name.to_string(), variant.clone(), stage))
                    .copied()
                    .ok_or_else(|| {
                        GraphicsError::MissingCollaborator(format!(
                            "shader '{}' ({}, {:?})",
                            name, variant, stage
                        ))
                    })
            })
            .collect()
    }
}

impl Drop for VulkanShaderCache {
    fn drop(&mut self) {
        for (_, module) in self.modules.drain() {
            unsafe { self.device.raw().destroy_shader_module(module, None) };
        }
    }
}

/// Pipeline layouts and graphics pipelines.
pub struct VulkanPipelineCache {
    layouts: HashMap<Vec<vk::ShaderModule>, vk::PipelineLayout>,
    pipelines: HashMap<(vk::PipelineLayout, Vec<vk::ShaderModule>, PipelineState), vk::Pipeline>,
    device: Arc<VulkanDevice>,
}

impl VulkanPipelineCache {
    /// Create an empty cache.
    pub fn new(device: Arc<VulkanDevice>) -> Self {
        Self {
            layouts: HashMap::new(),
            pipelines: HashMap::new(),
            device,
        }
    }

    /// Descriptor layouts of sets 0, 1 and 2.
    pub fn set_layouts() -> [DescriptorLayout; 3] {
        [
            DescriptorLayout::uniform(0),
            DescriptorLayout::uniform(0),
            full_material_texture_layout(),
        ]
    }

    /// Number of cached pipelines.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn create_pipeline(
        &self,
        layout: vk::PipelineLayout,
        shaders: &[vk::ShaderModule],
        state: &PipelineState,
    ) -> Result<vk::Pipeline, GraphicsError> {
        let [vertex, fragment @ ..] = shaders else {
            return Err(GraphicsError::InvalidParameter(
                "pipeline needs a vertex shader".to_string(),
            ));
        };

        let mut shader_stages = vec![
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(*vertex)
                .name(ENTRY_POINT),
        ];
        if let Some(fragment) = fragment.first() {
            shader_stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(*fragment)
                    .name(ENTRY_POINT),
            );
        }

        let binding_descriptions = [vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(VERTEX_STRIDE)
            .input_rate(vk::VertexInputRate::VERTEX)];
        let attribute_descriptions = [
            (0, vk::Format::R32G32B32_SFLOAT, 0),
            (1, vk::Format::R32G32B32_SFLOAT, 12),
            (2, vk::Format::R32G32_SFLOAT, 24),
        ]
        .map(|(location, format, offset)| {
            vk::VertexInputAttributeDescription::default()
                .location(location)
                .binding(0)
                .format(format)
                .offset(offset)
        });

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        // Clockwise front face compensates for the Y-flipped viewport.
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(convert_cull_mode(state.cull))
            .front_face(vk::FrontFace::CLOCKWISE);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(state.depth_test)
            .depth_write_enable(state.depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

        let color_blend_attachments: Vec<_> = state
            .color_format
            .iter()
            .map(|_| convert_blend_state(state.blend))
            .collect();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_attachment_formats: Vec<vk::Format> = state
            .color_format
            .into_iter()
            .map(convert_texture_format)
            .collect();
        let depth_attachment_format = state
            .depth_format
            .map_or(vk::Format::UNDEFINED, convert_texture_format);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_attachment_formats)
            .depth_attachment_format(depth_attachment_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            self.device.raw().create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }
        .map_err(|(_, e)| {
            GraphicsError::ResourceCreationFailed(format!(
                "Failed to create graphics pipeline: {:?}",
                e
            ))
        })?;

        pipelines.first().copied().ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("No pipeline returned".to_string())
        })
    }
}

impl PipelineCache for VulkanPipelineCache {
    type Shader = vk::ShaderModule;
    type Layout = vk::PipelineLayout;
    type Pipeline = vk::Pipeline;

    fn request_pipeline_layout(
        &mut self,
        shaders: &[vk::ShaderModule],
    ) -> Result<vk::PipelineLayout, GraphicsError> {
        if let Some(&layout) = self.layouts.get(shaders) {
            return Ok(layout);
        }

        let set_layouts = Self::set_layouts()
            .iter()
            .map(|layout| self.device.set_layout(layout))
            .collect::<Result<Vec<_>, _>>()?;
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);

        let layout = unsafe { self.device.raw().create_pipeline_layout(&create_info, None) }
            .map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to create pipeline layout: {:?}",
                    e
                ))
            })?;
        self.layouts.insert(shaders.to_vec(), layout);
        Ok(layout)
    }

    fn request_pipeline(
        &mut self,
        layout: vk::PipelineLayout,
        shaders: &[vk::ShaderModule],
        state: &PipelineState,
    ) -> Result<vk::Pipeline, GraphicsError> {
        let key = (layout, shaders.to_vec(), *state);
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }

        let pipeline = self.create_pipeline(layout, shaders, state)?;
        log::debug!(
            "Created pipeline {:?} for state {:016x}",
            pipeline,
            state.content_hash()
        );
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }
}

impl Drop for VulkanPipelineCache {
    fn drop(&mut self) {
        let raw = self.device.raw();
        unsafe {
            for (_, pipeline) in self.pipelines.drain() {
                raw.destroy_pipeline(pipeline, None);
            }
            for (_, layout) in self.layouts.drain() {
                raw.destroy_pipeline_layout(layout, None);
            }
        }
    }
}
