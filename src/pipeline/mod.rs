//! Fixed graphics pipeline for the mesh draw
//!
//! The pipeline state is a contract, not a tunable: triangle lists, back-face
//! culling with counter-clockwise front faces, less-than depth testing with
//! writes, blending disabled and dynamic viewport/scissor. Only the vertex
//! input layout depends on the mesh.

use std::ffi::CStr;

use ash::vk;

use crate::backend::{conversion, GpuDevice, GraphicsPipelineDesc};
use crate::error::PipelineCreationError;
use crate::mesh::{AttributeFormat, MeshData};
use crate::shader::CompiledShaders;

/// Vertex shader entry point.
pub const VERTEX_ENTRY: &CStr = c"vs_main";
/// Fragment shader entry point.
pub const FRAGMENT_ENTRY: &CStr = c"fs_main";

/// Set 0, binding 0: the per-image uniform block.
pub const UNIFORM_BINDING: u32 = 0;

/// Complete fixed-function state of the graphics pipeline.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub vertex_entry: &'static CStr,
    pub fragment_entry: &'static CStr,
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub depth_bias: bool,
    pub samples: vk::SampleCountFlags,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    pub depth_bounds_test: bool,
    pub stencil_test: bool,
    pub color_blend: vk::PipelineColorBlendAttachmentState,
    pub logic_op_enable: bool,
    pub logic_op: vk::LogicOp,
    pub dynamic_states: Vec<vk::DynamicState>,
}

/// Assembles [`PipelineState`] from the mesh's vertex streams.
///
/// Attribute `i` gets binding `i` and location `i`, read per vertex at
/// offset 0 of its binding. The binding stride is the source stride of the
/// stream, not the packed element size.
#[derive(Debug, Default)]
pub struct PipelineStateBuilder {
    inputs: Vec<(AttributeFormat, u32)>,
}

impl PipelineStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with one vertex input per attribute stream of `mesh`.
    pub fn for_mesh(mesh: &MeshData) -> Self {
        mesh.attributes.iter().fold(Self::new(), |builder, stream| {
            builder.vertex_input(stream.format(), stream.stride())
        })
    }

    /// Append a vertex input at the next binding/location.
    pub fn vertex_input(mut self, format: AttributeFormat, stride: u32) -> Self {
        self.inputs.push((format, stride));
        self
    }

    pub fn build(self) -> PipelineState {
        let bindings = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, &(_, stride))| vk::VertexInputBindingDescription {
                binding: i as u32,
                stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();

        let attributes = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, &(format, _))| vk::VertexInputAttributeDescription {
                location: i as u32,
                binding: i as u32,
                format: conversion::vertex_format(format),
                offset: 0,
            })
            .collect();

        PipelineState {
            vertex_entry: VERTEX_ENTRY,
            fragment_entry: FRAGMENT_ENTRY,
            bindings,
            attributes,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
            depth_bias: false,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            depth_bounds_test: false,
            stencil_test: false,
            color_blend: vk::PipelineColorBlendAttachmentState {
                blend_enable: vk::FALSE,
                src_color_blend_factor: vk::BlendFactor::SRC_COLOR,
                dst_color_blend_factor: vk::BlendFactor::DST_COLOR,
                color_blend_op: vk::BlendOp::ADD,
                src_alpha_blend_factor: vk::BlendFactor::SRC_ALPHA,
                dst_alpha_blend_factor: vk::BlendFactor::DST_ALPHA,
                alpha_blend_op: vk::BlendOp::ADD,
                color_write_mask: vk::ColorComponentFlags::RGBA,
            },
            logic_op_enable: false,
            logic_op: vk::LogicOp::COPY,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}

/// Create the layout of descriptor set 0: one uniform buffer visible to the
/// vertex and fragment stages.
pub fn create_uniform_set_layout<D: GpuDevice + ?Sized>(
    device: &D,
) -> Result<vk::DescriptorSetLayout, PipelineCreationError> {
    let bindings = [vk::DescriptorSetLayoutBinding {
        binding: UNIFORM_BINDING,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        ..Default::default()
    }];
    device
        .create_descriptor_set_layout(&bindings)
        .map_err(PipelineCreationError::DescriptorSetLayout)
}

/// Pipeline object with its layout and shader modules.
#[derive(Debug)]
pub struct PipelineResources {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    vertex_module: vk::ShaderModule,
    fragment_module: vk::ShaderModule,
}

impl PipelineResources {
    /// Create shader modules, the pipeline layout and the pipeline.
    ///
    /// Anything created before a failure is destroyed before the error is
    /// returned.
    pub fn create<D: GpuDevice + ?Sized>(
        device: &D,
        shaders: &CompiledShaders,
        state: &PipelineState,
        set_layout: vk::DescriptorSetLayout,
        render_pass: vk::RenderPass,
    ) -> Result<Self, PipelineCreationError> {
        let vertex_module = device
            .create_shader_module(&shaders.vertex)
            .map_err(|result| PipelineCreationError::ShaderModule {
                stage: "vertex",
                result,
            })?;

        let fragment_module = match device.create_shader_module(&shaders.fragment) {
            Ok(module) => module,
            Err(result) => {
                device.destroy_shader_module(vertex_module);
                return Err(PipelineCreationError::ShaderModule {
                    stage: "fragment",
                    result,
                });
            }
        };

        let layout = match device.create_pipeline_layout(&[set_layout]) {
            Ok(layout) => layout,
            Err(result) => {
                device.destroy_shader_module(fragment_module);
                device.destroy_shader_module(vertex_module);
                return Err(PipelineCreationError::PipelineLayout(result));
            }
        };

        let desc = GraphicsPipelineDesc {
            state,
            vertex_module,
            fragment_module,
            layout,
            render_pass,
        };
        let pipeline = match device.create_graphics_pipeline(&desc) {
            Ok(pipeline) => pipeline,
            Err(result) => {
                device.destroy_pipeline_layout(layout);
                device.destroy_shader_module(fragment_module);
                device.destroy_shader_module(vertex_module);
                return Err(PipelineCreationError::GraphicsPipeline(result));
            }
        };

        log::debug!(
            "Created graphics pipeline {:?} with {} vertex bindings",
            pipeline,
            state.bindings.len()
        );

        Ok(Self {
            pipeline,
            layout,
            vertex_module,
            fragment_module,
        })
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Destroy the pipeline, its layout and both shader modules. The device
    /// must be idle.
    pub fn destroy<D: GpuDevice + ?Sized>(self, device: &D) {
        device.destroy_pipeline(self.pipeline);
        device.destroy_pipeline_layout(self.layout);
        device.destroy_shader_module(self.vertex_module);
        device.destroy_shader_module(self.fragment_module);
    }
}
