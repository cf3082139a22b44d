use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::compile::{
    parse_fragment, wrap_fragment, PARAMS_BINDING, SAMPLER_BINDING, TEXTURE_BINDING,
    VERTEX_SHADER_GLSL,
};
use crate::error::FilterError;
use crate::types::ShaderValidation;
use crate::uniforms::{Assignment, ShaderUniform, UniformBlock};

use super::model::QuadModel;
use super::target::TARGET_FORMAT;

/// Bind group layouts shared by the vertex and fragment stages.
pub(crate) struct ProgramLayouts {
    /// Set 0: model-view and projection matrices.
    pub transform: wgpu::BindGroupLayout,
    /// Set 1: source texture, its sampler, and the filter parameter block.
    pub source: wgpu::BindGroupLayout,
}

impl ProgramLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let transform = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("transform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let source = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("source layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: TEXTURE_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: SAMPLER_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: PARAMS_BINDING,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        Self { transform, source }
    }
}

/// A compiled filter program and the uniform values staged for its next draw.
///
/// `pipeline` is `None` when compilation failed under
/// [`ShaderValidation::Permissive`]; drawing is then skipped.
pub(crate) struct ShaderProgram {
    pub pipeline: Option<wgpu::RenderPipeline>,
    pub uniforms: UniformBlock,
}

impl ShaderProgram {
    pub fn compile(
        device: &wgpu::Device,
        layouts: &ProgramLayouts,
        fragment: &str,
        validation: ShaderValidation,
    ) -> Result<Self, FilterError> {
        let wrapped = wrap_fragment(fragment);
        let uniforms = UniformBlock::new(wrapped.layout.clone());

        let pipeline = match build_pipeline(device, layouts, &wrapped.source) {
            Ok(pipeline) => Some(pipeline),
            Err(message) => match validation {
                ShaderValidation::Strict => return Err(FilterError::ShaderCompile(message)),
                ShaderValidation::Permissive => {
                    tracing::warn!(error = %message, "fragment shader failed; filter skipped");
                    None
                }
            },
        };

        Ok(Self { pipeline, uniforms })
    }

    pub fn is_linked(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Resolves each uniform by name and stages its value.
    ///
    /// Unknown names are ignored. Type mismatches are logged, or rejected up
    /// front under strict validation so nothing is staged from a bad batch.
    pub fn dispatch(
        &mut self,
        uniforms: &[ShaderUniform],
        validation: ShaderValidation,
    ) -> Result<(), FilterError> {
        if validation == ShaderValidation::Strict {
            for uniform in uniforms {
                if let Assignment::TypeMismatch { declared } = self.uniforms.check(uniform) {
                    return Err(FilterError::invalid(format!(
                        "uniform '{}' is declared as {declared}, got {}",
                        uniform.name(),
                        uniform.kind()
                    )));
                }
            }
        }

        for uniform in uniforms {
            match self.uniforms.assign(uniform) {
                Assignment::Written => {}
                Assignment::Sampler => {
                    if let ShaderUniform::OneI { x, .. } = uniform {
                        if *x != 0 {
                            tracing::warn!(
                                uniform = uniform.name(),
                                unit = *x,
                                "only texture unit 0 is bound; sampler reads the source image"
                            );
                        }
                    }
                }
                Assignment::Unresolved => {
                    tracing::trace!(uniform = uniform.name(), "uniform not used by shader");
                }
                Assignment::TypeMismatch { declared } => {
                    tracing::warn!(
                        uniform = uniform.name(),
                        declared = %declared,
                        supplied = %uniform.kind(),
                        "uniform type mismatch; value ignored"
                    );
                }
            }
        }
        Ok(())
    }
}

/// Compiles both stages and links the pipeline inside a validation error
/// scope, so a bad shader becomes an error message rather than a device panic.
fn build_pipeline(
    device: &wgpu::Device,
    layouts: &ProgramLayouts,
    wrapped_fragment: &str,
) -> Result<wgpu::RenderPipeline, String> {
    parse_fragment(wrapped_fragment)?;

    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("imgfx vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    });
    let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("imgfx fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrapped_fragment.to_owned()),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("filter pipeline layout"),
        bind_group_layouts: &[&layouts.transform, &layouts.source],
        push_constant_ranges: &[],
    });

    let vertex_buffers = QuadModel::vertex_layouts();
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("filter pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex_module,
            entry_point: Some("main"),
            buffers: &vertex_buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: Some(wgpu::IndexFormat::Uint16),
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &fragment_module,
            entry_point: Some("main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });

    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(error.to_string()),
        None => Ok(pipeline),
    }
}
