use raster::{PixelBuffer, BYTES_PER_PIXEL};

use crate::error::FilterError;
use crate::timing::{timed, Phase, PhaseTimer};
use crate::types::ShaderValidation;
use crate::uniforms::ShaderUniform;

use super::context::GpuContext;
use super::model::QuadModel;
use super::program::{ProgramLayouts, ShaderProgram};
use super::target::RenderTarget;

/// Everything needed to draw one fragment shader over one source image.
///
/// Built once per [`GpuFilterPipeline::apply_shader`] call, or once per
/// animation, after which [`FilterSession::render`] can run any number of
/// times with different uniform values.
///
/// [`GpuFilterPipeline::apply_shader`]: crate::GpuFilterPipeline::apply_shader
pub(crate) struct FilterSession {
    context: GpuContext,
    validation: ShaderValidation,
    model: QuadModel,
    program: ShaderProgram,
    params: wgpu::Buffer,
    transform_group: wgpu::BindGroup,
    source_group: wgpu::BindGroup,
    target: RenderTarget,
}

impl FilterSession {
    pub fn prepare(
        context: &GpuContext,
        source: &PixelBuffer,
        fragment: &str,
        validation: ShaderValidation,
        timer: &mut dyn PhaseTimer,
    ) -> Result<Self, FilterError> {
        let (width, height) = source.dimensions();
        if width == 0 || height == 0 {
            return Err(FilterError::invalid("source image has no pixels"));
        }
        let max = context.max_texture_dimension();
        if width > max || height > max {
            return Err(FilterError::invalid(format!(
                "{width}x{height} exceeds the adapter's {max}px texture limit"
            )));
        }

        let device = context.device();
        let (model, layouts) = timed(timer, Phase::ModelBuild, || {
            (QuadModel::new(device), ProgramLayouts::new(device))
        });
        let mut program = timed(timer, Phase::ProgramCompile, || {
            ShaderProgram::compile(device, &layouts, fragment, validation)
        })?;
        let (source_view, sampler) = timed(timer, Phase::TextureUpload, || {
            upload_source(context, source)
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("filter params"),
            size: program.uniforms.layout().buffer_size(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let transform_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("transform bind group"),
            layout: &layouts.transform,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: model.transform.as_entire_binding(),
            }],
        });
        let source_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("source bind group"),
            layout: &layouts.source,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: crate::compile::TEXTURE_BINDING,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: crate::compile::SAMPLER_BINDING,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: crate::compile::PARAMS_BINDING,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        // Shaders that declare these get the scene size for free; a declared
        // type that disagrees is never an error.
        program.dispatch(
            &[
                ShaderUniform::one_f("uSceneWidth", width as f32),
                ShaderUniform::one_f("uSceneHeight", height as f32),
                ShaderUniform::one_i("uSampler", 0),
            ],
            ShaderValidation::Permissive,
        )?;

        let target = RenderTarget::new(device, width, height);

        Ok(Self {
            context: context.clone(),
            validation,
            model,
            program,
            params,
            transform_group,
            source_group,
            target,
        })
    }

    pub fn is_linked(&self) -> bool {
        self.program.is_linked()
    }

    pub fn stage(&mut self, uniforms: &[ShaderUniform]) -> Result<(), FilterError> {
        self.program.dispatch(uniforms, self.validation)
    }

    /// Draws the quad with the staged uniforms and reads the frame back.
    ///
    /// When the program failed to link the frame is fully transparent, which
    /// composites as a no-op.
    pub fn render(&self, timer: &mut dyn PhaseTimer) -> Result<PixelBuffer, FilterError> {
        let device = self.context.device();
        let queue = self.context.queue();

        timed(timer, Phase::Draw, || {
            queue.write_buffer(&self.params, 0, self.program.uniforms.as_bytes());

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("filter encoder"),
            });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("filter pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &self.target.view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                if let Some(pipeline) = &self.program.pipeline {
                    pass.set_pipeline(pipeline);
                    pass.set_bind_group(0, &self.transform_group, &[]);
                    pass.set_bind_group(1, &self.source_group, &[]);
                    self.model.draw(&mut pass);
                }
            }
            self.target.encode_copy(&mut encoder);
            queue.submit(Some(encoder.finish()));
        });

        timed(timer, Phase::Readback, || self.target.read_back(device))
    }
}

fn upload_source(context: &GpuContext, source: &PixelBuffer) -> (wgpu::TextureView, wgpu::Sampler) {
    let device = context.device();
    let size = wgpu::Extent3d {
        width: source.width(),
        height: source.height(),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("filter source"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    context.queue().write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        source.as_bytes(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(source.width() * BYTES_PER_PIXEL as u32),
            rows_per_image: Some(source.height()),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Non-power-of-two sources are the norm, so no mipmaps and no wrapping.
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("filter source sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    (view, sampler)
}
