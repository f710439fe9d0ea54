use std::collections::HashMap;

use crate::backend::{
    BackendError, BlendMode, FullscreenDraw, LoadAction, ProgramDesc, ProgramId, RenderBackend,
    SurfaceDesc, SurfaceFormat, SurfaceId, TextureSlots,
};
use crate::shaders;
use crate::uniforms::PassUniforms;

use super::context::GpuContext;
use super::readback;

/// Uniform blocks the ring holds before recorded work has to be submitted.
const UNIFORM_RING_SLOTS: u64 = 256;

struct GpuSurface {
    desc: SurfaceDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuProgram {
    label: String,
    pipeline: wgpu::RenderPipeline,
    format: SurfaceFormat,
}

type BindKey = [Option<SurfaceId>; 3];

/// [`RenderBackend`] on top of `wgpu`.
///
/// Draws are recorded into one command encoder and submitted on [`flush`],
/// on readback, or when the uniform ring runs out of slots. Every program
/// shares one bind group layout, so bind groups are cached by the surfaces
/// they reference.
///
/// [`flush`]: WgpuBackend::flush
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    placeholder: wgpu::TextureView,
    uniform_buffer: wgpu::Buffer,
    uniform_stride: u64,
    uniform_cursor: u64,
    encoder: Option<wgpu::CommandEncoder>,
    surfaces: HashMap<SurfaceId, GpuSurface>,
    programs: HashMap<ProgramId, GpuProgram>,
    bind_groups: HashMap<BindKey, wgpu::BindGroup>,
    present_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    next_id: u64,
}

impl WgpuBackend {
    pub fn new(context: &GpuContext) -> Self {
        let device = context.device.clone();
        let queue = context.queue.clone();

        let block = std::mem::size_of::<PassUniforms>() as u64;
        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment).max(1);
        let uniform_stride = block.div_ceil(alignment) * alignment;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("feedback layout"),
            entries: &layout_entries(block),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("feedback pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("feedback uniform ring"),
            size: uniform_stride * UNIFORM_RING_SLOTS,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let linear_sampler = sampler(&device, "linear sampler", wgpu::FilterMode::Linear);
        let nearest_sampler = sampler(&device, "nearest sampler", wgpu::FilterMode::Nearest);
        let placeholder = placeholder_view(&device, &queue);

        Self {
            device,
            queue,
            layout,
            pipeline_layout,
            linear_sampler,
            nearest_sampler,
            placeholder,
            uniform_buffer,
            uniform_stride,
            uniform_cursor: 0,
            encoder: None,
            surfaces: HashMap::new(),
            programs: HashMap::new(),
            bind_groups: HashMap::new(),
            present_pipelines: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Submits all recorded work.
    pub fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        // Slots written after this point belong to the next submission, and
        // queue writes are ordered after everything already submitted, so
        // the ring can start over.
        self.uniform_cursor = 0;
    }

    /// Composites `source` over an opaque `background` into an external view
    /// (the swapchain) and submits. `None` presents the background alone.
    pub fn present(
        &mut self,
        source: Option<SurfaceId>,
        view: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        background: [f32; 3],
    ) -> Result<(), BackendError> {
        if let Some(id) = source {
            if !self.surfaces.contains_key(&id) {
                return Err(BackendError::UnknownSurface(id));
            }
        }
        if !self.present_pipelines.contains_key(&format) {
            let pipeline = self.build_pipeline(
                "present",
                &shaders::compose(shaders::COMPOSITE),
                format,
                BlendMode::Replace,
            )?;
            self.present_pipelines.insert(format, pipeline);
        }

        let mut uniforms: PassUniforms = bytemuck::Zeroable::zeroed();
        uniforms.params[0] = [background[0], background[1], background[2], 1.0];
        let offset = self.push_uniforms(uniforms.as_bytes())?;
        let textures = TextureSlots {
            previous_pass_this_frame: source,
            ..TextureSlots::default()
        };
        self.ensure_bind_group(textures);

        let key = bind_key(&textures);
        let (Some(pipeline), Some(bind_group)) =
            (self.present_pipelines.get(&format), self.bind_groups.get(&key))
        else {
            return Err(BackendError::Compile {
                label: "present".into(),
                reason: "pipeline missing after creation".into(),
            });
        };
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("feedback frame encoder"),
                })
        });
        {
            let mut pass = begin_pass(
                encoder,
                "present",
                view,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[offset]);
            pass.draw(0..3, 0..1);
        }
        self.flush();
        Ok(())
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("feedback frame encoder"),
            })
        })
    }

    /// Stages `bytes` in the next ring slot and returns its dynamic offset.
    fn push_uniforms(&mut self, bytes: &[u8]) -> Result<u32, BackendError> {
        if bytes.len() as u64 > self.uniform_stride {
            return Err(BackendError::UniformSize {
                actual: bytes.len(),
                limit: self.uniform_stride as usize,
            });
        }
        // Every recorded draw still references its slot; submit them before
        // any slot is overwritten.
        if self.uniform_cursor >= UNIFORM_RING_SLOTS {
            self.flush();
        }
        let offset = self.uniform_cursor * self.uniform_stride;
        // pad short blocks so the bound range is always fully initialised
        let mut block = vec![0u8; std::mem::size_of::<PassUniforms>().max(bytes.len())];
        block[..bytes.len()].copy_from_slice(bytes);
        self.queue.write_buffer(&self.uniform_buffer, offset, &block);
        self.uniform_cursor += 1;
        Ok(offset as u32)
    }

    fn ensure_bind_group(&mut self, textures: TextureSlots) {
        let key = bind_key(&textures);
        if self.bind_groups.contains_key(&key) {
            return;
        }
        let block = std::mem::size_of::<PassUniforms>() as u64;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("feedback bind group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.uniform_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(block),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.nearest_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(self.slot_view(
                        textures.previous_pass_this_frame,
                    )),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(self.slot_view(
                        textures.this_pass_previous_frame,
                    )),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(self.slot_view(textures.aux)),
                },
            ],
        });
        self.bind_groups.insert(key, bind_group);
    }

    fn build_pipeline(
        &self,
        label: &str,
        source: &str,
        format: wgpu::TextureFormat,
        blend: BlendMode,
    ) -> Result<wgpu::RenderPipeline, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: blend_state(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            });
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(BackendError::Compile {
                label: label.to_string(),
                reason: err.to_string(),
            }),
            None => Ok(pipeline),
        }
    }

    fn slot_view(&self, slot: Option<SurfaceId>) -> &wgpu::TextureView {
        slot.and_then(|id| self.surfaces.get(&id))
            .map(|surface| &surface.view)
            .unwrap_or(&self.placeholder)
    }

    fn surface(&self, id: SurfaceId) -> Result<&GpuSurface, BackendError> {
        self.surfaces.get(&id).ok_or(BackendError::UnknownSurface(id))
    }
}

impl RenderBackend for WgpuBackend {
    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId, BackendError> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(BackendError::Allocation {
                what: desc.label.clone(),
                reason: format!(
                    "{}x{} is outside 1..={max} per axis",
                    desc.width, desc.height
                ),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let validation = pollster::block_on(self.device.pop_error_scope());
        let memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = validation.or(memory) {
            return Err(BackendError::Allocation {
                what: desc.label.clone(),
                reason: err.to_string(),
            });
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = SurfaceId(self.next());
        tracing::trace!(%id, label = %desc.label, width = desc.width, height = desc.height, "created surface");
        self.surfaces.insert(
            id,
            GpuSurface {
                desc: desc.clone(),
                texture,
                view,
            },
        );
        Ok(id)
    }

    fn release_surface(&mut self, id: SurfaceId) {
        // Dropped rather than destroyed: unsubmitted work may still use it.
        if self.surfaces.remove(&id).is_some() {
            self.bind_groups
                .retain(|key, _| !key.iter().any(|slot| *slot == Some(id)));
        }
    }

    fn clear_surface(&mut self, id: SurfaceId, color: [f32; 4]) -> Result<(), BackendError> {
        let view = self.surface(id)?.view.clone();
        let encoder = self.encoder();
        let _pass = begin_pass(encoder, "clear", &view, wgpu::LoadOp::Clear(wgpu_color(color)));
        Ok(())
    }

    fn write_surface(&mut self, id: SurfaceId, rgba8: &[u8]) -> Result<(), BackendError> {
        let surface = self.surface(id)?;
        let desc = surface.desc.clone();
        let expected = (desc.width * desc.height * SurfaceFormat::Rgba8Unorm.bytes_per_pixel()) as usize;
        if desc.format != SurfaceFormat::Rgba8Unorm || rgba8.len() != expected {
            return Err(BackendError::UploadSize {
                surface: id,
                expected,
                actual: rgba8.len(),
            });
        }
        // Queue writes land before the next submission; earlier recorded
        // draws into this surface must go first.
        self.flush();
        let surface = self.surface(id)?;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba8,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * 4),
                rows_per_image: Some(desc.height),
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, BackendError> {
        let source = shaders::compose(desc.fragment);
        let pipeline = self.build_pipeline(
            desc.label,
            &source,
            texture_format(desc.target_format),
            desc.blend,
        )?;
        let id = ProgramId(self.next());
        tracing::debug!(%id, label = desc.label, "compiled program");
        self.programs.insert(
            id,
            GpuProgram {
                label: desc.label.to_string(),
                pipeline,
                format: desc.target_format,
            },
        );
        Ok(id)
    }

    fn release_program(&mut self, id: ProgramId) {
        if let Some(program) = self.programs.remove(&id) {
            tracing::trace!(%id, label = %program.label, "released program");
        }
    }

    fn draw_fullscreen(&mut self, draw: &FullscreenDraw<'_>) -> Result<(), BackendError> {
        let program = self
            .programs
            .get(&draw.program)
            .ok_or(BackendError::UnknownProgram(draw.program))?;
        let target = self.surface(draw.target)?;
        if program.format != target.desc.format {
            return Err(BackendError::FormatMismatch {
                program: draw.program,
                surface: draw.target,
                expected: program.format,
                actual: target.desc.format,
            });
        }
        for slot in bind_key(&draw.textures).into_iter().flatten() {
            self.surface(slot)?;
        }

        let offset = self.push_uniforms(draw.uniforms)?;
        self.ensure_bind_group(draw.textures);

        let view = self.surface(draw.target)?.view.clone();
        let load = match draw.load {
            LoadAction::Clear(color) => wgpu::LoadOp::Clear(wgpu_color(color)),
            LoadAction::Load => wgpu::LoadOp::Load,
        };
        let key = bind_key(&draw.textures);
        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("feedback frame encoder"),
            })
        });
        let (Some(program), Some(bind_group)) =
            (self.programs.get(&draw.program), self.bind_groups.get(&key))
        else {
            return Err(BackendError::UnknownProgram(draw.program));
        };
        let mut pass = begin_pass(encoder, &program.label, &view, load);
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, bind_group, &[offset]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn read_surface(&mut self, id: SurfaceId) -> Result<Vec<[f32; 4]>, BackendError> {
        self.flush();
        let surface = self.surface(id)?;
        readback::read_texels(
            &self.device,
            &self.queue,
            &surface.texture,
            surface.desc.width,
            surface.desc.height,
            surface.desc.format,
        )
        .map_err(|reason| BackendError::Readback {
            surface: id,
            reason,
        })
    }
}

fn layout_entries(block: u64) -> [wgpu::BindGroupLayoutEntry; 6] {
    let texture = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };
    let sampler = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    };
    [
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(block),
            },
            count: None,
        },
        sampler(1),
        sampler(2),
        texture(3),
        texture(4),
        texture(5),
    ]
}

fn sampler(device: &wgpu::Device, label: &str, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

/// 1x1 transparent texture bound to unused slots.
fn placeholder_view(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("empty slot"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[0, 0, 0, 0],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

fn bind_key(textures: &TextureSlots) -> BindKey {
    [
        textures.previous_pass_this_frame,
        textures.this_pass_previous_frame,
        textures.aux,
    ]
}

fn blend_state(mode: BlendMode) -> Option<wgpu::BlendState> {
    match mode {
        BlendMode::Replace => None,
        BlendMode::PremultipliedOver => Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
    }
}

fn texture_format(format: SurfaceFormat) -> wgpu::TextureFormat {
    match format {
        SurfaceFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        SurfaceFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn wgpu_color([r, g, b, a]: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(r),
        g: f64::from(g),
        b: f64::from(b),
        a: f64::from(a),
    }
}
