use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use nalgebra::Orthographic3;

use crate::atlas::FontAtlas;
use crate::config::FieldMode;
use crate::error::AtlasError;
use crate::gpu::{PipelineId, RenderContext, UniformBlock, validated};
use crate::layout::{Layout, Quad};

const SHADER: &str = include_str!("wgpu_renderer/sdf_text.wgsl");

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct InstanceData {
    pub screen_rect: [f32; 4], // x, y, w, h
    pub uv_rect: [f32; 4],     // u, v, w, h
}

impl From<Quad> for InstanceData {
    fn from(quad: Quad) -> Self {
        Self {
            screen_rect: [
                quad.rect.min.x,
                quad.rect.min.y,
                quad.rect.width(),
                quad.rect.height(),
            ],
            uv_rect: [
                quad.uv.min.x,
                quad.uv.min.y,
                quad.uv.width(),
                quad.uv.height(),
            ],
        }
    }
}

/// Mirrors `Globals` in `sdf_text.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct Globals {
    projection: [[f32; 4]; 4],
    color: [f32; 4],
    smoothing: f32,
    mode: u32,
    _padding: [u32; 2],
}

/// Top-left origin, y down, one unit per pixel.
fn screen_projection(screen_size: [f32; 2]) -> [[f32; 4]; 4] {
    let [width, height] = screen_size;
    Orthographic3::new(0.0, width.max(1.0), height.max(1.0), 0.0, -1.0, 1.0)
        .to_homogeneous()
        .into()
}

fn shader_mode(mode: FieldMode) -> u32 {
    match mode {
        FieldMode::SignedDistance => 0,
        FieldMode::Coverage => 1,
    }
}

/// The atlas pixels on the GPU: an `R8Unorm` texture with a linear,
/// clamp-to-edge sampler.
pub struct AtlasTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub mode: FieldMode,
}

impl AtlasTexture {
    pub fn upload(device: &wgpu::Device, queue: &wgpu::Queue, atlas: &FontAtlas) -> Self {
        // zero sized textures are invalid; an empty atlas gets one blank texel
        let width = atlas.width().max(1) as u32;
        let height = atlas.height().max(1) as u32;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Font Atlas"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let blank = [0u8];
        let pixels = if atlas.pixels().is_empty() {
            &blank[..]
        } else {
            atlas.pixels()
        };
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Font Atlas Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            mode: atlas.mode,
        }
    }
}

/// A laid out string and the colour to draw it in.
#[derive(Clone, Copy, Debug)]
pub struct TextRun<'a> {
    pub layout: Layout<'a>,
    pub color: palette::Srgba,
}

impl<'a> TextRun<'a> {
    pub fn new(layout: Layout<'a>, color: palette::Srgba) -> Self {
        Self { layout, color }
    }
}

struct PreparedRun {
    instances: Range<u32>,
    slot: usize,
}

/// Draws text runs from one [`AtlasTexture`] as instanced quads.
///
/// Call [`TextRenderer::prepare`] once per frame, then
/// [`TextRenderer::draw`] inside a render pass. Each run is a single draw
/// call; the atlas is bound once for all of them.
pub struct TextRenderer {
    id: PipelineId,
    pipeline: wgpu::RenderPipeline,
    globals_layout: wgpu::BindGroupLayout,
    atlas_layout: wgpu::BindGroupLayout,
    globals: UniformBlock<Globals>,
    globals_bind_group: wgpu::BindGroup,
    atlas_bind_group: wgpu::BindGroup,
    mode: FieldMode,
    instance_buffer: wgpu::Buffer,
    runs: Vec<PreparedRun>,
}

impl TextRenderer {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        atlas: &AtlasTexture,
    ) -> Result<Self, AtlasError> {
        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("TextRenderer Globals Layout"),
            entries: &[UniformBlock::<Globals>::layout_entry(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
            )],
        });

        let atlas_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("TextRenderer Atlas Layout"),
            entries: &[
                // Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Atlas
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("TextRenderer Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, &atlas_layout],
            push_constant_ranges: &[],
        });

        let instance_buffer_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceData>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                // screen_rect
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // uv_rect
                wgpu::VertexAttribute {
                    offset: 16,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        };

        let pipeline = validated(device, || {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("TextRenderer Shader"),
                source: wgpu::ShaderSource::Wgsl(SHADER.into()),
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("TextRenderer Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: std::slice::from_ref(&instance_buffer_layout),
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        let globals = UniformBlock::new(device, "TextRenderer Globals", 16);
        let globals_bind_group = Self::globals_bind_group(device, &globals_layout, &globals);
        let atlas_bind_group = Self::atlas_bind_group(device, &atlas_layout, atlas);

        let instance_capacity = 1024;
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Buffer"),
            size: (instance_capacity * std::mem::size_of::<InstanceData>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            id: PipelineId::next(),
            pipeline,
            globals_layout,
            atlas_layout,
            globals,
            globals_bind_group,
            atlas_bind_group,
            mode: atlas.mode,
            instance_buffer,
            runs: Vec::new(),
        })
    }

    fn globals_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        globals: &UniformBlock<Globals>,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("TextRenderer Globals Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals.binding(),
            }],
        })
    }

    fn atlas_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        atlas: &AtlasTexture,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("TextRenderer Atlas Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Sampler(&atlas.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&atlas.view),
                },
            ],
        })
    }

    pub fn pipeline_id(&self) -> PipelineId {
        self.id
    }

    /// Switches to another atlas. Runs prepared afterwards must be laid out
    /// with the matching [`FontAtlas`].
    pub fn set_atlas(&mut self, device: &wgpu::Device, atlas: &AtlasTexture) {
        self.atlas_bind_group = Self::atlas_bind_group(device, &self.atlas_layout, atlas);
        self.mode = atlas.mode;
    }

    /// Uploads instance data and per-run uniforms for `runs`.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        screen_size: [f32; 2],
        runs: &[TextRun<'_>],
    ) {
        self.runs.clear();

        if runs.len() > self.globals.slots() {
            let slots = runs.len().next_power_of_two();
            self.globals = UniformBlock::new(device, "TextRenderer Globals", slots);
            self.globals_bind_group =
                Self::globals_bind_group(device, &self.globals_layout, &self.globals);
        }

        let projection = screen_projection(screen_size);
        let mut instance_data: Vec<InstanceData> = Vec::new();

        for (slot, run) in runs.iter().enumerate() {
            let start = instance_data.len() as u32;
            instance_data.extend(run.layout.iter().map(InstanceData::from));
            let end = instance_data.len() as u32;

            let linear: palette::LinSrgba = run.color.into_linear();
            let globals = Globals {
                projection,
                color: [linear.red, linear.green, linear.blue, linear.alpha],
                smoothing: run.layout.atlas().smoothing(run.layout.size()),
                mode: shader_mode(self.mode),
                _padding: [0; 2],
            };
            self.globals.write(queue, slot, &globals);

            self.runs.push(PreparedRun {
                instances: start..end,
                slot,
            });
        }

        if instance_data.is_empty() {
            return;
        }

        let bytes: &[u8] = bytemuck::cast_slice(&instance_data);
        let current_capacity = self.instance_buffer.size();
        let needed_bytes = bytes.len() as u64;
        if needed_bytes > current_capacity {
            let new_capacity = needed_bytes.max(current_capacity * 2);
            self.instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Instance Buffer"),
                size: new_capacity,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        queue.write_buffer(&self.instance_buffer, 0, bytes);
    }

    /// Draws the runs given to the last [`TextRenderer::prepare`].
    pub fn draw(&self, ctx: &mut RenderContext<'_, '_>) {
        if self.runs.iter().all(|run| run.instances.is_empty()) {
            return;
        }

        ctx.use_pipeline(self.id, &self.pipeline);
        let pass = ctx.pass();
        pass.set_bind_group(1, &self.atlas_bind_group, &[]);
        pass.set_vertex_buffer(0, self.instance_buffer.slice(..));

        for run in &self.runs {
            if run.instances.is_empty() {
                continue;
            }
            pass.set_bind_group(0, &self.globals_bind_group, &[self.globals.offset(run.slot)]);
            pass.draw(0..4, run.instances.clone());
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::AtlasBuilder;
    use crate::config::AtlasConfig;
    use crate::glyph_source::test_font::BoxFont;
    use crate::gpu::read_buffer;
    use crate::layout::layout_string;

    fn gpu() -> Option<(wgpu::Instance, wgpu::Device, wgpu::Queue)> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .ok()?;
        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).ok()?;
        Some((instance, device, queue))
    }

    #[test]
    fn uniform_layouts_match_shader() {
        assert_eq!(std::mem::size_of::<Globals>(), 96);
        assert_eq!(std::mem::size_of::<InstanceData>(), 32);
    }

    #[test]
    fn projection_maps_screen_corners_to_clip_space() {
        let m = nalgebra::Matrix4::from(screen_projection([200.0, 100.0]));
        let top_left = m * nalgebra::Vector4::new(0.0, 0.0, 0.0, 1.0);
        let bottom_right = m * nalgebra::Vector4::new(200.0, 100.0, 0.0, 1.0);
        assert!((top_left.x + 1.0).abs() < 1e-6 && (top_left.y - 1.0).abs() < 1e-6);
        assert!((bottom_right.x - 1.0).abs() < 1e-6 && (bottom_right.y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn instance_data_spans_quad_rect_and_uv() {
        let quad = Quad {
            character: 'a',
            origin: euclid::Point2D::new(1.0, 2.0),
            rect: euclid::Box2D::new(euclid::Point2D::new(1.0, 2.0), euclid::Point2D::new(4.0, 8.0)),
            uv: euclid::Box2D::new(euclid::Point2D::new(0.25, 0.5), euclid::Point2D::new(0.5, 1.0)),
        };
        let data = InstanceData::from(quad);
        assert_eq!(data.screen_rect, [1.0, 2.0, 3.0, 6.0]);
        assert_eq!(data.uv_rect, [0.25, 0.5, 0.25, 0.5]);
    }

    #[test]
    fn renders_text_into_a_texture() {
        let Some((instance, device, queue)) = gpu() else {
            eprintln!("no adapter available, skipping");
            return;
        };

        let font = BoxFont::new().with('I', 30.0, 80.0, 50.0);
        let config = AtlasConfig {
            characters: vec!['I'],
            ..AtlasConfig::with_spread(40.0, 4)
        };
        let atlas = AtlasBuilder::new(config).build_cpu(&font).unwrap();
        let texture = AtlasTexture::upload(&device, &queue, &atlas);

        let format = wgpu::TextureFormat::Rgba8Unorm;
        let mut renderer = TextRenderer::new(&device, format, &texture).unwrap();
        let (width, height) = (64u32, 64u32);
        let layout = layout_string("I", &atlas, 10.0, 10.0, 40.0);
        renderer.prepare(
            &device,
            &queue,
            [width as f32, height as f32],
            &[TextRun::new(layout, palette::Srgba::new(1.0, 1.0, 1.0, 1.0))],
        );

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Target Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Text Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let mut ctx = RenderContext::new(&mut pass);
            renderer.draw(&mut ctx);
            assert_eq!(ctx.bound(), Some(renderer.pipeline_id()));
            // a second draw reuses the bound pipeline
            assert!(!ctx.use_pipeline(renderer.pipeline_id(), &renderer.pipeline));
        }

        let output = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Buffer"),
            size: (width * height * 4) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let pixels = read_buffer(&instance, &output).unwrap();
        let red = |x: u32, y: u32| pixels[((y * width + x) * 4) as usize];

        // the 12x32 stem sits between x = 10..22 and y = 10..42
        assert!(red(16, 26) > 200, "stem centre is {}", red(16, 26));
        assert_eq!(red(2, 2), 0);
        assert_eq!(red(40, 26), 0);
    }
}
