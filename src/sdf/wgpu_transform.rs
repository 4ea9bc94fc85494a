use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{DistanceField, DistanceTransform, JumpFloodPlan, SdfParams};
use crate::error::AtlasError;
use crate::gpu::{UniformBlock, read_buffer, validated};
use crate::raster::CoverageBitmap;

const SHADER: &str = include_str!("jump_flood.wgsl");

const WORKGROUP_SIZE: u32 = 8;

/// Per-pass parameters, mirrors `Params` in `jump_flood.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
struct PassParams {
    width: u32,
    height: u32,
    offset: i32,
    threshold: u32,
    max_inside: f32,
    max_outside: f32,
    _padding: [u32; 2],
}

/// Jump flooding on the GPU.
///
/// Runs the seed pass, one flood pass per [`JumpFloodPlan`] offset and the
/// distance pass, each in its own compute pass, then reads the field back.
/// Produces the same bytes as [`CpuDistanceTransform`](super::CpuDistanceTransform).
pub struct WgpuDistanceTransform<'a> {
    instance: &'a wgpu::Instance,
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    seed_pipeline: wgpu::ComputePipeline,
    flood_pipeline: wgpu::ComputePipeline,
    distance_pipeline: wgpu::ComputePipeline,
    executed_offsets: Vec<u32>,
}

/// Buffers for one transform.
struct Buffers {
    params: UniformBlock<PassParams>,
    coverage: wgpu::Buffer,
    seeds: [wgpu::Buffer; 2],
    field: wgpu::Buffer,
    readback: wgpu::Buffer,
}

impl<'a> WgpuDistanceTransform<'a> {
    pub fn new(
        instance: &'a wgpu::Instance,
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
    ) -> Result<Self, AtlasError> {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Jump Flood Bind Group Layout"),
            entries: &[
                UniformBlock::<PassParams>::layout_entry(0, wgpu::ShaderStages::COMPUTE),
                // coverage
                storage(1, true),
                // src seeds
                storage(2, true),
                // dst seeds
                storage(3, false),
                // encoded field
                storage(4, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Jump Flood Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let (seed_pipeline, flood_pipeline, distance_pipeline) = validated(device, || {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Jump Flood Shader"),
                source: wgpu::ShaderSource::Wgsl(SHADER.into()),
            });
            let pipeline = |entry_point: &str| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(entry_point),
                    layout: Some(&pipeline_layout),
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    cache: None,
                })
            };
            (
                pipeline("seed_pass"),
                pipeline("flood_pass"),
                pipeline("distance_pass"),
            )
        })?;

        Ok(Self {
            instance,
            device,
            queue,
            bind_group_layout,
            seed_pipeline,
            flood_pipeline,
            distance_pipeline,
            executed_offsets: Vec::new(),
        })
    }

    /// Offsets of the flood passes submitted by the last transform.
    pub fn executed_offsets(&self) -> &[u32] {
        &self.executed_offsets
    }

    fn create_buffers(&self, coverage: &CoverageBitmap, slots: usize) -> Result<Buffers, AtlasError> {
        let pixels = (coverage.width * coverage.height) as u64;
        let seed_size = pixels * std::mem::size_of::<[i32; 4]>() as u64;
        let limit = self.device.limits().max_storage_buffer_binding_size as u64;
        if seed_size > limit {
            return Err(AtlasError::Gpu(format!(
                "{}x{} atlas needs {seed_size} bytes of seed storage, device allows {limit}",
                coverage.width, coverage.height
            )));
        }

        let packed: Vec<u32> = coverage
            .pixels
            .chunks(4)
            .map(|chunk| {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                u32::from_le_bytes(word)
            })
            .collect();
        let coverage = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Jump Flood Coverage"),
                contents: bytemuck::cast_slice(&packed),
                usage: wgpu::BufferUsages::STORAGE,
            });

        let seeds = ["Jump Flood Seeds A", "Jump Flood Seeds B"].map(|label| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: seed_size,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            })
        });

        let field_size = pixels * std::mem::size_of::<u32>() as u64;
        let field = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Jump Flood Field"),
            size: field_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Jump Flood Readback"),
            size: field_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Buffers {
            params: UniformBlock::new(self.device, "Jump Flood Params", slots),
            coverage,
            seeds,
            field,
            readback,
        })
    }

    fn bind_group(&self, buffers: &Buffers, src: usize) -> wgpu::BindGroup {
        let dst = 1 - src;
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Jump Flood Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.params.binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.coverage.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.seeds[src].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.seeds[dst].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: buffers.field.as_entire_binding(),
                },
            ],
        })
    }
}

impl DistanceTransform for WgpuDistanceTransform<'_> {
    fn transform(
        &mut self,
        coverage: &CoverageBitmap,
        params: &SdfParams,
    ) -> Result<DistanceField, AtlasError> {
        let CoverageBitmap { width, height, .. } = *coverage;
        self.executed_offsets.clear();

        if coverage.is_empty() {
            return Ok(DistanceField {
                width,
                height,
                pixels: Vec::new(),
                max_distance_inside: params.max_distance_inside,
                max_distance_outside: params.max_distance_outside,
            });
        }

        let plan = JumpFloodPlan::new(width, height);
        // seed, one slot per flood pass, distance
        let slots = plan.steps() as usize + 2;
        let mut buffers = self.create_buffers(coverage, slots)?;

        let pass_params = |offset: i32| PassParams {
            width: width as u32,
            height: height as u32,
            offset,
            threshold: params.coverage_threshold as u32,
            max_inside: params.max_distance_inside,
            max_outside: params.max_distance_outside,
            _padding: [0; 2],
        };
        buffers.params.write(self.queue, 0, &pass_params(0));
        for (k, offset) in plan.offsets().enumerate() {
            buffers.params.write(self.queue, k + 1, &pass_params(offset as i32));
        }
        buffers.params.write(self.queue, slots - 1, &pass_params(0));

        // bind_groups[i] reads seeds[i] and writes seeds[1 - i]
        let bind_groups = [self.bind_group(&buffers, 0), self.bind_group(&buffers, 1)];
        let groups = [
            (width as u32).div_ceil(WORKGROUP_SIZE),
            (height as u32).div_ceil(WORKGROUP_SIZE),
        ];

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Jump Flood Encoder"),
            });

        let mut dispatch = |label: &str, pipeline: &wgpu::ComputePipeline, group: usize, slot: usize| {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_groups[group], &[buffers.params.offset(slot)]);
            pass.dispatch_workgroups(groups[0], groups[1], 1);
        };

        // the seed pass writes seeds[1]
        dispatch("Jump Flood Seed", &self.seed_pipeline, 0, 0);
        let mut latest = 1;
        for (k, offset) in plan.offsets().enumerate() {
            dispatch("Jump Flood Pass", &self.flood_pipeline, latest, k + 1);
            latest = 1 - latest;
            self.executed_offsets.push(offset);
        }
        dispatch("Jump Flood Distance", &self.distance_pipeline, latest, slots - 1);

        encoder.copy_buffer_to_buffer(
            &buffers.field,
            0,
            &buffers.readback,
            0,
            buffers.field.size(),
        );
        self.queue.submit(Some(encoder.finish()));

        let bytes = read_buffer(self.instance, &buffers.readback)?;
        let pixels = bytes
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]) as u8)
            .collect();

        log::debug!(
            "gpu jump flood on {}x{} finished after {} passes",
            width,
            height,
            self.executed_offsets.len()
        );

        Ok(DistanceField {
            width,
            height,
            pixels,
            max_distance_inside: params.max_distance_inside,
            max_distance_outside: params.max_distance_outside,
        })
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdf::CpuDistanceTransform;

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
    fn pass_params_match_shader_layout() {
        assert_eq!(std::mem::size_of::<PassParams>(), 32);
    }

    #[test]
    fn gpu_field_matches_cpu_field() {
        let Some((instance, device, queue)) = gpu() else {
            eprintln!("no adapter available, skipping");
            return;
        };

        let mut coverage = CoverageBitmap::new(37, 21);
        for y in 0..21 {
            for x in 0..37 {
                let (fx, fy) = (x as f32 - 12.0, y as f32 - 10.0);
                if (fx * fx + fy * fy).sqrt() < 7.0 || (x > 24 && x < 30) {
                    coverage.pixels[y * 37 + x] = 220;
                }
            }
        }
        let params = SdfParams {
            max_distance_inside: 4.0,
            max_distance_outside: 6.0,
            coverage_threshold: 128,
        };

        let mut cpu = CpuDistanceTransform::new();
        let expected = cpu.transform(&coverage, &params).unwrap();

        let mut engine = WgpuDistanceTransform::new(&instance, &device, &queue).unwrap();
        let field = engine.transform(&coverage, &params).unwrap();

        assert_eq!(engine.executed_offsets(), cpu.executed_offsets());
        assert_eq!((field.width, field.height), (expected.width, expected.height));
        // shader sqrt is not required to be correctly rounded
        for (i, (&gpu, &cpu)) in field.pixels.iter().zip(&expected.pixels).enumerate() {
            assert!(gpu.abs_diff(cpu) <= 1, "pixel {i}: gpu {gpu}, cpu {cpu}");
        }
    }

    #[test]
    fn empty_bitmap_skips_the_gpu() {
        let Some((instance, device, queue)) = gpu() else {
            return;
        };
        let mut engine = WgpuDistanceTransform::new(&instance, &device, &queue).unwrap();
        let field = engine
            .transform(&CoverageBitmap::new(0, 3), &SdfParams::default())
            .unwrap();
        assert!(field.pixels.is_empty());
        assert!(engine.executed_offsets().is_empty());
    }
}
