//! Small wgpu building blocks shared by the compute engine and the renderer.

use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::Pod;

use crate::error::AtlasError;

/// Runs `build` inside a validation error scope.
///
/// Shader modules and pipelines created by `build` that fail validation are
/// reported as [`AtlasError::ShaderCompilation`] with the native message.
pub fn validated<R>(device: &wgpu::Device, build: impl FnOnce() -> R) -> Result<R, AtlasError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let result = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => {
            log::error!("shader validation failed: {error}");
            Err(AtlasError::ShaderCompilation(error.to_string()))
        }
        None => Ok(result),
    }
}

/// A uniform buffer holding one or more `T` slots addressed by dynamic offset.
///
/// The last value written to each slot is cached so unchanged values are not
/// uploaded again.
pub struct UniformBlock<T: Pod + PartialEq> {
    buffer: wgpu::Buffer,
    stride: u64,
    cached: Vec<Option<T>>,
}

impl<T: Pod + PartialEq> UniformBlock<T> {
    pub fn new(device: &wgpu::Device, label: &str, slots: usize) -> Self {
        let slots = slots.max(1);
        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = Self::size().div_ceil(align) * align;

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: stride * slots as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            stride,
            cached: vec![None; slots],
        }
    }

    fn size() -> u64 {
        std::mem::size_of::<T>() as u64
    }

    pub fn slots(&self) -> usize {
        self.cached.len()
    }

    /// Writes `value` into `slot`. Returns `false` if nothing was uploaded,
    /// either because the value is unchanged or the slot does not exist.
    pub fn write(&mut self, queue: &wgpu::Queue, slot: usize, value: &T) -> bool {
        let Some(cached) = self.cached.get_mut(slot) else {
            log::warn!("uniform slot {slot} out of range ({} slots)", self.cached.len());
            return false;
        };
        if cached.as_ref() == Some(value) {
            return false;
        }

        queue.write_buffer(
            &self.buffer,
            slot as u64 * self.stride,
            bytemuck::bytes_of(value),
        );
        *cached = Some(*value);
        true
    }

    /// Dynamic offset of `slot`, for `set_bind_group`.
    pub fn offset(&self, slot: usize) -> u32 {
        (slot as u64 * self.stride) as u32
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(Self::size()),
        })
    }

    pub fn layout_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(Self::size()),
            },
            count: None,
        }
    }
}

/// Identity of a render pipeline, used by [`RenderContext`] to skip rebinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineId(u64);

impl PipelineId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A render pass plus the pipeline currently bound on it.
pub struct RenderContext<'a, 'pass> {
    pass: &'a mut wgpu::RenderPass<'pass>,
    bound: Option<PipelineId>,
}

impl<'a, 'pass> RenderContext<'a, 'pass> {
    pub fn new(pass: &'a mut wgpu::RenderPass<'pass>) -> Self {
        Self { pass, bound: None }
    }

    /// Binds `pipeline` unless it is already bound. Returns whether a bind happened.
    pub fn use_pipeline(&mut self, id: PipelineId, pipeline: &wgpu::RenderPipeline) -> bool {
        if self.bound == Some(id) {
            return false;
        }
        self.pass.set_pipeline(pipeline);
        self.bound = Some(id);
        true
    }

    pub fn bound(&self) -> Option<PipelineId> {
        self.bound
    }

    pub fn pass(&mut self) -> &mut wgpu::RenderPass<'pass> {
        self.pass
    }
}

/// Reads a `MAP_READ` buffer back to the CPU, blocking until the GPU is done.
pub fn read_buffer(instance: &wgpu::Instance, buffer: &wgpu::Buffer) -> Result<Vec<u8>, AtlasError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        // the receiver outlives the poll below
        let _ = sender.send(result);
    });

    instance.poll_all(true);
    receiver
        .recv()
        .map_err(|e| AtlasError::Gpu(format!("readback callback dropped: {e}")))?
        .map_err(|e| AtlasError::Gpu(format!("failed to map readback buffer: {e}")))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(data)
}
