use fude::{
    AtlasConfig, FontStorage,
    atlas::AtlasBuilder,
    fontdb::{self, Family, Query},
    gpu::RenderContext,
    layout::layout_string,
    renderer::{AtlasTexture, TextRenderer, TextRun},
    sdf::WgpuDistanceTransform,
};
use image::{ImageBuffer, Rgba};

fn pick_system_font(font_storage: &mut FontStorage) -> fontdb::ID {
    font_storage.load_system_fonts();
    assert!(
        !font_storage.is_empty(),
        "system fonts are required to build an atlas"
    );

    const FAMILIES: &[Family<'_>] = &[Family::SansSerif];
    let query = Query {
        families: FAMILIES,
        ..Default::default()
    };

    if let Some((font_id, _)) = font_storage.query(&query) {
        return font_id;
    }

    font_storage
        .faces()
        .next()
        .map(|face| face.id)
        .expect("no usable fonts registered in FontStorage")
}

fn main() {
    pollster::block_on(run());
}

async fn run() {
    // 1. Setup wgpu
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        flags: wgpu::InstanceFlags::default(),
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .expect("Failed to find an appropriate adapter");

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .expect("Failed to create device");

    // 2. Build the atlas with the compute shader engine
    let mut font_storage = FontStorage::new();
    let font_id = pick_system_font(&mut font_storage);
    let font = font_storage.font(font_id).expect("failed to parse font");

    let mut engine = WgpuDistanceTransform::new(&instance, &device, &queue)
        .expect("failed to create jump flood pipelines");
    let atlas = AtlasBuilder::new(AtlasConfig::default())
        .build(font.as_ref(), &mut engine)
        .expect("atlas build failed");
    let atlas_texture = AtlasTexture::upload(&device, &queue, &atlas);

    // 3. Lay out the same line at several sizes
    let texture_format = wgpu::TextureFormat::Rgba8Unorm;
    let mut renderer = TextRenderer::new(&device, texture_format, &atlas_texture)
        .expect("failed to create text renderer");

    let sizes = [12.0, 18.0, 32.0, 64.0, 128.0, 256.0];
    let mut y = 8.0;
    let mut runs = Vec::new();
    for (i, size) in sizes.into_iter().enumerate() {
        let layout = layout_string("Sphinx of black quartz, judge my vow", &atlas, 8.0, y, size);
        let shade = 0.5 + 0.5 * i as f32 / sizes.len() as f32;
        runs.push(TextRun::new(layout, palette::Srgba::new(shade, shade, 1.0, 1.0)));
        y += layout.line_height();
    }

    let width = 2048;
    let height = (y.ceil() as u32).max(1);
    renderer.prepare(&device, &queue, [width as f32, height as f32], &runs);

    // 4. Create Target Texture
    let target_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Target Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: texture_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let target_view = target_texture.create_view(&wgpu::TextureViewDescriptor::default());

    // 5. Render
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Render Encoder"),
    });
    {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Text Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target_view,
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
        let mut ctx = RenderContext::new(&mut rpass);
        renderer.draw(&mut ctx);
    }

    // 6. Copy to Buffer
    let u32_size = std::mem::size_of::<u32>() as u32;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Output Buffer"),
        size: (u32_size * width * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture: &target_texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &output_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(u32_size * width),
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

    // 7. Read Buffer and Save
    let buffer = fude::gpu::read_buffer(&instance, &output_buffer).expect("readback failed");

    std::fs::create_dir_all("debug").expect("failed to create debug directory");

    let img_buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_raw(width, height, buffer).expect("failed to create image buffer");

    img_buffer
        .save("debug/wgpu_sdf_text.png")
        .expect("failed to save image");

    println!("Saved rendered image to debug/wgpu_sdf_text.png");
}
