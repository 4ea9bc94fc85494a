use fude::{
    AtlasConfig, FieldMode, FontStorage,
    atlas::AtlasBuilder,
    fontdb::{self, Family, Query},
    layout::layout_string,
};
use image::{ImageBuffer, Luma};

fn pick_system_font(font_storage: &mut FontStorage) -> fontdb::ID {
    font_storage.load_system_fonts();
    assert!(
        !font_storage.is_empty(),
        "system fonts are required to build an atlas"
    );

    const FAMILIES: &[Family<'_>] = &[Family::SansSerif];
    let query = Query {
        families: FAMILIES,
        weight: fontdb::Weight::NORMAL,
        stretch: fontdb::Stretch::Normal,
        style: fontdb::Style::Normal,
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

fn save(path: &str, width: usize, height: usize, pixels: &[u8]) {
    let img: ImageBuffer<Luma<u8>, Vec<u8>> =
        ImageBuffer::from_raw(width as u32, height as u32, pixels.to_vec())
            .expect("failed to create image buffer");
    img.save(path).expect("failed to save image");
    println!("Saved {path} ({width}x{height})");
}

fn main() {
    let mut font_storage = FontStorage::new();
    let font_id = pick_system_font(&mut font_storage);
    let font = font_storage.font(font_id).expect("failed to parse font");

    std::fs::create_dir_all("debug").expect("failed to create debug directory");

    // 1. Signed distance field atlas
    let config = AtlasConfig::default();
    let started = std::time::Instant::now();
    let atlas = AtlasBuilder::new(config.clone())
        .build_cpu(font.as_ref())
        .expect("atlas build failed");
    println!(
        "Built {} glyphs in {:?}",
        atlas.characters.len(),
        started.elapsed()
    );
    save("debug/sdf_atlas.png", atlas.width(), atlas.height(), atlas.pixels());

    // 2. Coverage atlas of the same glyphs, for comparison
    let coverage = AtlasBuilder::new(AtlasConfig {
        mode: FieldMode::Coverage,
        ..config
    })
    .build_cpu(font.as_ref())
    .expect("atlas build failed");
    save(
        "debug/coverage_atlas.png",
        coverage.width(),
        coverage.height(),
        coverage.pixels(),
    );

    // 3. Layout
    for size in [12.0, 32.0, 96.0] {
        let layout = layout_string("Sphinx of black quartz", &atlas, 0.0, 0.0, size);
        println!(
            "{size}px: {} quads, {:.1}px wide, smoothing {:.4}",
            layout.iter().count(),
            layout.measure(),
            atlas.smoothing(size)
        );
    }
}
