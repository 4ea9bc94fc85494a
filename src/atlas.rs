//! Atlas construction and the finished [`FontAtlas`].

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use euclid::{Box2D, Point2D, UnknownUnit};
use fxhash::FxBuildHasher;

use crate::config::{AtlasConfig, FieldMode};
use crate::error::AtlasError;
use crate::glyph_source::{GlyphBitmap, GlyphInfo, GlyphSource};
use crate::packer::{PackInput, pack};
use crate::raster::CoverageBitmap;
use crate::sdf::{CpuDistanceTransform, DistanceField, DistanceTransform};

/// Placement of one character inside the atlas.
///
/// UVs are normalized to `[0, 1]`. Advance, height and the cell fields are
/// in atlas pixels, i.e. at [`FontAtlas::size`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CharacterMetrics {
    pub uv_x1: f32,
    pub uv_y1: f32,
    pub uv_x2: f32,
    pub uv_y2: f32,
    /// Horizontal pen advance.
    pub x_advance: f32,
    /// Outline height.
    pub height: f32,
    /// Left edge of the cell relative to the pen position.
    pub cell_left: f32,
    /// Top edge of the cell relative to the baseline, y down.
    pub cell_top: f32,
    pub cell_width: f32,
    pub cell_height: f32,
}

impl CharacterMetrics {
    pub fn uv(&self) -> Box2D<f32, UnknownUnit> {
        Box2D::new(
            Point2D::new(self.uv_x1, self.uv_y1),
            Point2D::new(self.uv_x2, self.uv_y2),
        )
    }
}

/// Pixels of a finished atlas.
#[derive(Clone, Debug, PartialEq)]
pub enum AtlasField {
    Distance(DistanceField),
    Coverage(CoverageBitmap),
}

impl AtlasField {
    pub fn width(&self) -> usize {
        match self {
            Self::Distance(field) => field.width,
            Self::Coverage(bitmap) => bitmap.width,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Self::Distance(field) => field.height,
            Self::Coverage(bitmap) => bitmap.height,
        }
    }

    /// Row-major 8-bit pixels.
    pub fn pixels(&self) -> &[u8] {
        match self {
            Self::Distance(field) => &field.pixels,
            Self::Coverage(bitmap) => &bitmap.pixels,
        }
    }
}

/// An immutable glyph atlas.
///
/// Built once by [`AtlasBuilder`] and shared by reference or `Arc`.
#[derive(Clone, Debug)]
pub struct FontAtlas {
    pub field: AtlasField,
    pub characters: HashMap<char, CharacterMetrics, FxBuildHasher>,
    /// Pixel size the glyphs were rasterized at.
    pub size: f32,
    pub ascent: f32,
    pub descent: f32,
    pub line_gap: f32,
    pub border: u32,
    pub mode: FieldMode,
    /// Larger of the two distance radii.
    pub max_distance: f32,
}

impl FontAtlas {
    pub fn width(&self) -> usize {
        self.field.width()
    }

    pub fn height(&self) -> usize {
        self.field.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.field.pixels()
    }

    pub fn metrics(&self, character: char) -> Option<&CharacterMetrics> {
        self.characters.get(&character)
    }

    pub fn line_height(&self) -> f32 {
        self.ascent - self.descent + self.line_gap
    }

    /// Edge smoothing width, in field units, for drawing at `requested_size`.
    ///
    /// One screen pixel covers `size / requested_size` atlas pixels and one
    /// atlas pixel spans `0.5 / max_distance` of the encoded range.
    pub fn smoothing(&self, requested_size: f32) -> f32 {
        if requested_size <= 0.0 {
            return 0.0;
        }
        0.5 / self.max_distance * self.size / requested_size
    }
}

/// Builds [`FontAtlas`]es from a [`GlyphSource`].
#[derive(Clone, Debug, Default)]
pub struct AtlasBuilder {
    config: AtlasConfig,
}

struct Rasterized {
    character: char,
    info: GlyphInfo,
    bitmap: GlyphBitmap,
}

impl AtlasBuilder {
    pub fn new(config: AtlasConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Builds the atlas with the distance transform running on this thread.
    pub fn build_cpu<S: GlyphSource + ?Sized>(&self, source: &S) -> Result<FontAtlas, AtlasError> {
        self.build(source, &mut CpuDistanceTransform::new())
    }

    /// Rasterizes, packs and transforms every configured character.
    ///
    /// Characters the source has no outline for are skipped. In
    /// [`FieldMode::Coverage`] the engine is not used.
    pub fn build<S, E>(&self, source: &S, engine: &mut E) -> Result<FontAtlas, AtlasError>
    where
        S: GlyphSource + ?Sized,
        E: DistanceTransform + ?Sized,
    {
        let config = &self.config;
        config.validate()?;
        let started = Instant::now();

        let glyphs = self.rasterize(source);

        let border = config.border;
        let padded = |len: usize| {
            u32::try_from(len)
                .ok()
                .and_then(|len| len.checked_add(border.checked_mul(2)?))
                .ok_or(AtlasError::InvalidConfig("glyph cell size overflows u32"))
        };
        let cells = glyphs
            .iter()
            .enumerate()
            .map(|(id, glyph)| {
                Ok(PackInput {
                    id,
                    width: padded(glyph.bitmap.width)?,
                    height: padded(glyph.bitmap.height)?,
                })
            })
            .collect::<Result<Vec<PackInput<usize>>, AtlasError>>()?;
        let packing = pack(&cells)?;

        let mut coverage =
            CoverageBitmap::new(packing.bounds.width as usize, packing.bounds.height as usize);
        for (glyph, rect) in glyphs.iter().zip(&packing.rects) {
            coverage.blit(&glyph.bitmap, rect, border, glyph.character)?;
        }

        let field = match config.mode {
            FieldMode::SignedDistance => {
                AtlasField::Distance(engine.transform(&coverage, &config.sdf_params())?)
            }
            FieldMode::Coverage => AtlasField::Coverage(coverage),
        };

        let scale = config.font_size / source.em_size();
        let atlas_width = packing.bounds.width as f32;
        let atlas_height = packing.bounds.height as f32;

        let mut characters =
            HashMap::with_capacity_and_hasher(glyphs.len(), FxBuildHasher::default());
        for (glyph, rect) in glyphs.iter().zip(&packing.rects) {
            let bitmap = &glyph.bitmap;
            // bitmaps are y-up from the baseline, cells are y-down
            let glyph_top = -(bitmap.ymin + bitmap.height as i32);
            characters.insert(
                glyph.character,
                CharacterMetrics {
                    uv_x1: rect.x as f32 / atlas_width,
                    uv_y1: rect.y as f32 / atlas_height,
                    uv_x2: rect.right() as f32 / atlas_width,
                    uv_y2: rect.bottom() as f32 / atlas_height,
                    x_advance: glyph.info.advance_width * scale,
                    height: glyph.info.height * scale,
                    cell_left: (bitmap.xmin - border as i32) as f32,
                    cell_top: (glyph_top - border as i32) as f32,
                    cell_width: rect.width as f32,
                    cell_height: rect.height as f32,
                },
            );
        }

        let line = source.line_metrics(config.font_size);
        let atlas = FontAtlas {
            field,
            characters,
            size: config.font_size,
            ascent: line.ascent,
            descent: line.descent,
            line_gap: line.line_gap,
            border,
            mode: config.mode,
            max_distance: config.max_distance(),
        };

        log::info!(
            "built {}x{} atlas with {} glyphs at {}px in {:?}",
            atlas.width(),
            atlas.height(),
            atlas.characters.len(),
            config.font_size,
            started.elapsed()
        );

        if let Some(path) = &config.debug_image {
            save_debug_image(&atlas, path);
        }

        Ok(atlas)
    }

    fn rasterize<S: GlyphSource + ?Sized>(&self, source: &S) -> Vec<Rasterized> {
        let mut seen = HashSet::with_capacity_and_hasher(
            self.config.characters.len(),
            FxBuildHasher::default(),
        );
        let mut glyphs = Vec::with_capacity(self.config.characters.len());

        for &character in &self.config.characters {
            if !seen.insert(character) {
                continue;
            }
            let Some(info) = source.glyph(character) else {
                log::debug!("no glyph for {character:?}, skipping");
                continue;
            };
            let Some(bitmap) = source.rasterize(character, self.config.font_size) else {
                log::debug!("failed to rasterize {character:?}, skipping");
                continue;
            };
            glyphs.push(Rasterized {
                character,
                info,
                bitmap,
            });
        }

        glyphs
    }
}

#[cfg(feature = "debug-image")]
fn save_debug_image(atlas: &FontAtlas, path: &std::path::Path) {
    let Some(image) = image::GrayImage::from_raw(
        atlas.width() as u32,
        atlas.height() as u32,
        atlas.pixels().to_vec(),
    ) else {
        log::warn!("atlas debug image has inconsistent size, not saved");
        return;
    };
    if let Err(e) = image.save(path) {
        log::warn!("failed to save atlas debug image to {}: {e}", path.display());
    }
}

#[cfg(not(feature = "debug-image"))]
fn save_debug_image(_atlas: &FontAtlas, path: &std::path::Path) {
    log::warn!(
        "debug image {} requested but the `debug-image` feature is disabled",
        path.display()
    );
}
