/// Outline metrics of a glyph in the font's native units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphInfo {
    pub advance_width: f32,
    pub left_side_bearing: f32,
    pub height: f32,
}

/// Vertical metrics of a font at a pixel size.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct LineMetrics {
    /// Distance from the baseline to the top of the line box. Positive.
    pub ascent: f32,
    /// Distance from the baseline to the bottom of the line box. Usually negative.
    pub descent: f32,
    pub line_gap: f32,
}

impl LineMetrics {
    pub fn line_height(&self) -> f32 {
        self.ascent - self.descent + self.line_gap
    }
}

/// 8-bit coverage of a single glyph.
///
/// `xmin` and `ymin` place the bitmap relative to the pen position on the
/// baseline, with y pointing up (the `fontdue` convention).
#[derive(Clone, Debug, PartialEq)]
pub struct GlyphBitmap {
    pub width: usize,
    pub height: usize,
    pub xmin: i32,
    pub ymin: i32,
    pub coverage: Vec<u8>,
}

impl GlyphBitmap {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Source of glyph outlines and rasterized coverage.
///
/// Implemented for [`fontdue::Font`]. Atlas building only talks to fonts
/// through this trait, so other rasterizers can be plugged in.
pub trait GlyphSource {
    /// Native units per em. Metrics from [`GlyphSource::glyph`] are in these units.
    fn em_size(&self) -> f32;

    /// Returns `None` when the font has no outline for `character`.
    fn glyph(&self, character: char) -> Option<GlyphInfo>;

    /// Rasterizes `character` at `px` pixels per em.
    fn rasterize(&self, character: char, px: f32) -> Option<GlyphBitmap>;

    fn line_metrics(&self, px: f32) -> LineMetrics;
}

impl GlyphSource for fontdue::Font {
    fn em_size(&self) -> f32 {
        self.units_per_em()
    }

    fn glyph(&self, character: char) -> Option<GlyphInfo> {
        // index 0 is .notdef
        if self.lookup_glyph_index(character) == 0 {
            return None;
        }

        let metrics = self.metrics(character, self.units_per_em());
        Some(GlyphInfo {
            advance_width: metrics.advance_width,
            left_side_bearing: metrics.bounds.xmin,
            height: metrics.bounds.height,
        })
    }

    fn rasterize(&self, character: char, px: f32) -> Option<GlyphBitmap> {
        if self.lookup_glyph_index(character) == 0 {
            return None;
        }

        let (metrics, coverage) = fontdue::Font::rasterize(self, character, px);
        Some(GlyphBitmap {
            width: metrics.width,
            height: metrics.height,
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            coverage,
        })
    }

    fn line_metrics(&self, px: f32) -> LineMetrics {
        match self.horizontal_line_metrics(px) {
            Some(m) => LineMetrics {
                ascent: m.ascent,
                descent: m.descent,
                line_gap: m.line_gap,
            },
            None => LineMetrics {
                ascent: px,
                descent: 0.0,
                line_gap: 0.0,
            },
        }
    }
}

/// Font stand-in that draws every glyph as a solid box.
#[cfg(test)]
pub(crate) mod test_font {
    use super::*;
    use std::collections::HashMap;

    /// `em_size` is 100 units; a glyph of `w x h` units is rasterized as a
    /// solid `w * px / 100` by `h * px / 100` block sitting on the baseline.
    pub(crate) struct BoxFont {
        glyphs: HashMap<char, (f32, f32, f32)>,
    }

    impl BoxFont {
        pub(crate) fn new() -> Self {
            Self {
                glyphs: HashMap::new(),
            }
        }

        /// Adds a glyph with a box of `width x height` units and `advance` units.
        pub(crate) fn with(mut self, character: char, width: f32, height: f32, advance: f32) -> Self {
            self.glyphs.insert(character, (width, height, advance));
            self
        }
    }

    impl GlyphSource for BoxFont {
        fn em_size(&self) -> f32 {
            100.0
        }

        fn glyph(&self, character: char) -> Option<GlyphInfo> {
            let &(_, height, advance) = self.glyphs.get(&character)?;
            Some(GlyphInfo {
                advance_width: advance,
                left_side_bearing: 0.0,
                height,
            })
        }

        fn rasterize(&self, character: char, px: f32) -> Option<GlyphBitmap> {
            let &(width, height, _) = self.glyphs.get(&character)?;
            let scale = px / self.em_size();
            let width = (width * scale).round() as usize;
            let height = (height * scale).round() as usize;
            Some(GlyphBitmap {
                width,
                height,
                xmin: 0,
                ymin: 0,
                coverage: vec![255; width * height],
            })
        }

        fn line_metrics(&self, px: f32) -> LineMetrics {
            LineMetrics {
                ascent: px * 0.8,
                descent: -px * 0.2,
                line_gap: 0.0,
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::font_storage::FontStorage;

    /// First system font that parses and maps `'A'`, if any.
    fn system_font() -> Option<std::sync::Arc<fontdue::Font>> {
        let mut storage = FontStorage::new();
        storage.load_system_fonts();
        let ids: Vec<fontdb::ID> = storage.faces().map(|face| face.id).collect();
        ids.into_iter()
            .filter_map(|id| storage.font(id))
            .find(|font| font.lookup_glyph_index('A') != 0)
    }

    #[test]
    fn fontdue_reports_unmapped_characters_as_missing() {
        let Some(font) = system_font() else {
            eprintln!("no system fonts, skipping");
            return;
        };
        let font = font.as_ref();

        // last private use codepoint, not mapped by ordinary fonts
        let unmapped = '\u{10FFFD}';
        if font.lookup_glyph_index(unmapped) != 0 {
            return;
        }
        assert!(GlyphSource::glyph(font, unmapped).is_none());
        assert!(GlyphSource::rasterize(font, unmapped, 32.0).is_none());

        assert!(GlyphSource::glyph(font, 'A').is_some());
        let bitmap = GlyphSource::rasterize(font, 'A', 32.0).unwrap();
        assert!(!bitmap.is_empty());
        assert_eq!(bitmap.coverage.len(), bitmap.width * bitmap.height);
    }

    #[test]
    fn fontdue_metrics_are_in_font_units() {
        let Some(font) = system_font() else {
            eprintln!("no system fonts, skipping");
            return;
        };
        let font = font.as_ref();

        let info = GlyphSource::glyph(font, 'A').unwrap();
        for px in [20.0, 40.0] {
            let scaled = info.advance_width * px / font.em_size();
            let direct = font.metrics('A', px).advance_width;
            assert!((scaled - direct).abs() < 1e-2, "{scaled} vs {direct} at {px}px");
        }

        let small = GlyphSource::line_metrics(font, 20.0);
        let large = GlyphSource::line_metrics(font, 40.0);
        assert!(small.ascent > 0.0);
        assert!((large.ascent - 2.0 * small.ascent).abs() < 1e-2);
        assert!((large.line_height() - 2.0 * small.line_height()).abs() < 1e-2);
    }
}
