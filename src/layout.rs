//! Turning strings into textured quads.
//!
//! Layout is pure: it reads a [`FontAtlas`] and never touches the GPU, so the
//! same [`Layout`] can be iterated every frame or handed to any renderer.

use std::str::Chars;

use euclid::{Box2D, Point2D, UnknownUnit};

use crate::atlas::FontAtlas;

/// One glyph ready to draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    pub character: char,
    /// Pen position on the baseline where this glyph starts.
    pub origin: Point2D<f32, UnknownUnit>,
    /// Screen rectangle of the glyph cell, border included.
    pub rect: Box2D<f32, UnknownUnit>,
    /// Atlas region of the glyph cell.
    pub uv: Box2D<f32, UnknownUnit>,
}

/// Lays out `text` as a single line with the top-left of its line box at
/// `(x, y)`, drawn at `size` pixels.
pub fn layout_string<'a>(text: &'a str, atlas: &'a FontAtlas, x: f32, y: f32, size: f32) -> Layout<'a> {
    Layout {
        text,
        atlas,
        x,
        y,
        size,
    }
}

/// A lazily evaluated line of quads.
///
/// Every call to [`Layout::iter`] (or `into_iter`) starts over from the first
/// character.
#[derive(Clone, Copy, Debug)]
pub struct Layout<'a> {
    text: &'a str,
    atlas: &'a FontAtlas,
    x: f32,
    y: f32,
    size: f32,
}

impl<'a> Layout<'a> {
    pub fn iter(&self) -> Quads<'a> {
        Quads {
            chars: self.text.chars(),
            atlas: self.atlas,
            pen_x: self.x,
            baseline: self.baseline(),
            scale: self.scale(),
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn atlas(&self) -> &'a FontAtlas {
        self.atlas
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    /// Factor from atlas pixels to screen pixels.
    pub fn scale(&self) -> f32 {
        if self.atlas.size > 0.0 {
            self.size / self.atlas.size
        } else {
            0.0
        }
    }

    pub fn baseline(&self) -> f32 {
        self.y + self.atlas.ascent * self.scale()
    }

    pub fn line_height(&self) -> f32 {
        self.atlas.line_height() * self.scale()
    }

    /// Total pen advance of the line. Unknown characters add nothing.
    pub fn measure(&self) -> f32 {
        let scale = self.scale();
        self.text
            .chars()
            .filter_map(|c| self.atlas.metrics(c))
            .map(|m| m.x_advance * scale)
            .sum()
    }

    /// Bounding box of the line box, from the top of the ascent to the
    /// bottom of the descent.
    pub fn bounds(&self) -> Box2D<f32, UnknownUnit> {
        let scale = self.scale();
        let height = (self.atlas.ascent - self.atlas.descent) * scale;
        Box2D::new(
            Point2D::new(self.x, self.y),
            Point2D::new(self.x + self.measure(), self.y + height),
        )
    }
}

impl<'a> IntoIterator for Layout<'a> {
    type Item = Quad;
    type IntoIter = Quads<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &Layout<'a> {
    type Item = Quad;
    type IntoIter = Quads<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the quads of a [`Layout`].
#[derive(Clone, Debug)]
pub struct Quads<'a> {
    chars: Chars<'a>,
    atlas: &'a FontAtlas,
    pen_x: f32,
    baseline: f32,
    scale: f32,
}

impl Iterator for Quads<'_> {
    type Item = Quad;

    fn next(&mut self) -> Option<Quad> {
        loop {
            let character = self.chars.next()?;
            let Some(metrics) = self.atlas.metrics(character) else {
                continue;
            };

            let origin = Point2D::new(self.pen_x, self.baseline);
            let min = Point2D::new(
                origin.x + metrics.cell_left * self.scale,
                origin.y + metrics.cell_top * self.scale,
            );
            let max = Point2D::new(
                min.x + metrics.cell_width * self.scale,
                min.y + metrics.cell_height * self.scale,
            );
            self.pen_x += metrics.x_advance * self.scale;

            return Some(Quad {
                character,
                origin,
                rect: Box2D::new(min, max),
                uv: metrics.uv(),
            });
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.chars.size_hint().1)
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::AtlasBuilder;
    use crate::config::AtlasConfig;
    use crate::glyph_source::test_font::BoxFont;

    fn atlas() -> FontAtlas {
        let font = BoxFont::new()
            .with('A', 50.0, 70.0, 60.0)
            .with('B', 40.0, 70.0, 55.0);
        let config = AtlasConfig {
            font_size: 20.0,
            characters: vec!['A', 'B'],
            ..AtlasConfig::with_spread(20.0, 3)
        };
        AtlasBuilder::new(config).build_cpu(&font).unwrap()
    }

    #[test]
    fn second_quad_is_offset_by_scaled_advance() {
        let atlas = atlas();
        let size = 40.0;
        let quads: Vec<Quad> = layout_string("AB", &atlas, 0.0, 0.0, size).into_iter().collect();
        assert_eq!(quads.len(), 2);

        let advance_a = atlas.metrics('A').unwrap().x_advance;
        let offset = quads[1].origin.x - quads[0].origin.x;
        assert!((offset - advance_a * size / atlas.size).abs() < 1e-4);
        assert_eq!(quads[0].origin.y, quads[1].origin.y);
    }

    #[test]
    fn empty_string_yields_no_quads() {
        let atlas = atlas();
        let layout = layout_string("", &atlas, 10.0, 10.0, 32.0);
        assert_eq!(layout.iter().count(), 0);
        assert_eq!(layout.measure(), 0.0);
    }

    #[test]
    fn unknown_characters_are_skipped_without_advancing() {
        let atlas = atlas();
        let with_gap: Vec<Quad> = layout_string("A\u{2603}B", &atlas, 5.0, 0.0, 20.0)
            .into_iter()
            .collect();
        let without: Vec<Quad> = layout_string("AB", &atlas, 5.0, 0.0, 20.0)
            .into_iter()
            .collect();

        assert_eq!(with_gap.len(), 2);
        assert_eq!(with_gap, without);
        assert_eq!(with_gap[1].character, 'B');
    }

    #[test]
    fn layout_restarts_on_every_iteration() {
        let atlas = atlas();
        let layout = layout_string("ABBA", &atlas, 0.0, 0.0, 24.0);
        let first: Vec<Quad> = layout.iter().collect();
        let second: Vec<Quad> = (&layout).into_iter().collect();
        let third: Vec<Quad> = layout.into_iter().collect();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn quads_sit_on_the_baseline() {
        let atlas = atlas();
        let layout = layout_string("A", &atlas, 3.0, 7.0, 20.0);
        let quad = layout.iter().next().unwrap();
        let metrics = atlas.metrics('A').unwrap();

        // same size as the atlas: scale 1
        assert_eq!(layout.baseline(), 7.0 + atlas.ascent);
        assert_eq!(quad.origin, Point2D::new(3.0, layout.baseline()));
        assert_eq!(quad.rect.min.x, 3.0 + metrics.cell_left);
        assert_eq!(quad.rect.min.y, layout.baseline() + metrics.cell_top);
        assert_eq!(quad.rect.width(), metrics.cell_width);
        assert_eq!(quad.rect.height(), metrics.cell_height);
        // glyph bottom (cell bottom minus border) rests on the baseline
        assert_eq!(quad.rect.max.y - atlas.border as f32, layout.baseline());
        assert_eq!(quad.uv, metrics.uv());
    }

    #[test]
    fn measure_matches_pen_advance() {
        let atlas = atlas();
        let layout = layout_string("ABAB", &atlas, 0.0, 0.0, 10.0);
        let expected = (atlas.metrics('A').unwrap().x_advance
            + atlas.metrics('B').unwrap().x_advance)
            * 2.0
            * 0.5;
        assert!((layout.measure() - expected).abs() < 1e-4);
        assert!((layout.bounds().width() - expected).abs() < 1e-4);
    }

    #[test]
    fn geometry_scales_with_requested_size() {
        let atlas = atlas();
        let small = layout_string("A", &atlas, 0.0, 0.0, 10.0).iter().next().unwrap();
        let large = layout_string("A", &atlas, 0.0, 0.0, 40.0).iter().next().unwrap();
        assert!((large.rect.width() - 4.0 * small.rect.width()).abs() < 1e-4);
        assert_eq!(large.uv, small.uv);
    }
}
