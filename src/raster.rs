use crate::error::AtlasError;
use crate::glyph_source::GlyphBitmap;
use crate::packer::PackedRect;

/// Single-channel L8 bitmap covering the whole atlas.
///
/// Pixels are arranged in row-major order with the origin at the top-left.
/// `0` is background and `255` is fully inside a glyph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageBitmap {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl CoverageBitmap {
    pub fn new(width: usize, height: usize) -> Self {
        let len = width.saturating_mul(height);
        Self {
            width,
            height,
            pixels: vec![0; len],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// Returns row `y`, or `None` if it is out of range.
    pub fn row_mut(&mut self, y: usize) -> Option<&mut [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.width;
        self.pixels.get_mut(start..start + self.width)
    }

    /// Copies `glyph` into the cell `rect`, offset by `border` on each side.
    ///
    /// Only pixels inside the cell are written. Fails if the glyph does not
    /// fit inside the cell minus its border, which would let neighbouring
    /// fields bleed into each other.
    pub fn blit<Id>(
        &mut self,
        glyph: &GlyphBitmap,
        rect: &PackedRect<Id>,
        border: u32,
        character: char,
    ) -> Result<(), AtlasError> {
        let border = border as usize;
        let inner_width = (rect.width as usize).saturating_sub(2 * border);
        let inner_height = (rect.height as usize).saturating_sub(2 * border);
        if glyph.width > inner_width
            || glyph.height > inner_height
            || rect.right() as usize > self.width
            || rect.bottom() as usize > self.height
        {
            return Err(AtlasError::GlyphOutsideCell { character });
        }
        if glyph.is_empty() {
            return Ok(());
        }

        let left = rect.x as usize + border;
        let top = rect.y as usize + border;
        for (row, src) in glyph
            .coverage
            .chunks_exact(glyph.width)
            .take(glyph.height)
            .enumerate()
        {
            let Some(dst) = self.row_mut(top + row) else {
                return Err(AtlasError::GlyphOutsideCell { character });
            };
            dst[left..left + glyph.width].copy_from_slice(src);
        }

        Ok(())
    }

    /// Smallest distance from any inside pixel within `rect` to the edge of
    /// `rect`, or `None` if the cell is empty.
    pub fn cell_clearance<Id>(&self, rect: &PackedRect<Id>, threshold: u8) -> Option<u32> {
        let mut clearance: Option<u32> = None;
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                if self.get(x as usize, y as usize)? < threshold {
                    continue;
                }
                let edge = (x - rect.x)
                    .min(rect.right() - 1 - x)
                    .min(y - rect.y)
                    .min(rect.bottom() - 1 - y);
                clearance = Some(clearance.map_or(edge, |c| c.min(edge)));
            }
        }
        clearance
    }
}
