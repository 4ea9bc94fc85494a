use std::path::PathBuf;

use crate::error::AtlasError;
use crate::sdf::SdfParams;

/// Largest accepted [`AtlasConfig::border`].
pub const MAX_BORDER: u32 = 4096;

/// What the atlas texture stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FieldMode {
    /// Jump-flooded signed distance field. Scales to any display size.
    #[default]
    SignedDistance,
    /// Raw antialiased coverage. No distance transform is run; only sharp at
    /// sizes close to the build size.
    Coverage,
}

/// Configuration for building a [`FontAtlas`](crate::atlas::FontAtlas).
#[derive(Clone, Debug, PartialEq)]
pub struct AtlasConfig {
    /// Pixel size the glyphs are rasterized at.
    pub font_size: f32,
    /// Empty pixels reserved on every side of each glyph cell.
    ///
    /// Must be at least the larger of the two distance radii, otherwise the
    /// field of one glyph would reach into its neighbour.
    pub border: u32,
    /// Distance (pixels) at which the field saturates inside a glyph.
    pub max_distance_inside: f32,
    /// Distance (pixels) at which the field saturates outside a glyph.
    pub max_distance_outside: f32,
    /// Coverage values at or above this count as inside.
    pub coverage_threshold: u8,
    /// Characters to put in the atlas, in packing order.
    pub characters: Vec<char>,
    pub mode: FieldMode,
    /// Where to write a grayscale PNG of the finished atlas.
    ///
    /// Only honoured with the `debug-image` feature.
    pub debug_image: Option<PathBuf>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            font_size: 64.0,
            border: 8,
            max_distance_inside: 8.0,
            max_distance_outside: 8.0,
            coverage_threshold: 128,
            characters: (' '..='~').collect(),
            mode: FieldMode::SignedDistance,
            debug_image: None,
        }
    }
}

impl AtlasConfig {
    /// Creates a config for `font_size` with a border and distance radius of
    /// `spread` pixels.
    pub fn with_spread(font_size: f32, spread: u32) -> Self {
        Self {
            font_size,
            border: spread,
            max_distance_inside: spread as f32,
            max_distance_outside: spread as f32,
            ..Default::default()
        }
    }

    /// The larger of the two distance radii.
    pub fn max_distance(&self) -> f32 {
        self.max_distance_inside.max(self.max_distance_outside)
    }

    /// Checks the invariants an atlas build relies on.
    pub fn validate(&self) -> Result<(), AtlasError> {
        if !(self.font_size > 0.0) || !self.font_size.is_finite() {
            return Err(AtlasError::InvalidConfig("font_size must be positive"));
        }
        if !(self.max_distance_inside > 0.0) || !(self.max_distance_outside > 0.0) {
            return Err(AtlasError::InvalidConfig("distance radii must be positive"));
        }
        if self.coverage_threshold == 0 {
            return Err(AtlasError::InvalidConfig(
                "coverage_threshold of 0 marks every pixel as inside",
            ));
        }

        if self.border > MAX_BORDER {
            return Err(AtlasError::InvalidConfig("border exceeds MAX_BORDER"));
        }

        let max_distance = self.max_distance();
        if (self.border as f32) < max_distance.ceil() {
            return Err(AtlasError::PaddingViolation {
                border: self.border,
                max_distance,
            });
        }

        Ok(())
    }

    pub fn sdf_params(&self) -> SdfParams {
        SdfParams {
            max_distance_inside: self.max_distance_inside,
            max_distance_outside: self.max_distance_outside,
            coverage_threshold: self.coverage_threshold,
        }
    }
}
