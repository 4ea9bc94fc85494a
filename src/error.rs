use core::fmt;

/// A packer input that cannot be placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackingError {
    /// The rectangle at `index` has a zero width or height.
    NonPositiveSize {
        index: usize,
        width: u32,
        height: u32,
    },
}

impl fmt::Display for PackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveSize {
                index,
                width,
                height,
            } => write!(
                f,
                "rectangle {index} has non-positive size {width}x{height}"
            ),
        }
    }
}

impl core::error::Error for PackingError {}

/// Errors that abort an atlas build.
///
/// Missing glyphs are not errors: they are skipped during the build and
/// omitted during layout.
#[derive(Clone, Debug, PartialEq)]
pub enum AtlasError {
    /// A glyph cell could not be packed.
    Packing(PackingError),
    /// A shader stage or pipeline failed validation. Holds the native diagnostic.
    ShaderCompilation(String),
    /// The border reserved around each glyph is narrower than the distance radius.
    PaddingViolation { border: u32, max_distance: f32 },
    /// A glyph bitmap does not fit inside its packed cell.
    GlyphOutsideCell { character: char },
    /// A configuration value is out of range.
    InvalidConfig(&'static str),
    /// A GPU resource could not be read back.
    Gpu(String),
    /// The font is not in the storage or its data failed to load.
    FontUnavailable(fontdb::ID),
}

impl fmt::Display for AtlasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packing(e) => write!(f, "packing failed: {e}"),
            Self::ShaderCompilation(log) => write!(f, "shader compilation failed: {log}"),
            Self::PaddingViolation {
                border,
                max_distance,
            } => write!(
                f,
                "glyph border {border}px is smaller than the distance radius {max_distance}px"
            ),
            Self::GlyphOutsideCell { character } => {
                write!(f, "glyph {character:?} does not fit inside its atlas cell")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid atlas config: {msg}"),
            Self::Gpu(msg) => write!(f, "gpu error: {msg}"),
            Self::FontUnavailable(id) => write!(f, "font {id:?} is not available"),
        }
    }
}

impl core::error::Error for AtlasError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Packing(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PackingError> for AtlasError {
    fn from(e: PackingError) -> Self {
        Self::Packing(e)
    }
}
