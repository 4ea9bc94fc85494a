//! # Fude
//!
//! Signed distance field glyph atlases for scalable text rendering.
//!
//! ## Overview
//!
//! An atlas is built once per font and size: every glyph is rasterized,
//! packed into a single bitmap with a border around it, and the bitmap is
//! turned into a signed distance field with the jump flooding algorithm
//! (on the CPU, or on the GPU with the `wgpu` feature). Text is then laid out
//! as quads that sample the atlas, and a single threshold shader draws it
//! crisply at any size.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fude::{AtlasConfig, FontSystem, layout::layout_string};
//!
//! let font_system = FontSystem::new();
//! font_system.load_system_fonts();
//!
//! let query = fude::fontdb::Query {
//!     families: &[fude::fontdb::Family::SansSerif],
//!     ..Default::default()
//! };
//! let font_id = font_system.query(&query).expect("no sans-serif font");
//! let atlas = font_system
//!     .atlas(font_id, &AtlasConfig::default())
//!     .expect("atlas build failed");
//!
//! for quad in layout_string("Hello", &atlas, 10.0, 10.0, 24.0) {
//!     let (_rect, _uv) = (quad.rect, quad.uv);
//! }
//! ```
//!
//! ## Features
//!
//! *   **`wgpu`**: compute shader distance transform, atlas texture upload and
//!     an instanced SDF text renderer.
//! *   **`debug-image`**: writes the finished atlas to a PNG when
//!     [`AtlasConfig::debug_image`] is set.

pub mod atlas;
pub mod config;
pub mod error;
pub mod font_storage;
pub mod font_system;
pub mod glyph_source;
#[cfg(feature = "wgpu")]
pub mod gpu;
pub mod layout;
pub mod packer;
pub mod raster;
pub mod renderer;
pub mod sdf;

// common re-exports
pub use atlas::{AtlasBuilder, CharacterMetrics, FontAtlas};
pub use config::{AtlasConfig, FieldMode};
pub use error::{AtlasError, PackingError};
pub use font_storage::FontStorage;
pub use font_system::FontSystem;
pub use glyph_source::GlyphSource;
pub use layout::{Layout, Quad, layout_string};
pub use sdf::{CpuDistanceTransform, DistanceField, DistanceTransform};

// re-export dependencies
pub use fontdb;
pub use fontdue;
pub use parking_lot;

#[cfg(feature = "wgpu")]
pub use wgpu;
