#[cfg(feature = "wgpu")]
pub mod wgpu_renderer;

#[cfg(feature = "wgpu")]
pub use wgpu_renderer::{AtlasTexture, TextRenderer, TextRun};
