// ============================================================================
// OPS MODULE — editing operations on a DrawingSurface
// ============================================================================
//
// Layout:
//   layers.rs    — layer registry: add, select, remove, duplicate, filters
//   mode.rs      — mode visibility and background swaps
//   crop.rs      — crop window state machine
//   filters.rs   — named image filter registry
//   text.rs      — fonts and glyph rasterization
//   transform.rs — affine raster drawing and compositing
// ============================================================================

pub mod crop;
pub mod filters;
pub mod layers;
pub mod mode;
pub mod text;
pub mod transform;

pub use crop::CropPhase;
pub use filters::ImageFilter;
pub use mode::ModeBackgrounds;
