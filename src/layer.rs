// ============================================================================
// LAYER MODEL — ids, modes, transforms, text/image payloads
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::ops::filters::{self, ImageFilter};
use crate::ops::text::{FontBook, measure_text};

// ============================================================================
// MODE
// ============================================================================

/// A named product view ("front", "back", ...). Layers are tagged with the
/// mode that was active when they were created.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mode(String);

impl Mode {
    pub fn new(name: impl Into<String>) -> Self {
        Mode(name.into())
    }

    pub fn front() -> Self {
        Mode("front".to_string())
    }

    pub fn back() -> Self {
        Mode("back".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::front()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Mode {
    fn from(s: &str) -> Self {
        Mode(s.to_string())
    }
}

// ============================================================================
// LAYER IDS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time-based id source. Ids are wall-clock milliseconds, bumped past the
/// last issued value so bursts within one millisecond stay unique.
#[derive(Clone, Debug, Default)]
pub struct LayerIdGenerator {
    last: u64,
}

impl LayerIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> LayerId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let id = now.max(self.last + 1);
        self.last = id;
        LayerId(id)
    }

    /// Make sure future ids never collide with `id` (used after loading a document).
    pub fn observe(&mut self, id: LayerId) {
        self.last = self.last.max(id.0);
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Which point of the layer box `left`/`top` refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Origin {
    #[default]
    TopLeft,
    Center,
}

/// Placement of a layer on the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub left: f32,
    pub top: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Clockwise rotation in degrees around the layer's origin point.
    pub angle: f32,
    pub origin: Origin,
    /// Set when the cached rendering of the layer is stale.
    pub dirty: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
            origin: Origin::TopLeft,
            dirty: false,
        }
    }
}

/// Axis-aligned rectangle in surface coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Bounds {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// True if `other` lies entirely inside `self` (with `eps` slack).
    pub fn contains(&self, other: &Bounds, eps: f32) -> bool {
        other.left >= self.left - eps
            && other.top >= self.top - eps
            && other.right() <= self.right() + eps
            && other.bottom() <= self.bottom() + eps
    }
}

/// Visible sub-region of an image, in source (unscaled) pixels.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0.0, y: 0.0, width: width as f32, height: height as f32 }
    }
}

/// How a layer's pixels combine with what is already drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompositeOp {
    /// Plain alpha-over.
    SourceOver,
    /// Only draw where the destination already has coverage, so designs are
    /// clipped to the product mockup underneath.
    #[default]
    SourceAtop,
}

impl CompositeOp {
    pub fn name(&self) -> &'static str {
        match self {
            CompositeOp::SourceOver => "source-over",
            CompositeOp::SourceAtop => "source-atop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "source-over" => Some(CompositeOp::SourceOver),
            "source-atop" => Some(CompositeOp::SourceAtop),
            _ => None,
        }
    }
}

/// Which transform handles the editor shows for a layer. New layers hide
/// the four side handles so only proportional corner scaling is offered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlsVisibility {
    pub mt: bool,
    pub mb: bool,
    pub ml: bool,
    pub mr: bool,
}

impl Default for ControlsVisibility {
    fn default() -> Self {
        Self { mt: false, mb: false, ml: false, mr: false }
    }
}

// ============================================================================
// LAYER PAYLOADS
// ============================================================================

#[derive(Clone, Debug)]
pub struct TextProps {
    pub content: String,
    pub font_size: f32,
    pub font_family: String,
    /// `#rrggbb` or `#rrggbbaa`
    pub fill: String,
    /// Glyph block size from the last [`measure`](TextProps::measure).
    /// Not persisted.
    pub measured: Option<(f32, f32)>,
}

impl TextProps {
    pub fn new(content: impl Into<String>, font_size: f32, font_family: impl Into<String>, fill: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            font_size,
            font_family: font_family.into(),
            fill: fill.into(),
            measured: None,
        }
    }

    /// Layout estimate for text that has not been measured yet.
    pub fn estimated_size(&self) -> (f32, f32) {
        let longest = self
            .content
            .split('\n')
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0);
        let lines = self.content.split('\n').count().max(1);
        (
            longest as f32 * self.font_size * 0.6,
            lines as f32 * self.font_size * 1.16,
        )
    }

    /// Unscaled box size: the rasterized block once measured.
    pub fn size(&self) -> (f32, f32) {
        self.measured.unwrap_or_else(|| self.estimated_size())
    }

    /// Record the size of the block the rasterizer draws with `fonts`.
    pub fn measure(&mut self, fonts: &FontBook) {
        if let Some(font) = fonts.resolve(&self.font_family) {
            let (w, h) = measure_text(font, &self.content, self.font_size);
            self.measured = Some((w as f32, h as f32));
        }
    }
}

impl PartialEq for TextProps {
    fn eq(&self, other: &Self) -> bool {
        self.content == other.content
            && self.font_size == other.font_size
            && self.font_family == other.font_family
            && self.fill == other.fill
    }
}

#[derive(Clone, Debug)]
pub struct ImageProps {
    pub src: String,
    pub natural_width: u32,
    pub natural_height: u32,
    pub crop: CropRect,
    pub cropped: bool,
    pub filters: Vec<ImageFilter>,
    /// Decoded source pixels. Not persisted; reloaded from `src`.
    pub element: Option<Arc<RgbaImage>>,
    /// `element` with the filter stack applied.
    pub filtered: Option<Arc<RgbaImage>>,
}

impl ImageProps {
    /// Wrap freshly decoded pixels, showing the whole image.
    pub fn from_element(src: &str, element: Arc<RgbaImage>) -> Self {
        let (w, h) = element.dimensions();
        Self {
            src: src.to_string(),
            natural_width: w,
            natural_height: h,
            crop: CropRect::full(w, h),
            cropped: false,
            filters: Vec::new(),
            element: Some(element),
            filtered: None,
        }
    }

    /// Pixels to draw: the filtered image if any filter is active.
    pub fn pixels(&self) -> Option<&Arc<RgbaImage>> {
        self.filtered.as_ref().or(self.element.as_ref())
    }

    /// Rebuild `filtered` from `element` running the whole stack in order.
    pub fn apply_filters(&mut self) {
        self.filtered = match &self.element {
            Some(src) if !self.filters.is_empty() => {
                Some(Arc::new(filters::apply_stack(src, &self.filters)))
            }
            _ => None,
        };
    }

    pub fn has_filter(&self, filter: ImageFilter) -> bool {
        self.filters.contains(&filter)
    }
}

impl PartialEq for ImageProps {
    // Pixel buffers are derived from `src`; compare the persisted state only.
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src
            && self.natural_width == other.natural_width
            && self.natural_height == other.natural_height
            && self.crop == other.crop
            && self.cropped == other.cropped
            && self.filters == other.filters
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LayerKind {
    Text(TextProps),
    Image(ImageProps),
}

impl LayerKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            LayerKind::Text(_) => "text",
            LayerKind::Image(_) => "image",
        }
    }
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub kind: LayerKind,
    mode: Mode,
    pub transform: Transform,
    /// Derived from `mode` vs. the surface mode; never persisted.
    pub visible: bool,
    pub selectable: bool,
    pub opacity: f32,
    pub composite: CompositeOp,
    pub controls: ControlsVisibility,
}

impl Layer {
    pub fn new(id: LayerId, kind: LayerKind, mode: Mode, transform: Transform) -> Self {
        Self {
            id,
            kind,
            mode,
            transform,
            visible: true,
            selectable: true,
            opacity: 1.0,
            composite: CompositeOp::default(),
            controls: ControlsVisibility::default(),
        }
    }

    /// The view this layer belongs to. Fixed at creation.
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, LayerKind::Image(_))
    }

    pub fn as_image(&self) -> Option<&ImageProps> {
        match &self.kind {
            LayerKind::Image(img) => Some(img),
            LayerKind::Text(_) => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextProps> {
        match &mut self.kind {
            LayerKind::Text(t) => Some(t),
            LayerKind::Image(_) => None,
        }
    }

    pub fn as_image_mut(&mut self) -> Option<&mut ImageProps> {
        match &mut self.kind {
            LayerKind::Image(img) => Some(img),
            LayerKind::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextProps> {
        match &self.kind {
            LayerKind::Text(t) => Some(t),
            LayerKind::Image(_) => None,
        }
    }

    /// Unscaled box size. Images use their crop extent.
    pub fn size(&self) -> (f32, f32) {
        match &self.kind {
            LayerKind::Image(img) => (img.crop.width, img.crop.height),
            LayerKind::Text(text) => text.size(),
        }
    }

    pub fn scaled_width(&self) -> f32 {
        self.size().0 * self.transform.scale_x
    }

    pub fn scaled_height(&self) -> f32 {
        self.size().1 * self.transform.scale_y
    }

    /// Unrotated bounding box on the surface.
    pub fn bounds(&self) -> Bounds {
        let (w, h) = (self.scaled_width(), self.scaled_height());
        let (left, top) = match self.transform.origin {
            Origin::TopLeft => (self.transform.left, self.transform.top),
            Origin::Center => (self.transform.left - w * 0.5, self.transform.top - h * 0.5),
        };
        Bounds { left, top, width: w, height: h }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_generator_is_strictly_increasing() {
        let mut ids = LayerIdGenerator::new();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn observed_ids_are_never_reissued() {
        let mut ids = LayerIdGenerator::new();
        let far_future = LayerId(u64::MAX / 2);
        ids.observe(far_future);
        assert!(ids.next_id() > far_future);
    }

    #[test]
    fn center_origin_bounds() {
        let text = TextProps::new("abcd", 10.0, "Roboto", "#000000");
        let transform = Transform { left: 100.0, top: 50.0, origin: Origin::Center, ..Default::default() };
        let layer = Layer::new(LayerId(1), LayerKind::Text(text), Mode::front(), transform);
        let b = layer.bounds();
        assert!((b.left + b.width * 0.5 - 100.0).abs() < 1e-4);
        assert!((b.top + b.height * 0.5 - 50.0).abs() < 1e-4);
    }

    #[test]
    fn measured_text_bounds_match_rasterized_block() {
        let fonts = FontBook::default();
        let mut text = TextProps::new("Bounds", 40.0, "Roboto", "#000000");
        text.measure(&fonts);
        let block = crate::ops::text::rasterize_text(fonts.resolve("Roboto").unwrap(), "Bounds", 40.0, image::Rgba([0, 0, 0, 255]));

        let transform = Transform { left: 100.0, top: 50.0, scale_x: 2.0, origin: Origin::Center, ..Default::default() };
        let layer = Layer::new(LayerId(1), LayerKind::Text(text), Mode::front(), transform);
        let b = layer.bounds();
        assert_eq!((b.width, b.height), (block.width() as f32 * 2.0, block.height() as f32));
        assert_eq!(b.left, 100.0 - block.width() as f32);
    }

    #[test]
    fn image_bounds_follow_crop_and_scale() {
        let element = Arc::new(RgbaImage::new(200, 100));
        let mut img = ImageProps::from_element("mem://a", element);
        img.crop = CropRect { x: 10.0, y: 10.0, width: 50.0, height: 20.0 };
        let transform = Transform { left: 5.0, top: 6.0, scale_x: 2.0, scale_y: 3.0, ..Default::default() };
        let layer = Layer::new(LayerId(1), LayerKind::Image(img), Mode::front(), transform);
        assert_eq!(layer.bounds(), Bounds { left: 5.0, top: 6.0, width: 100.0, height: 60.0 });
    }
}
