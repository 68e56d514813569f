// ============================================================================
// DRAWING SURFACE — ordered layers, background, mode, selection, compositing
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::layer::{CompositeOp, CropRect, Layer, LayerId, LayerKind, Mode, Origin, Transform};
use crate::ops::crop::CropHelpers;
use crate::ops::text::{FontBook, parse_hex_color, rasterize_text};
use crate::ops::transform::{Placement, draw_image, fill_rect, stroke_rect};

/// Dimming colour of the crop overlay.
const CROP_OVERLAY_COLOR: Rgba<u8> = Rgba([0, 0, 0, 128]);
/// Outline colour of the crop window.
const CROP_WINDOW_COLOR: Rgba<u8> = Rgba([42, 67, 101, 255]);
const CROP_WINDOW_STROKE: f32 = 2.0;

// ============================================================================
// BACKGROUND
// ============================================================================

/// How a background image is scaled onto the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BackgroundFit {
    /// `(surface / natural) * factor` per axis.
    Relative(f32),
    /// Fixed scale factor on both axes.
    Absolute(f32),
}

impl BackgroundFit {
    /// Per-axis scale for an image of `natural` size on a `surface`-sized canvas.
    pub fn scale_for(&self, surface: (u32, u32), natural: (u32, u32)) -> (f32, f32) {
        match *self {
            BackgroundFit::Absolute(f) => (f, f),
            BackgroundFit::Relative(f) => {
                let sx = surface.0 as f32 / natural.0.max(1) as f32;
                let sy = surface.1 as f32 / natural.1.max(1) as f32;
                (sx * f, sy * f)
            }
        }
    }

    /// Parse `absolute:0.35` / `relative:0.9`.
    pub fn from_config_string(s: &str) -> Option<Self> {
        let (kind, value) = s.trim().split_once(':')?;
        let v: f32 = value.trim().parse().ok()?;
        if v <= 0.0 {
            return None;
        }
        match kind.trim().to_lowercase().as_str() {
            "absolute" => Some(BackgroundFit::Absolute(v)),
            "relative" => Some(BackgroundFit::Relative(v)),
            _ => None,
        }
    }

    pub fn to_config_string(&self) -> String {
        match self {
            BackgroundFit::Absolute(v) => format!("absolute:{}", v),
            BackgroundFit::Relative(v) => format!("relative:{}", v),
        }
    }
}

/// The product mockup drawn beneath every layer.
#[derive(Clone, Debug)]
pub struct Background {
    pub src: String,
    pub mode: Mode,
    pub image: Arc<RgbaImage>,
    /// Center of the image on the surface.
    pub left: f32,
    pub top: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub opacity: f32,
}

impl Background {
    fn transform(&self) -> Transform {
        Transform {
            left: self.left,
            top: self.top,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            angle: 0.0,
            origin: Origin::Center,
            dirty: false,
        }
    }
}

// ============================================================================
// SELECTION
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Layer(LayerId),
    /// The interactive crop window of an open crop session.
    CropWindow,
}

// ============================================================================
// DRAWING SURFACE
// ============================================================================

#[derive(Clone, Debug)]
pub struct DrawingSurface {
    pub width: u32,
    pub height: u32,
    /// Bottom to top.
    pub layers: Vec<Layer>,
    pub background: Option<Background>,
    mode: Mode,
    pub selection: Selection,
    pub crop_helpers: Option<CropHelpers>,
    /// Bumped by every re-render request.
    render_generation: u64,
}

impl DrawingSurface {
    pub fn new(width: u32, height: u32, mode: Mode) -> Self {
        Self {
            width,
            height,
            layers: Vec::new(),
            background: None,
            mode,
            selection: Selection::None,
            crop_helpers: None,
            render_generation: 0,
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width as f32 * 0.5, self.height as f32 * 0.5)
    }

    pub fn find(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn find_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        match self.selection {
            Selection::Layer(id) => self.find(id),
            _ => None,
        }
    }

    /// Switch the current mode and recompute every layer's visibility.
    /// Does not touch the selection or request a render.
    pub fn apply_mode_visibility(&mut self, mode: Mode) {
        for layer in &mut self.layers {
            layer.visible = *layer.mode() == mode;
        }
        self.mode = mode;
    }

    pub fn request_render(&mut self) {
        self.render_generation = self.render_generation.wrapping_add(1);
    }

    pub fn render_generation(&self) -> u64 {
        self.render_generation
    }

    /// Center `image` on the surface scaled by `fit`, full opacity.
    pub fn place_background(&mut self, src: &str, mode: Mode, image: Arc<RgbaImage>, fit: BackgroundFit) {
        let (scale_x, scale_y) = fit.scale_for((self.width, self.height), image.dimensions());
        let (left, top) = self.center();
        self.background = Some(Background {
            src: src.to_string(),
            mode,
            image,
            left,
            top,
            scale_x,
            scale_y,
            opacity: 1.0,
        });
    }

    /// Font families used by text layers, for preloading into a [`FontBook`].
    pub fn font_families(&self) -> BTreeSet<String> {
        self.layers
            .iter()
            .filter_map(|l| l.as_text().map(|t| t.font_family.clone()))
            .collect()
    }

    /// Measure every text layer against `fonts` so bounds match the pixels
    /// [`composite`](Self::composite) draws.
    pub fn measure_text(&mut self, fonts: &FontBook) {
        for text in self.layers.iter_mut().filter_map(Layer::as_text_mut) {
            text.measure(fonts);
        }
    }

    /// Rasterize the surface: background, visible layers bottom to top,
    /// then the crop overlay and window if a crop session is open.
    pub fn composite(&self, fonts: &FontBook) -> RgbaImage {
        let mut out = RgbaImage::new(self.width.max(1), self.height.max(1));

        if let Some(bg) = &self.background {
            let (w, h) = bg.image.dimensions();
            let placement = Placement {
                transform: bg.transform(),
                opacity: bg.opacity,
                composite: CompositeOp::SourceOver,
            };
            draw_image(&mut out, &bg.image, CropRect::full(w, h), &placement);
        }

        for layer in self.layers.iter().filter(|l| l.visible) {
            let placement = Placement {
                transform: layer.transform,
                opacity: layer.opacity,
                composite: layer.composite,
            };
            match &layer.kind {
                LayerKind::Image(img) => {
                    let Some(pixels) = img.pixels() else {
                        tracing::warn!(layer = %layer.id, src = %img.src, "image layer has no pixels; skipped");
                        continue;
                    };
                    draw_image(&mut out, pixels, img.crop, &placement);
                }
                LayerKind::Text(text) => {
                    let Some(font) = fonts.resolve(&text.font_family) else { continue };
                    let fill = parse_hex_color(&text.fill).unwrap_or(Rgba([0, 0, 0, 255]));
                    let glyphs = rasterize_text(font, &text.content, text.font_size, fill);
                    let (w, h) = glyphs.dimensions();
                    draw_image(&mut out, &glyphs, CropRect::full(w, h), &placement);
                }
            }
        }

        if let Some(helpers) = &self.crop_helpers {
            fill_rect(&mut out, helpers.overlay.bounds(), CROP_OVERLAY_COLOR);
            stroke_rect(&mut out, helpers.window.bounds(), CROP_WINDOW_COLOR, CROP_WINDOW_STROKE);
        }
        out
    }
}
