// ============================================================================
// DOCUMENT — portable JSON form of a drawing surface
// ============================================================================
//
// Field names follow the object format the storefront already stores
// (`scaleX`, `cropX`, `globalCompositeOperation`, ...), plus the editor's
// own `mode`, `layerId`, `layerType` and `_controlsVisibility` fields.
// Decoded pixels are never stored; images are reloaded from `src`.
// ============================================================================

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::canvas::{Background, DrawingSurface};
use crate::error::{EditorError, Result};
use crate::io::ImageLoader;
use crate::layer::{
    CompositeOp, ControlsVisibility, CropRect, ImageProps, Layer, LayerId, LayerKind, Mode, Origin, TextProps,
    Transform,
};
use crate::ops::filters::ImageFilter;

pub const DOCUMENT_VERSION: &str = "1.0";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub version: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<BackgroundRef>,
    #[serde(default)]
    pub objects: Vec<LayerRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundRef {
    pub src: String,
    pub mode: Mode,
    pub left: f32,
    pub top: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    #[serde(default = "one")]
    pub opacity: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterRecord {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRecord {
    pub left: f32,
    pub top: f32,
    #[serde(default = "one")]
    pub scale_x: f32,
    #[serde(default = "one")]
    pub scale_y: f32,
    #[serde(default)]
    pub angle: f32,
    #[serde(default = "left_str")]
    pub origin_x: String,
    #[serde(default = "top_str")]
    pub origin_y: String,
    #[serde(default = "one")]
    pub opacity: f32,
    #[serde(default = "source_atop")]
    pub global_composite_operation: String,

    pub mode: Mode,
    pub layer_id: LayerId,
    pub layer_type: String,
    #[serde(rename = "_controlsVisibility", default)]
    pub controls_visibility: ControlsVisibility,

    // text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,

    // image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_y: Option<f32>,
    /// Crop extent in source pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cropped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<FilterRecord>>,
}

fn one() -> f32 {
    1.0
}

fn left_str() -> String {
    "left".to_string()
}

fn top_str() -> String {
    "top".to_string()
}

fn source_atop() -> String {
    CompositeOp::SourceAtop.name().to_string()
}

impl Document {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// SURFACE → DOCUMENT
// ============================================================================

/// Serialize the surface. A layer under an open crop session is written as
/// it was before the session; the crop helpers are never written.
pub fn to_document(surface: &DrawingSurface) -> Document {
    let objects = surface
        .layers
        .iter()
        .map(|layer| match &surface.crop_helpers {
            Some(h) if h.target == layer.id => layer_record(&h.snapshot),
            _ => layer_record(layer),
        })
        .collect();
    Document {
        version: DOCUMENT_VERSION.to_string(),
        width: surface.width,
        height: surface.height,
        mode: surface.mode().clone(),
        background: surface.background.as_ref().map(background_ref),
        objects,
    }
}

fn background_ref(bg: &Background) -> BackgroundRef {
    BackgroundRef {
        src: bg.src.clone(),
        mode: bg.mode.clone(),
        left: bg.left,
        top: bg.top,
        scale_x: bg.scale_x,
        scale_y: bg.scale_y,
        opacity: bg.opacity,
    }
}

fn layer_record(layer: &Layer) -> LayerRecord {
    let t = &layer.transform;
    let (origin_x, origin_y) = match t.origin {
        Origin::TopLeft => ("left", "top"),
        Origin::Center => ("center", "center"),
    };
    let mut record = LayerRecord {
        left: t.left,
        top: t.top,
        scale_x: t.scale_x,
        scale_y: t.scale_y,
        angle: t.angle,
        origin_x: origin_x.to_string(),
        origin_y: origin_y.to_string(),
        opacity: layer.opacity,
        global_composite_operation: layer.composite.name().to_string(),
        mode: layer.mode().clone(),
        layer_id: layer.id,
        layer_type: layer.kind.type_name().to_string(),
        controls_visibility: layer.controls,
        text: None,
        font_size: None,
        font_family: None,
        fill: None,
        src: None,
        crop_x: None,
        crop_y: None,
        width: None,
        height: None,
        natural_width: None,
        natural_height: None,
        cropped: None,
        filters: None,
    };
    match &layer.kind {
        LayerKind::Text(text) => {
            record.text = Some(text.content.clone());
            record.font_size = Some(text.font_size);
            record.font_family = Some(text.font_family.clone());
            record.fill = Some(text.fill.clone());
        }
        LayerKind::Image(img) => {
            record.src = Some(img.src.clone());
            record.crop_x = Some(img.crop.x);
            record.crop_y = Some(img.crop.y);
            record.width = Some(img.crop.width);
            record.height = Some(img.crop.height);
            record.natural_width = Some(img.natural_width);
            record.natural_height = Some(img.natural_height);
            record.cropped = Some(img.cropped);
            record.filters = Some(
                img.filters
                    .iter()
                    .map(|f| FilterRecord { kind: f.name().to_string() })
                    .collect(),
            );
        }
    }
    record
}

// ============================================================================
// DOCUMENT → SURFACE
// ============================================================================

/// Rebuild a surface from `doc`, loading every image (and the background)
/// through `loader`. Resolves once all loads finished; any load failure
/// rejects the whole document.
pub async fn from_document<L: ImageLoader>(doc: &Document, loader: &L) -> Result<DrawingSurface> {
    let mut surface = DrawingSurface::new(doc.width, doc.height, doc.mode.clone());
    let mut seen = HashSet::with_capacity(doc.objects.len());
    for record in &doc.objects {
        if !seen.insert(record.layer_id) {
            return Err(EditorError::InvalidDocument(format!("duplicate layerId {}", record.layer_id)));
        }
        surface.layers.push(layer_from_record(record, loader).await?);
    }
    if let Some(bg) = &doc.background {
        let image = loader.load(&bg.src).await?;
        surface.background = Some(Background {
            src: bg.src.clone(),
            mode: bg.mode.clone(),
            image,
            left: bg.left,
            top: bg.top,
            scale_x: bg.scale_x,
            scale_y: bg.scale_y,
            opacity: bg.opacity,
        });
    }
    surface.apply_mode_visibility(doc.mode.clone());
    tracing::debug!(objects = doc.objects.len(), "document rebuilt");
    Ok(surface)
}

async fn layer_from_record<L: ImageLoader>(record: &LayerRecord, loader: &L) -> Result<Layer> {
    let origin = match (record.origin_x.as_str(), record.origin_y.as_str()) {
        ("center", "center") => Origin::Center,
        ("left", "top") => Origin::TopLeft,
        (x, y) => {
            return Err(EditorError::InvalidDocument(format!(
                "layer {}: unsupported origin {x}/{y}",
                record.layer_id
            )));
        }
    };
    let transform = Transform {
        left: record.left,
        top: record.top,
        scale_x: record.scale_x,
        scale_y: record.scale_y,
        angle: record.angle,
        origin,
        dirty: false,
    };

    let kind = match record.layer_type.as_str() {
        "image" => LayerKind::Image(image_from_record(record, loader).await?),
        "text" => LayerKind::Text(TextProps::new(
            record.text.clone().unwrap_or_default(),
            record.font_size.unwrap_or(24.0),
            record.font_family.clone().unwrap_or_else(|| "Roboto".to_string()),
            record.fill.clone().unwrap_or_else(|| "#000000".to_string()),
        )),
        other => {
            return Err(EditorError::InvalidDocument(format!(
                "layer {}: unknown layerType '{other}'",
                record.layer_id
            )));
        }
    };

    let mut layer = Layer::new(record.layer_id, kind, record.mode.clone(), transform);
    layer.opacity = record.opacity;
    layer.composite = CompositeOp::from_name(&record.global_composite_operation).unwrap_or_default();
    layer.controls = record.controls_visibility;
    Ok(layer)
}

async fn image_from_record<L: ImageLoader>(record: &LayerRecord, loader: &L) -> Result<ImageProps> {
    let src = record.src.clone().unwrap_or_default();
    let element = loader.load(&src).await?;
    let mut img = ImageProps::from_element(&src, element);
    // The stored natural size wins when the file changed underneath.
    img.natural_width = record.natural_width.unwrap_or(img.natural_width);
    img.natural_height = record.natural_height.unwrap_or(img.natural_height);
    img.crop = CropRect {
        x: record.crop_x.unwrap_or(0.0),
        y: record.crop_y.unwrap_or(0.0),
        width: record.width.unwrap_or(img.natural_width as f32),
        height: record.height.unwrap_or(img.natural_height as f32),
    };
    img.cropped = record.cropped.unwrap_or(false);
    for f in record.filters.iter().flatten() {
        match ImageFilter::from_name(&f.kind) {
            Some(filter) => img.filters.push(filter),
            None => tracing::warn!(layer = %record.layer_id, filter = %f.kind, "unknown filter dropped"),
        }
    }
    img.apply_filters();
    Ok(img)
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::canvas::BackgroundFit;
    use crate::io::MemoryImageLoader;
    use crate::ops::crop;

    fn loader() -> MemoryImageLoader {
        let mut loader = MemoryImageLoader::new();
        loader.insert("photo.png", RgbaImage::from_pixel(80, 60, Rgba([200, 100, 50, 255])));
        loader.insert("front.png", RgbaImage::new(100, 100));
        loader
    }

    fn sample_surface(loader: &MemoryImageLoader) -> DrawingSurface {
        let mut surface = DrawingSurface::new(300, 200, Mode::front());
        let text = TextProps::new("Hello\nWorld", 31.5, "Lobster", "#fbd444");
        let t = Transform { left: 150.0, top: 100.0, angle: 12.5, origin: Origin::Center, ..Default::default() };
        surface.layers.push(Layer::new(LayerId(1_700_000_000_001), LayerKind::Text(text), Mode::front(), t));

        let element = pollster::block_on(loader.load("photo.png")).unwrap();
        let mut img = ImageProps::from_element("photo.png", element);
        img.crop = CropRect { x: 10.5, y: 4.0, width: 40.25, height: 30.0 };
        img.cropped = true;
        img.filters = vec![ImageFilter::Sepia, ImageFilter::Blur];
        img.apply_filters();
        let t = Transform { left: 20.0, top: 30.0, scale_x: 0.75, scale_y: 1.25, ..Default::default() };
        let mut layer = Layer::new(LayerId(1_700_000_000_002), LayerKind::Image(img), Mode::back(), t);
        layer.controls.ml = true;
        surface.layers.push(layer);

        let bg = pollster::block_on(loader.load("front.png")).unwrap();
        surface.place_background("front.png", Mode::front(), bg, BackgroundFit::Relative(0.9));
        surface.apply_mode_visibility(Mode::front());
        surface
    }

    #[test]
    fn round_trip_is_lossless() {
        let loader = loader();
        let surface = sample_surface(&loader);
        let doc = to_document(&surface);
        let json = doc.to_json().unwrap();
        let rebuilt = pollster::block_on(from_document(&Document::from_json(&json).unwrap(), &loader)).unwrap();

        assert_eq!(rebuilt.layers, surface.layers);
        assert_eq!(rebuilt.mode(), surface.mode());
        assert_eq!((rebuilt.width, rebuilt.height), (300, 200));
        assert_eq!(to_document(&rebuilt), doc);
        let img = rebuilt.layers[1].as_image().unwrap();
        assert_eq!(img.filters, vec![ImageFilter::Sepia, ImageFilter::Blur]);
        assert!(img.filtered.is_some());
    }

    #[test]
    fn json_uses_storefront_field_names() {
        let loader = loader();
        let json = to_document(&sample_surface(&loader)).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let image = &value["objects"][1];
        assert_eq!(image["layerType"], "image");
        assert_eq!(image["layerId"], 1_700_000_000_002u64);
        assert_eq!(image["mode"], "back");
        assert_eq!(image["cropX"], 10.5);
        assert_eq!(image["globalCompositeOperation"], "source-atop");
        assert_eq!(image["_controlsVisibility"]["ml"], true);
        assert_eq!(image["filters"][0]["type"], "Sepia");
        assert_eq!(value["objects"][0]["fontFamily"], "Lobster");
        assert!(value["objects"][0].get("src").is_none());
    }

    #[test]
    fn open_crop_session_serializes_snapshot() {
        let loader = loader();
        let mut surface = sample_surface(&loader);
        let before = to_document(&surface);
        let id = surface.layers[1].id;
        crop::begin_crop(&mut surface, id, 1.0).unwrap();
        crop::move_crop_window(&mut surface, 0.0, 0.0).unwrap();
        assert_eq!(to_document(&surface), before);
    }

    #[test]
    fn missing_image_rejects_document() {
        let loader = loader();
        let mut doc = to_document(&sample_surface(&loader));
        doc.objects[1].src = Some("gone.png".into());
        let err = pollster::block_on(from_document(&doc, &loader)).unwrap_err();
        assert!(matches!(err, EditorError::ResourceLoad { .. }));
    }

    #[test]
    fn unknown_layer_type_rejects_document() {
        let loader = loader();
        let mut doc = to_document(&sample_surface(&loader));
        doc.objects[1].layer_type = "imgae".into();
        let err = pollster::block_on(from_document(&doc, &loader)).unwrap_err();
        assert!(matches!(&err, EditorError::InvalidDocument(msg) if msg.contains("imgae")), "{err}");

        doc.objects[1].layer_type = "shape".into();
        assert!(pollster::block_on(from_document(&doc, &loader)).is_err());
    }

    #[test]
    fn duplicate_layer_ids_reject_document() {
        let loader = loader();
        let mut doc = to_document(&sample_surface(&loader));
        doc.objects[1].layer_id = doc.objects[0].layer_id;
        let err = pollster::block_on(from_document(&doc, &loader)).unwrap_err();
        assert!(matches!(err, EditorError::InvalidDocument(_)));
    }

    #[test]
    fn origin_needs_both_axes() {
        let loader = loader();
        let mut doc = to_document(&sample_surface(&loader));
        doc.objects[0].origin_x = "center".into();
        doc.objects[0].origin_y = "top".into();
        let err = pollster::block_on(from_document(&doc, &loader)).unwrap_err();
        assert!(matches!(err, EditorError::InvalidDocument(_)));

        doc.objects[0].origin_y = "center".into();
        let surface = pollster::block_on(from_document(&doc, &loader)).unwrap();
        assert_eq!(surface.layers[0].transform.origin, Origin::Center);
    }
}
