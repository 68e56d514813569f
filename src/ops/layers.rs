// ============================================================================
// LAYER REGISTRY — create, select, remove, duplicate, clear, filter toggles
// ============================================================================
//
// Operations on ids that are not on the surface are silent no-ops.
// Every mutating operation requests a re-render.
// ============================================================================

use std::sync::Arc;

use image::RgbaImage;

use crate::canvas::{DrawingSurface, Selection};
use crate::error::{EditorError, Result};
use crate::layer::{ImageProps, Layer, LayerId, LayerIdGenerator, LayerKind, Origin, TextProps, Transform};
use crate::ops::crop;
use crate::ops::filters::ImageFilter;
use crate::settings::EditorSettings;

/// Add a text layer centered on the surface, tagged with the current mode,
/// and select it.
pub fn add_text(
    surface: &mut DrawingSurface,
    ids: &mut LayerIdGenerator,
    settings: &EditorSettings,
    content: Option<&str>,
) -> Layer {
    crop::release_crop(surface);
    let (cx, cy) = surface.center();
    let text = TextProps::new(
        content.unwrap_or(&settings.text_placeholder),
        settings.text_font_size,
        settings.text_font_family.as_str(),
        settings.text_fill.as_str(),
    );
    let transform = Transform { left: cx, top: cy, origin: Origin::Center, ..Default::default() };
    let layer = Layer::new(ids.next_id(), LayerKind::Text(text), surface.mode().clone(), transform);
    push_selected(surface, layer)
}

/// Add an already decoded image, scaled to `image_width_fraction` of the
/// surface width (aspect kept), centered and selected.
pub fn insert_image(
    surface: &mut DrawingSurface,
    ids: &mut LayerIdGenerator,
    settings: &EditorSettings,
    src: &str,
    element: Arc<RgbaImage>,
) -> Layer {
    crop::release_crop(surface);
    let img = ImageProps::from_element(src, element);
    let (nat_w, nat_h) = (img.natural_width.max(1) as f32, img.natural_height.max(1) as f32);
    let scale = surface.width as f32 * settings.image_width_fraction / nat_w;
    let transform = Transform {
        left: (surface.width as f32 - nat_w * scale) * 0.5,
        top: (surface.height as f32 - nat_h * scale) * 0.5,
        scale_x: scale,
        scale_y: scale,
        ..Default::default()
    };
    let layer = Layer::new(ids.next_id(), LayerKind::Image(img), surface.mode().clone(), transform);
    push_selected(surface, layer)
}

fn push_selected(surface: &mut DrawingSurface, mut layer: Layer) -> Layer {
    layer.visible = layer.mode() == surface.mode();
    tracing::info!(layer = %layer.id, kind = layer.kind.type_name(), mode = %layer.mode(), "layer added");
    surface.selection = Selection::Layer(layer.id);
    surface.layers.push(layer.clone());
    surface.request_render();
    layer
}

/// Make layer `id` the active object and hand it to `on_selected`.
/// Returns false (and does nothing) when no layer matches.
pub fn select<F>(surface: &mut DrawingSurface, id: LayerId, on_selected: Option<F>) -> bool
where
    F: FnOnce(&Layer),
{
    if surface.find(id).is_none() {
        return false;
    }
    crop::release_crop(surface);
    surface.selection = Selection::Layer(id);
    surface.request_render();
    if let (Some(callback), Some(layer)) = (on_selected, surface.find(id)) {
        callback(layer);
    }
    true
}

/// Remove every layer with `id`. Returns how many were removed.
pub fn remove(surface: &mut DrawingSurface, id: LayerId) -> usize {
    if surface.crop_helpers.as_ref().is_some_and(|h| h.target == id) {
        surface.crop_helpers = None;
        surface.selection = Selection::None;
    }
    let before = surface.layers.len();
    surface.layers.retain(|l| l.id != id);
    let removed = before - surface.layers.len();
    if surface.selection == Selection::Layer(id) {
        surface.selection = Selection::None;
    }
    if removed > 0 {
        tracing::info!(layer = %id, "layer removed");
    }
    surface.request_render();
    removed
}

/// Clone layer `id` with a fresh id, offset by `duplicate_offset` on both
/// axes, on top of the stack. The original is left untouched.
pub fn duplicate(
    surface: &mut DrawingSurface,
    ids: &mut LayerIdGenerator,
    settings: &EditorSettings,
    id: LayerId,
) -> Option<LayerId> {
    // A layer being cropped is duplicated as it looked before the session.
    let source = match &surface.crop_helpers {
        Some(h) if h.target == id => Some(h.snapshot.clone()),
        _ => surface.find(id).cloned(),
    };
    let mut copy = source?;
    copy.id = ids.next_id();
    copy.selectable = true;
    copy.transform.left += settings.duplicate_offset;
    copy.transform.top += settings.duplicate_offset;
    copy.transform.dirty = true;
    let new_id = copy.id;
    tracing::info!(from = %id, to = %new_id, "layer duplicated");
    surface.layers.push(copy);
    surface.request_render();
    Some(new_id)
}

pub fn clear_all(surface: &mut DrawingSurface) {
    surface.crop_helpers = None;
    surface.selection = Selection::None;
    let count = surface.layers.len();
    surface.layers.clear();
    tracing::info!(count, "all layers cleared");
    surface.request_render();
}

/// Turn the named filter on or off for image layer `id` and rebuild its
/// filtered pixels. Missing or non-image layers are ignored.
pub fn set_filter(surface: &mut DrawingSurface, id: LayerId, name: &str, enabled: bool) -> Result<()> {
    let filter = ImageFilter::from_name(name).ok_or_else(|| EditorError::UnknownFilter(name.to_string()))?;
    let Some(img) = surface.find_mut(id).and_then(|l| l.as_image_mut()) else {
        return Ok(());
    };
    let present = img.has_filter(filter);
    if enabled == present {
        return Ok(());
    }
    if enabled {
        img.filters.push(filter);
    } else {
        img.filters.retain(|f| *f != filter);
    }
    img.apply_filters();
    tracing::debug!(layer = %id, filter = filter.name(), enabled, "filter toggled");
    surface.request_render();
    Ok(())
}

pub fn has_filter(surface: &DrawingSurface, id: LayerId, name: &str) -> bool {
    let Some(filter) = ImageFilter::from_name(name) else { return false };
    surface
        .find(id)
        .and_then(|l| l.as_image())
        .is_some_and(|img| img.has_filter(filter))
}
