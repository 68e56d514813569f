// ============================================================================
// CROP — interactive crop window over an expanded image layer
// ============================================================================
//
// Idle → Cropping: the target image is expanded to its full natural size
// (visible top-left kept in place), a dimming overlay covers the expanded
// bounds and a movable window marks the previously visible region.
// Cropping → Idle: the window is converted back into a source-space crop
// rectangle and the image is re-cropped and moved so nothing jumps on screen.
//
// All conversions divide by the image scale, since the window and the image
// carry independent scale factors.
// ============================================================================

use crate::canvas::{DrawingSurface, Selection};
use crate::error::{EditorError, Result};
use crate::layer::{Bounds, CropRect, Layer, LayerId, Origin};
use crate::ops::transform::{local_to_surface, surface_to_local};

/// Axis-aligned helper rectangle drawn by the crop session.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectShape {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub angle: f32,
}

impl RectShape {
    fn new(left: f32, top: f32, width: f32, height: f32, angle: f32) -> Self {
        Self { left, top, width, height, scale_x: 1.0, scale_y: 1.0, angle }
    }

    pub fn scaled_width(&self) -> f32 {
        self.width * self.scale_x
    }

    pub fn scaled_height(&self) -> f32 {
        self.height * self.scale_y
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            left: self.left,
            top: self.top,
            width: self.scaled_width(),
            height: self.scaled_height(),
        }
    }
}

/// Transient shapes of an open crop session. Never persisted.
#[derive(Clone, Debug)]
pub struct CropHelpers {
    /// The movable crop window, drawn on top.
    pub window: RectShape,
    /// Dimming overlay covering the expanded image.
    pub overlay: RectShape,
    pub target: LayerId,
    /// The target layer as it was before the session opened.
    pub snapshot: Layer,
    /// Smallest crop extent (source px) a commit may produce.
    pub min_extent: f32,
}

/// Observable crop state. Committing happens inside [`commit_crop`] and is
/// never visible from outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropPhase {
    Idle,
    Cropping,
}

pub fn crop_phase(surface: &DrawingSurface) -> CropPhase {
    if surface.crop_helpers.is_some() { CropPhase::Cropping } else { CropPhase::Idle }
}

/// Open a crop session on image layer `id`.
///
/// Returns `Ok(false)` when no layer has that id.
pub fn begin_crop(surface: &mut DrawingSurface, id: LayerId, min_extent: f32) -> Result<bool> {
    if surface.crop_helpers.is_some() {
        return Err(EditorError::CropInProgress);
    }
    let Some(layer) = surface.find_mut(id) else {
        return Ok(false);
    };
    if !layer.is_image() {
        return Err(EditorError::NotAnImage(id));
    }
    let snapshot = layer.clone();
    normalize_origin(layer);

    let t = layer.transform;
    let Some(img) = layer.as_image_mut() else {
        return Err(EditorError::NotAnImage(id));
    };
    let old = img.crop;

    // Expand to the natural bounds while keeping the visible corner fixed.
    // The new top-left is the old local point (-x, -y), rotation included.
    let (left, top) = local_to_surface(&t, 0.0, 0.0, -old.x, -old.y);
    img.crop = CropRect::full(img.natural_width, img.natural_height);
    let (nat_w, nat_h) = (img.natural_width as f32, img.natural_height as f32);

    layer.transform.left = left;
    layer.transform.top = top;
    layer.transform.dirty = false;
    layer.selectable = false;

    let window = RectShape::new(
        t.left,
        t.top,
        old.width * t.scale_x,
        old.height * t.scale_y,
        t.angle,
    );
    let overlay = RectShape::new(left, top, nat_w * t.scale_x, nat_h * t.scale_y, t.angle);

    tracing::debug!(layer = %id, ?old, "crop session opened");
    surface.crop_helpers = Some(CropHelpers { window, overlay, target: id, snapshot, min_extent });
    surface.selection = Selection::CropWindow;
    surface.request_render();
    Ok(true)
}

/// Crop math works on the top-left corner; convert a center-origin image.
/// The pivot moves to the rotated top-left corner so nothing moves on screen.
fn normalize_origin(layer: &mut Layer) {
    if layer.transform.origin == Origin::Center {
        let (w, h) = layer.size();
        let (left, top) = local_to_surface(&layer.transform, w, h, 0.0, 0.0);
        layer.transform.left = left;
        layer.transform.top = top;
        layer.transform.origin = Origin::TopLeft;
    }
}

/// Keep `window` fully inside `overlay`, using the window's scaled size.
fn clamp_window(window: &mut RectShape, overlay: &RectShape) {
    let o = overlay.bounds();
    let max_left = o.right() - window.scaled_width();
    let max_top = o.bottom() - window.scaled_height();
    window.left = window.left.min(max_left).max(o.left);
    window.top = window.top.min(max_top).max(o.top);
}

fn helpers_mut(surface: &mut DrawingSurface) -> Result<&mut CropHelpers> {
    surface.crop_helpers.as_mut().ok_or(EditorError::NoCropSession)
}

/// Drag the crop window to `(left, top)`. Returns the clamped position.
pub fn move_crop_window(surface: &mut DrawingSurface, left: f32, top: f32) -> Result<(f32, f32)> {
    let helpers = helpers_mut(surface)?;
    helpers.window.left = left;
    helpers.window.top = top;
    let overlay = helpers.overlay;
    clamp_window(&mut helpers.window, &overlay);
    let pos = (helpers.window.left, helpers.window.top);
    surface.request_render();
    Ok(pos)
}

/// Scale the crop window. The scaled window never outgrows the overlay.
pub fn scale_crop_window(surface: &mut DrawingSurface, scale_x: f32, scale_y: f32) -> Result<()> {
    let helpers = helpers_mut(surface)?;
    let overlay = helpers.overlay;
    let w = &mut helpers.window;
    let max_sx = if w.width > 0.0 { overlay.scaled_width() / w.width } else { scale_x };
    let max_sy = if w.height > 0.0 { overlay.scaled_height() / w.height } else { scale_y };
    w.scale_x = scale_x.max(0.0).min(max_sx);
    w.scale_y = scale_y.max(0.0).min(max_sy);
    clamp_window(w, &overlay);
    surface.request_render();
    Ok(())
}

/// Resize the crop window's unscaled extent.
pub fn resize_crop_window(surface: &mut DrawingSurface, width: f32, height: f32) -> Result<()> {
    let helpers = helpers_mut(surface)?;
    let overlay = helpers.overlay;
    let w = &mut helpers.window;
    let max_w = if w.scale_x > 0.0 { overlay.scaled_width() / w.scale_x } else { width };
    let max_h = if w.scale_y > 0.0 { overlay.scaled_height() / w.scale_y } else { height };
    w.width = width.max(0.0).min(max_w);
    w.height = height.max(0.0).min(max_h);
    clamp_window(w, &overlay);
    surface.request_render();
    Ok(())
}

/// The crop window lost selection: commit.
pub fn on_deselect(surface: &mut DrawingSurface) -> Result<CropRect> {
    commit_crop(surface)
}

/// Apply the crop window to the target image and close the session.
pub fn commit_crop(surface: &mut DrawingSurface) -> Result<CropRect> {
    let helpers = surface.crop_helpers.take().ok_or(EditorError::NoCropSession)?;
    if surface.selection == Selection::CropWindow {
        surface.selection = Selection::None;
    }
    let Some(layer) = surface.find_mut(helpers.target) else {
        return Err(EditorError::NoCropSession);
    };
    let t = layer.transform;
    let win = helpers.window;
    let Some((x, y)) = surface_to_local(&t, 0.0, 0.0, win.left, win.top) else {
        *layer = helpers.snapshot;
        surface.request_render();
        return Err(EditorError::DegenerateTransform(helpers.target));
    };
    let Some(img) = layer.as_image_mut() else {
        return Err(EditorError::NotAnImage(helpers.target));
    };

    let raw = CropRect {
        x,
        y,
        width: win.scaled_width() / t.scale_x,
        height: win.scaled_height() / t.scale_y,
    };
    let crop = clamp_crop(raw, img.natural_width, img.natural_height, helpers.min_extent);
    if crop.width != raw.width || crop.height != raw.height {
        tracing::warn!(layer = %helpers.target, ?raw, ?crop, "degenerate crop clamped");
    }

    img.crop = crop;
    img.cropped = true;
    let (left, top) = local_to_surface(&t, 0.0, 0.0, crop.x, crop.y);
    layer.transform.left = left;
    layer.transform.top = top;
    layer.transform.dirty = true;
    layer.selectable = true;

    tracing::debug!(layer = %helpers.target, ?crop, "crop committed");
    surface.request_render();
    Ok(crop)
}

/// Keep the crop inside the natural image with at least `min_extent` per axis.
fn clamp_crop(raw: CropRect, natural_w: u32, natural_h: u32, min_extent: f32) -> CropRect {
    let (nw, nh) = (natural_w as f32, natural_h as f32);
    let width = raw.width.max(min_extent).min(nw);
    let height = raw.height.max(min_extent).min(nh);
    CropRect {
        x: raw.x.clamp(0.0, (nw - width).max(0.0)),
        y: raw.y.clamp(0.0, (nh - height).max(0.0)),
        width,
        height,
    }
}

/// Close the session and restore the target layer as it was before.
pub fn cancel_crop(surface: &mut DrawingSurface) -> Result<()> {
    let helpers = surface.crop_helpers.take().ok_or(EditorError::NoCropSession)?;
    if let Some(layer) = surface.find_mut(helpers.target) {
        *layer = helpers.snapshot;
    }
    if surface.selection == Selection::CropWindow {
        surface.selection = Selection::None;
    }
    surface.request_render();
    Ok(())
}

/// Commit an open session, if any. Used when another action takes the
/// selection away from the crop window.
pub fn release_crop(surface: &mut DrawingSurface) {
    if surface.crop_helpers.is_none() {
        return;
    }
    if let Err(e) = commit_crop(surface) {
        tracing::warn!(error = %e, "open crop session could not be committed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::RgbaImage;

    use super::*;
    use crate::layer::{ImageProps, LayerKind, Mode, Transform};

    fn surface_with_image(nat: (u32, u32), t: Transform) -> (DrawingSurface, LayerId) {
        let mut surface = DrawingSurface::new(400, 400, Mode::front());
        let img = ImageProps::from_element("mem://img", Arc::new(RgbaImage::new(nat.0, nat.1)));
        let id = LayerId(7);
        surface.layers.push(Layer::new(id, LayerKind::Image(img), Mode::front(), t));
        (surface, id)
    }

    fn crop_of(surface: &DrawingSurface, id: LayerId) -> CropRect {
        surface.find(id).and_then(|l| l.as_image()).map(|i| i.crop).unwrap_or_default()
    }

    #[test]
    fn crop_math_scenario() {
        let (mut surface, id) = surface_with_image((200, 200), Transform::default());
        assert!(begin_crop(&mut surface, id, 1.0).unwrap());
        resize_crop_window(&mut surface, 100.0, 100.0).unwrap();
        assert_eq!(move_crop_window(&mut surface, 50.0, 50.0).unwrap(), (50.0, 50.0));

        let crop = on_deselect(&mut surface).unwrap();
        assert_eq!(crop, CropRect { x: 50.0, y: 50.0, width: 100.0, height: 100.0 });
        let layer = surface.find(id).unwrap();
        assert_eq!((layer.transform.left, layer.transform.top), (50.0, 50.0));
        assert!(layer.as_image().unwrap().cropped);
        assert!(layer.selectable);
        assert_eq!(crop_phase(&surface), CropPhase::Idle);
    }

    #[test]
    fn begin_expands_image_and_keeps_visible_corner() {
        let t = Transform { left: 30.0, top: 40.0, scale_x: 2.0, scale_y: 0.5, ..Default::default() };
        let (mut surface, id) = surface_with_image((100, 80), t);
        surface.find_mut(id).unwrap().as_image_mut().unwrap().crop =
            CropRect { x: 10.0, y: 20.0, width: 30.0, height: 40.0 };

        begin_crop(&mut surface, id, 1.0).unwrap();
        let layer = surface.find(id).unwrap();
        assert_eq!((layer.transform.left, layer.transform.top), (10.0, 30.0));
        assert_eq!(layer.as_image().unwrap().crop, CropRect::full(100, 80));
        assert!(!layer.selectable);

        let helpers = surface.crop_helpers.as_ref().unwrap();
        assert_eq!(helpers.window.bounds(), Bounds { left: 30.0, top: 40.0, width: 60.0, height: 20.0 });
        assert_eq!(helpers.overlay.bounds(), Bounds { left: 10.0, top: 30.0, width: 200.0, height: 40.0 });
        assert_eq!(surface.selection, Selection::CropWindow);
    }

    #[test]
    fn window_never_escapes_overlay() {
        let t = Transform { left: 20.0, top: 10.0, scale_x: 1.3, scale_y: 0.7, ..Default::default() };
        let (mut surface, id) = surface_with_image((150, 90), t);
        begin_crop(&mut surface, id, 1.0).unwrap();
        resize_crop_window(&mut surface, 60.0, 25.0).unwrap();
        scale_crop_window(&mut surface, 1.5, 0.8).unwrap();

        let deltas = [-1.0e6, -500.0, -37.5, -0.25, 0.0, 3.0, 12.75, 90.0, 555.0, 1.0e6];
        for dx in deltas {
            for dy in deltas {
                let win = surface.crop_helpers.as_ref().unwrap().window;
                move_crop_window(&mut surface, win.left + dx, win.top + dy).unwrap();
                let h = surface.crop_helpers.as_ref().unwrap();
                assert!(
                    h.overlay.bounds().contains(&h.window.bounds(), 1e-3),
                    "window {:?} escaped overlay {:?}",
                    h.window.bounds(),
                    h.overlay.bounds()
                );
            }
        }
    }

    #[test]
    fn oversized_window_is_shrunk_to_overlay() {
        let (mut surface, id) = surface_with_image((50, 50), Transform::default());
        begin_crop(&mut surface, id, 1.0).unwrap();
        scale_crop_window(&mut surface, 10.0, 10.0).unwrap();
        let h = surface.crop_helpers.as_ref().unwrap();
        assert!(h.window.scaled_width() <= h.overlay.scaled_width() + 1e-4);
        assert!(h.overlay.bounds().contains(&h.window.bounds(), 1e-3));
    }

    #[test]
    fn recommit_without_moving_is_idempotent() {
        let t = Transform { left: 15.0, top: 25.0, scale_x: 0.6, scale_y: 0.6, ..Default::default() };
        let (mut surface, id) = surface_with_image((300, 200), t);
        begin_crop(&mut surface, id, 1.0).unwrap();
        resize_crop_window(&mut surface, 70.0, 40.0).unwrap();
        move_crop_window(&mut surface, 60.0, 50.0).unwrap();
        let first = commit_crop(&mut surface).unwrap();
        let pos = surface.find(id).map(|l| (l.transform.left, l.transform.top)).unwrap();

        begin_crop(&mut surface, id, 1.0).unwrap();
        let second = commit_crop(&mut surface).unwrap();
        let pos2 = surface.find(id).map(|l| (l.transform.left, l.transform.top)).unwrap();

        for (a, b) in [(first.x, second.x), (first.y, second.y), (first.width, second.width), (first.height, second.height)] {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
        assert!((pos.0 - pos2.0).abs() < 1e-3 && (pos.1 - pos2.1).abs() < 1e-3);
    }

    #[test]
    fn repeated_sessions_do_not_drift() {
        let t = Transform { left: 12.3, top: 7.9, scale_x: 0.37, scale_y: 0.37, ..Default::default() };
        let (mut surface, id) = surface_with_image((333, 217), t);
        begin_crop(&mut surface, id, 1.0).unwrap();
        resize_crop_window(&mut surface, 41.3, 29.9).unwrap();
        move_crop_window(&mut surface, 19.7, 13.1).unwrap();
        let first = commit_crop(&mut surface).unwrap();
        let first_pos = surface.find(id).map(|l| (l.transform.left, l.transform.top)).unwrap();

        for _ in 0..100 {
            begin_crop(&mut surface, id, 1.0).unwrap();
            commit_crop(&mut surface).unwrap();
        }

        let last = crop_of(&surface, id);
        let last_pos = surface.find(id).map(|l| (l.transform.left, l.transform.top)).unwrap();
        assert!((last.x - first.x).abs() < 1e-3);
        assert!((last.y - first.y).abs() < 1e-3);
        assert!((last.width - first.width).abs() < 1e-3);
        assert!((last.height - first.height).abs() < 1e-3);
        assert!((last_pos.0 - first_pos.0).abs() < 1e-3);
        assert!((last_pos.1 - first_pos.1).abs() < 1e-3);
    }

    fn assert_points_close(a: &[(f32, f32)], b: &[(f32, f32)]) {
        for (p, q) in a.iter().zip(b) {
            assert!((p.0 - q.0).abs() < 1e-3 && (p.1 - q.1).abs() < 1e-3, "{p:?} vs {q:?}");
        }
    }

    /// Surface positions of the visible region's four corners.
    fn visible_corners(layer: &Layer) -> Vec<(f32, f32)> {
        let (w, h) = layer.size();
        [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)]
            .into_iter()
            .map(|(u, v)| local_to_surface(&layer.transform, w, h, u, v))
            .collect()
    }

    #[test]
    fn rotated_center_origin_image_does_not_move() {
        let t = Transform { left: 200.0, top: 200.0, angle: 30.0, origin: Origin::Center, ..Default::default() };
        let (mut surface, id) = surface_with_image((100, 50), t);
        let before = visible_corners(surface.find(id).unwrap());
        assert_points_close(&before[..1], &[(169.1987, 153.3494)]);

        begin_crop(&mut surface, id, 1.0).unwrap();
        let layer = surface.find(id).unwrap();
        assert_eq!(layer.transform.origin, Origin::TopLeft);
        assert_points_close(&visible_corners(layer), &before);
        let window = surface.crop_helpers.as_ref().unwrap().window;
        assert_points_close(&[(window.left, window.top)], &before[..1]);

        commit_crop(&mut surface).unwrap();
        assert_points_close(&visible_corners(surface.find(id).unwrap()), &before);
    }

    #[test]
    fn rotated_cropped_image_keeps_visible_region() {
        let t = Transform { left: 120.0, top: 90.0, scale_x: 1.5, scale_y: 0.8, angle: -40.0, ..Default::default() };
        let (mut surface, id) = surface_with_image((100, 50), t);
        surface.find_mut(id).unwrap().as_image_mut().unwrap().crop =
            CropRect { x: 10.0, y: 5.0, width: 60.0, height: 30.0 };
        let before = visible_corners(surface.find(id).unwrap());

        begin_crop(&mut surface, id, 1.0).unwrap();
        let expanded = surface.find(id).unwrap().transform;
        let region: Vec<_> = [(10.0, 5.0), (70.0, 5.0), (10.0, 35.0), (70.0, 35.0)]
            .into_iter()
            .map(|(u, v)| local_to_surface(&expanded, 0.0, 0.0, u, v))
            .collect();
        assert_points_close(&region, &before);

        let crop = commit_crop(&mut surface).unwrap();
        assert!((crop.x - 10.0).abs() < 1e-3 && (crop.y - 5.0).abs() < 1e-3);
        assert_points_close(&visible_corners(surface.find(id).unwrap()), &before);
    }

    #[test]
    fn degenerate_window_is_clamped_to_min_extent() {
        let (mut surface, id) = surface_with_image((100, 100), Transform::default());
        begin_crop(&mut surface, id, 1.0).unwrap();
        resize_crop_window(&mut surface, 0.0, 0.0).unwrap();
        move_crop_window(&mut surface, 100.0, 100.0).unwrap();
        let crop = commit_crop(&mut surface).unwrap();
        assert_eq!((crop.width, crop.height), (1.0, 1.0));
        assert!(crop.x + crop.width <= 100.0 && crop.y + crop.height <= 100.0);
    }

    #[test]
    fn cancel_restores_snapshot() {
        let t = Transform { left: 5.0, top: 5.0, scale_x: 2.0, scale_y: 2.0, ..Default::default() };
        let (mut surface, id) = surface_with_image((40, 40), t);
        let before = surface.find(id).cloned().unwrap();
        begin_crop(&mut surface, id, 1.0).unwrap();
        move_crop_window(&mut surface, 30.0, 30.0).unwrap();
        cancel_crop(&mut surface).unwrap();
        assert_eq!(surface.find(id), Some(&before));
        assert!(surface.crop_helpers.is_none());
    }

    #[test]
    fn guards() {
        let (mut surface, id) = surface_with_image((10, 10), Transform::default());
        assert!(!begin_crop(&mut surface, LayerId(999), 1.0).unwrap());
        assert!(matches!(commit_crop(&mut surface), Err(EditorError::NoCropSession)));
        assert!(matches!(move_crop_window(&mut surface, 0.0, 0.0), Err(EditorError::NoCropSession)));
        begin_crop(&mut surface, id, 1.0).unwrap();
        assert!(matches!(begin_crop(&mut surface, id, 1.0), Err(EditorError::CropInProgress)));
    }
}
