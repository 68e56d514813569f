// ============================================================================
// RASTER TRANSFORM — draw a (cropped) source image onto a surface buffer
// ============================================================================
//
// Layers keep their source pixels untouched; placement (translate, rotate,
// scale, origin) is applied only when rasterizing. Every destination pixel
// inside the transformed bounding box is mapped back through the inverse
// transform and bilinearly sampled from the source, one rayon task per row.
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::layer::{Bounds, CompositeOp, CropRect, Origin, Transform};

/// Everything needed to place a source region on the destination.
#[derive(Clone, Copy, Debug)]
pub struct Placement {
    pub transform: Transform,
    pub opacity: f32,
    pub composite: CompositeOp,
}

/// Rotate `(x, y)` by `angle` degrees (clockwise in screen space, y down).
fn rotate(x: f32, y: f32, angle: f32) -> (f32, f32) {
    if angle == 0.0 {
        return (x, y);
    }
    let (s, c) = angle.to_radians().sin_cos();
    (x * c - y * s, x * s + y * c)
}

/// Map a point in unscaled local box space (`0..w`, `0..h`) to the surface.
pub fn local_to_surface(t: &Transform, w: f32, h: f32, u: f32, v: f32) -> (f32, f32) {
    let (ox, oy) = origin_offset(t.origin, w, h);
    let (rx, ry) = rotate((u - ox) * t.scale_x, (v - oy) * t.scale_y, t.angle);
    (t.left + rx, t.top + ry)
}

/// Inverse of [`local_to_surface`]. `None` when a scale factor is degenerate.
pub fn surface_to_local(t: &Transform, w: f32, h: f32, x: f32, y: f32) -> Option<(f32, f32)> {
    if t.scale_x.abs() < 1e-6 || t.scale_y.abs() < 1e-6 {
        return None;
    }
    let (ox, oy) = origin_offset(t.origin, w, h);
    let (rx, ry) = rotate(x - t.left, y - t.top, -t.angle);
    Some((rx / t.scale_x + ox, ry / t.scale_y + oy))
}

fn origin_offset(origin: Origin, w: f32, h: f32) -> (f32, f32) {
    match origin {
        Origin::TopLeft => (0.0, 0.0),
        Origin::Center => (w * 0.5, h * 0.5),
    }
}

/// Axis-aligned bounds of the rotated box, in surface space.
pub fn transformed_bounds(t: &Transform, w: f32, h: f32) -> Bounds {
    let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)];
    let mut min = (f32::MAX, f32::MAX);
    let mut max = (f32::MIN, f32::MIN);
    for (u, v) in corners {
        let (x, y) = local_to_surface(t, w, h, u, v);
        min = (min.0.min(x), min.1.min(y));
        max = (max.0.max(x), max.1.max(y));
    }
    Bounds { left: min.0, top: min.1, width: max.0 - min.0, height: max.1 - min.1 }
}

/// Draw `region` of `src` onto `dst` with `placement`.
pub fn draw_image(dst: &mut RgbaImage, src: &RgbaImage, region: CropRect, placement: &Placement) {
    let (w, h) = (region.width, region.height);
    if w <= 0.0 || h <= 0.0 || placement.opacity <= 0.0 {
        return;
    }
    let t = placement.transform;
    if t.scale_x.abs() < 1e-6 || t.scale_y.abs() < 1e-6 {
        return;
    }

    let bounds = transformed_bounds(&t, w, h);
    let (dst_w, dst_h) = dst.dimensions();
    let x0 = bounds.left.floor().max(0.0) as u32;
    let y0 = bounds.top.floor().max(0.0) as u32;
    let x1 = (bounds.right().ceil().max(0.0) as u32).min(dst_w);
    let y1 = (bounds.bottom().ceil().max(0.0) as u32).min(dst_h);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let stride = dst_w as usize * 4;
    let opacity = placement.opacity.clamp(0.0, 1.0);
    let composite = placement.composite;
    // Sampling never reaches outside the crop region.
    let clip = (
        region.x.floor() as i32,
        region.y.floor() as i32,
        (region.x + w).ceil() as i32 - 1,
        (region.y + h).ceil() as i32 - 1,
    );
    let dst_raw: &mut [u8] = dst;

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row)| {
            let py = y as f32 + 0.5;
            for x in x0..x1 {
                let px = x as f32 + 0.5;
                let Some((u, v)) = surface_to_local(&t, w, h, px, py) else { continue };
                if u < 0.0 || v < 0.0 || u >= w || v >= h {
                    continue;
                }
                let sample = bilinear_sample(src, region.x + u - 0.5, region.y + v - 0.5, clip);
                if sample[3] == 0 {
                    continue;
                }
                let i = x as usize * 4;
                let base = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                let out = blend_pixel(base, sample, opacity, composite);
                row[i..i + 4].copy_from_slice(&out.0);
            }
        });
}

/// Fill an axis-aligned rectangle with `color` using alpha-over.
pub fn fill_rect(dst: &mut RgbaImage, rect: Bounds, color: Rgba<u8>) {
    let (dst_w, dst_h) = dst.dimensions();
    let x0 = rect.left.round().max(0.0) as u32;
    let y0 = rect.top.round().max(0.0) as u32;
    let x1 = (rect.right().round().max(0.0) as u32).min(dst_w);
    let y1 = (rect.bottom().round().max(0.0) as u32).min(dst_h);
    for y in y0..y1 {
        for x in x0..x1 {
            let base = *dst.get_pixel(x, y);
            dst.put_pixel(x, y, blend_pixel(base, color, 1.0, CompositeOp::SourceOver));
        }
    }
}

/// Outline an axis-aligned rectangle, `thickness` pixels wide, inside its bounds.
pub fn stroke_rect(dst: &mut RgbaImage, rect: Bounds, color: Rgba<u8>, thickness: f32) {
    let t = thickness.min(rect.width * 0.5).min(rect.height * 0.5).max(0.0);
    let edges = [
        Bounds { left: rect.left, top: rect.top, width: rect.width, height: t },
        Bounds { left: rect.left, top: rect.bottom() - t, width: rect.width, height: t },
        Bounds { left: rect.left, top: rect.top + t, width: t, height: rect.height - 2.0 * t },
        Bounds { left: rect.right() - t, top: rect.top + t, width: t, height: rect.height - 2.0 * t },
    ];
    for edge in edges {
        fill_rect(dst, edge, color);
    }
}

/// Combine `top` over `base`.
///
/// `SourceAtop` keeps the destination alpha: the layer only shows where
/// something was already drawn.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, opacity: f32, op: CompositeOp) -> Rgba<u8> {
    let ta = (top[3] as f32 / 255.0) * opacity;
    if ta <= 0.0 {
        return base;
    }
    let ba = base[3] as f32 / 255.0;

    match op {
        CompositeOp::SourceOver => {
            if ta >= 1.0 {
                return top;
            }
            let out_a = ta + ba * (1.0 - ta);
            if out_a <= 0.0 {
                return Rgba([0, 0, 0, 0]);
            }
            let mut out = [0u8; 4];
            for c in 0..3 {
                let v = (top[c] as f32 * ta + base[c] as f32 * ba * (1.0 - ta)) / out_a;
                out[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
            Rgba(out)
        }
        CompositeOp::SourceAtop => {
            if base[3] == 0 {
                return base;
            }
            let mut out = [0u8; 4];
            for c in 0..3 {
                let v = top[c] as f32 * ta + base[c] as f32 * (1.0 - ta);
                out[c] = v.round().clamp(0.0, 255.0) as u8;
            }
            out[3] = base[3];
            Rgba(out)
        }
    }
}

/// Bilinear interpolation sampling from an RgbaImage, in pixel-index space.
/// Taps are clamped to `clip` (min_x, min_y, max_x, max_y) and to the image.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32, clip: (i32, i32, i32, i32)) -> Rgba<u8> {
    let (w, h) = (img.width() as i32, img.height() as i32);
    if w == 0 || h == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let (min_x, min_y) = (clip.0.clamp(0, w - 1), clip.1.clamp(0, h - 1));
    let (max_x, max_y) = (clip.2.clamp(min_x, w - 1), clip.3.clamp(min_y, h - 1));
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        let p = img.get_pixel(sx.clamp(min_x, max_x) as u32, sy.clamp(min_y, max_y) as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(transform: Transform, composite: CompositeOp) -> Placement {
        Placement { transform, opacity: 1.0, composite }
    }

    #[test]
    fn local_surface_round_trip_with_rotation() {
        let t = Transform {
            left: 40.0,
            top: 30.0,
            scale_x: 1.5,
            scale_y: 0.5,
            angle: 33.0,
            origin: Origin::Center,
            dirty: false,
        };
        let (x, y) = local_to_surface(&t, 20.0, 10.0, 3.0, 7.0);
        let (u, v) = surface_to_local(&t, 20.0, 10.0, x, y).unwrap();
        assert!((u - 3.0).abs() < 1e-3 && (v - 7.0).abs() < 1e-3);
    }

    #[test]
    fn draws_scaled_region_at_top_left() {
        let mut src = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        for y in 0..2 {
            for x in 0..2 {
                src.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        let mut dst = RgbaImage::new(20, 20);
        let t = Transform { left: 2.0, top: 3.0, scale_x: 3.0, scale_y: 3.0, ..Default::default() };
        let region = CropRect { x: 0.0, y: 0.0, width: 2.0, height: 2.0 };
        draw_image(&mut dst, &src, region, &placement(t, CompositeOp::SourceOver));

        assert_eq!(*dst.get_pixel(4, 5), Rgba([255, 0, 0, 255]));
        assert_eq!(*dst.get_pixel(1, 3), Rgba([0, 0, 0, 0]));
        assert_eq!(*dst.get_pixel(8, 9), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn source_atop_only_paints_covered_pixels() {
        let src = RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255]));
        let mut dst = RgbaImage::new(10, 10);
        dst.put_pixel(5, 5, Rgba([10, 10, 10, 128]));
        draw_image(
            &mut dst,
            &src,
            CropRect::full(10, 10),
            &placement(Transform::default(), CompositeOp::SourceAtop),
        );
        assert_eq!(*dst.get_pixel(5, 5), Rgba([0, 255, 0, 128]));
        assert_eq!(*dst.get_pixel(1, 1), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn half_opacity_over_opaque() {
        let out = blend_pixel(
            Rgba([0, 0, 0, 255]),
            Rgba([200, 100, 50, 255]),
            0.5,
            CompositeOp::SourceOver,
        );
        assert_eq!(out, Rgba([100, 50, 25, 255]));
    }

    #[test]
    fn stroke_leaves_interior_untouched() {
        let mut dst = RgbaImage::new(10, 10);
        let rect = Bounds { left: 1.0, top: 1.0, width: 8.0, height: 8.0 };
        stroke_rect(&mut dst, rect, Rgba([1, 2, 3, 255]), 2.0);
        assert_eq!(*dst.get_pixel(1, 1), Rgba([1, 2, 3, 255]));
        assert_eq!(*dst.get_pixel(8, 5), Rgba([1, 2, 3, 255]));
        assert_eq!(*dst.get_pixel(5, 5), Rgba([0, 0, 0, 0]));
    }
}
