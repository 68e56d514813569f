// ============================================================================
// IMAGE FILTERS — named filter registry applied to image layers as a stack
// ============================================================================
//
// Filters never modify the decoded source pixels. Toggling a filter rebuilds
// the layer's filtered copy by running the whole stack in list order.
// Per-pixel work is parallelized per row via rayon.
// ============================================================================

use image::{RgbaImage, imageops};
use rayon::prelude::*;

/// Gaussian sigma used by the `Blur` filter.
const BLUR_SIGMA: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFilter {
    Grayscale,
    Invert,
    Sepia,
    BlackWhite,
    Brownie,
    Vintage,
    Kodachrome,
    Technicolor,
    Polaroid,
    Sharpen,
    Emboss,
    Blur,
}

impl ImageFilter {
    pub fn all() -> &'static [ImageFilter] {
        &[
            ImageFilter::Grayscale,
            ImageFilter::Invert,
            ImageFilter::Sepia,
            ImageFilter::BlackWhite,
            ImageFilter::Brownie,
            ImageFilter::Vintage,
            ImageFilter::Kodachrome,
            ImageFilter::Technicolor,
            ImageFilter::Polaroid,
            ImageFilter::Sharpen,
            ImageFilter::Emboss,
            ImageFilter::Blur,
        ]
    }

    /// Registry name, as stored in documents.
    pub fn name(&self) -> &'static str {
        match self {
            ImageFilter::Grayscale => "Grayscale",
            ImageFilter::Invert => "Invert",
            ImageFilter::Sepia => "Sepia",
            ImageFilter::BlackWhite => "BlackWhite",
            ImageFilter::Brownie => "Brownie",
            ImageFilter::Vintage => "Vintage",
            ImageFilter::Kodachrome => "Kodachrome",
            ImageFilter::Technicolor => "Technicolor",
            ImageFilter::Polaroid => "Polaroid",
            ImageFilter::Sharpen => "Sharpen",
            ImageFilter::Emboss => "Emboss",
            ImageFilter::Blur => "Blur",
        }
    }

    /// Case-insensitive registry lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|f| f.name().eq_ignore_ascii_case(name.trim()))
    }

    /// 4×5 colour matrix (rows r, g, b, a; last column is an offset in 0..1
    /// units) for the filters that are pure colour transforms.
    fn color_matrix(&self) -> Option<[f32; 20]> {
        let m = match self {
            ImageFilter::Sepia => [
                0.393, 0.769, 0.189, 0.0, 0.0,
                0.349, 0.686, 0.168, 0.0, 0.0,
                0.272, 0.534, 0.131, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0, 0.0,
            ],
            ImageFilter::BlackWhite => [
                1.5, 1.5, 1.5, 0.0, -1.0,
                1.5, 1.5, 1.5, 0.0, -1.0,
                1.5, 1.5, 1.5, 0.0, -1.0,
                0.0, 0.0, 0.0, 1.0, 0.0,
            ],
            ImageFilter::Brownie => [
                0.59970, 0.34553, -0.27082, 0.0, 0.186,
                -0.03770, 0.86095, 0.15059, 0.0, -0.1449,
                0.24113, -0.07441, 0.44972, 0.0, -0.02965,
                0.0, 0.0, 0.0, 1.0, 0.0,
            ],
            ImageFilter::Vintage => [
                0.62793, 0.32021, -0.03965, 0.0, 0.03784,
                0.02578, 0.64411, 0.03259, 0.0, 0.02926,
                0.04660, -0.08512, 0.52416, 0.0, 0.02023,
                0.0, 0.0, 0.0, 1.0, 0.0,
            ],
            ImageFilter::Kodachrome => [
                1.12855, -0.39673, -0.03992, 0.0, 0.24991,
                -0.16404, 1.08352, -0.05498, 0.0, 0.09698,
                -0.16786, -0.56034, 1.60148, 0.0, 0.13972,
                0.0, 0.0, 0.0, 1.0, 0.0,
            ],
            ImageFilter::Technicolor => [
                1.91252, -0.85453, -0.09155, 0.0, 0.04624,
                -0.30878, 1.76589, -0.10601, 0.0, -0.27589,
                -0.23110, -0.75018, 1.84759, 0.0, 0.12137,
                0.0, 0.0, 0.0, 1.0, 0.0,
            ],
            ImageFilter::Polaroid => [
                1.438, -0.062, -0.062, 0.0, 0.0,
                -0.122, 1.378, -0.122, 0.0, 0.0,
                -0.016, -0.016, 1.483, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0, 0.0,
            ],
            _ => return None,
        };
        Some(m)
    }

    fn kernel(&self) -> Option<[f32; 9]> {
        match self {
            ImageFilter::Sharpen => Some([0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0]),
            ImageFilter::Emboss => Some([1.0, 1.0, 1.0, 1.0, 0.7, -1.0, -1.0, -1.0, -1.0]),
            _ => None,
        }
    }

    /// Apply this single filter, producing a new image.
    pub fn apply(&self, src: &RgbaImage) -> RgbaImage {
        if let Some(m) = self.color_matrix() {
            return map_pixels(src, |r, g, b, a| {
                (
                    m[0] * r + m[1] * g + m[2] * b + m[3] * a + m[4] * 255.0,
                    m[5] * r + m[6] * g + m[7] * b + m[8] * a + m[9] * 255.0,
                    m[10] * r + m[11] * g + m[12] * b + m[13] * a + m[14] * 255.0,
                    m[15] * r + m[16] * g + m[17] * b + m[18] * a + m[19] * 255.0,
                )
            });
        }
        if let Some(k) = self.kernel() {
            return convolve_3x3(src, &k);
        }
        match self {
            ImageFilter::Grayscale => map_pixels(src, |r, g, b, a| {
                let v = (r + g + b) / 3.0;
                (v, v, v, a)
            }),
            ImageFilter::Invert => map_pixels(src, |r, g, b, a| (255.0 - r, 255.0 - g, 255.0 - b, a)),
            ImageFilter::Blur => imageops::blur(src, BLUR_SIGMA),
            // matrix / kernel filters returned above
            _ => src.clone(),
        }
    }
}

/// Run `filters` over `src` in order.
pub fn apply_stack(src: &RgbaImage, filters: &[ImageFilter]) -> RgbaImage {
    let mut out = src.clone();
    for filter in filters {
        out = filter.apply(&out);
    }
    out
}

/// Per-pixel transform. `f` receives (r, g, b, a) as f32 in 0..255.
fn map_pixels<F>(src: &RgbaImage, f: F) -> RgbaImage
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let (w, h) = src.dimensions();
    let stride = w as usize * 4;
    let mut out = RgbaImage::new(w, h);
    if stride == 0 {
        return out;
    }
    let src_raw = src.as_raw();
    let dst_raw: &mut [u8] = &mut out;

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for pi in (0..stride).step_by(4) {
            let (nr, ng, nb, na) = f(
                row_in[pi] as f32,
                row_in[pi + 1] as f32,
                row_in[pi + 2] as f32,
                row_in[pi + 3] as f32,
            );
            row_out[pi] = nr.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 1] = ng.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 2] = nb.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 3] = na.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

/// 3×3 convolution on RGB with edge clamping; alpha is preserved.
fn convolve_3x3(src: &RgbaImage, k: &[f32; 9]) -> RgbaImage {
    let (w, h) = src.dimensions();
    let stride = w as usize * 4;
    let mut out = RgbaImage::new(w, h);
    if stride == 0 {
        return out;
    }
    let src_raw = src.as_raw();
    let (wi, hi) = (w as i64, h as i64);
    let dst_raw: &mut [u8] = &mut out;

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w as i64 {
            let mut acc = [0.0f32; 3];
            for ky in -1..=1i64 {
                let sy = (y as i64 + ky).clamp(0, hi - 1) as usize;
                for kx in -1..=1i64 {
                    let sx = (x + kx).clamp(0, wi - 1) as usize;
                    let weight = k[((ky + 1) * 3 + (kx + 1)) as usize];
                    let si = sy * stride + sx * 4;
                    for (c, slot) in acc.iter_mut().enumerate() {
                        *slot += src_raw[si + c] as f32 * weight;
                    }
                }
            }
            let di = x as usize * 4;
            for (c, v) in acc.iter().enumerate() {
                row_out[di + c] = v.round().clamp(0.0, 255.0) as u8;
            }
            row_out[di + 3] = src_raw[y * stride + di + 3];
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(4, 3, Rgba(color))
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(ImageFilter::from_name("sepia"), Some(ImageFilter::Sepia));
        assert_eq!(ImageFilter::from_name("BlackWhite"), Some(ImageFilter::BlackWhite));
        assert_eq!(ImageFilter::from_name("Posterize"), None);
        for f in ImageFilter::all() {
            assert_eq!(ImageFilter::from_name(f.name()), Some(*f));
        }
    }

    #[test]
    fn grayscale_averages_channels() {
        let out = ImageFilter::Grayscale.apply(&solid([30, 60, 90, 200]));
        assert_eq!(*out.get_pixel(1, 1), Rgba([60, 60, 60, 200]));
    }

    #[test]
    fn invert_keeps_alpha() {
        let out = ImageFilter::Invert.apply(&solid([0, 100, 255, 7]));
        assert_eq!(*out.get_pixel(0, 0), Rgba([255, 155, 0, 7]));
    }

    #[test]
    fn sharpen_leaves_flat_regions_alone() {
        let src = solid([10, 20, 30, 255]);
        let out = ImageFilter::Sharpen.apply(&src);
        assert_eq!(out, src);
    }

    #[test]
    fn stack_runs_in_list_order() {
        let src = solid([200, 10, 10, 255]);
        let stacked = apply_stack(&src, &[ImageFilter::Sepia, ImageFilter::Invert]);
        let manual = ImageFilter::Invert.apply(&ImageFilter::Sepia.apply(&src));
        assert_eq!(stacked, manual);
        assert_ne!(stacked, apply_stack(&src, &[ImageFilter::Invert, ImageFilter::Sepia]));
        assert_eq!(apply_stack(&src, &[]), src);
    }
}
