// ============================================================================
// TEXT — font lookup and glyph rasterization for text layers
// ============================================================================

use std::collections::HashMap;
use std::path::PathBuf;

use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};
use image::{Rgba, RgbaImage};

/// Face used for any family no font source provides, so text always renders.
const FALLBACK_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Fonts available to the rasterizer, keyed by lower-cased family name.
///
/// Lookup order for [`prepare`](FontBook::prepare): already loaded, then
/// `<font_dir>/<Family>.ttf|.otf`, then the system font source when built
/// with the `system-fonts` feature. [`resolve`](FontBook::resolve) falls
/// back to the bundled DejaVu Sans for families that were not found.
pub struct FontBook {
    fonts: HashMap<String, FontArc>,
    missing: Vec<String>,
    font_dir: Option<PathBuf>,
    fallback: Option<FontArc>,
}

impl Default for FontBook {
    fn default() -> Self {
        let fallback = match FontArc::try_from_slice(FALLBACK_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::error!(error = %e, "bundled fallback font is unreadable");
                None
            }
        };
        Self { fonts: HashMap::new(), missing: Vec::new(), font_dir: None, fallback }
    }
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("families", &self.fonts.keys().collect::<Vec<_>>())
            .field("font_dir", &self.font_dir)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl FontBook {
    pub fn new(font_dir: Option<PathBuf>) -> Self {
        Self { font_dir, ..Self::default() }
    }

    pub fn insert(&mut self, family: &str, font: FontArc) {
        self.fonts.insert(family.to_lowercase(), font);
    }

    /// The loaded face for `family`, without fallback.
    pub fn get(&self, family: &str) -> Option<&FontArc> {
        self.fonts.get(&family.to_lowercase())
    }

    /// The face text in `family` is drawn with: the family itself when
    /// loaded, the bundled fallback otherwise.
    pub fn resolve(&self, family: &str) -> Option<&FontArc> {
        self.get(family).or(self.fallback.as_ref())
    }

    /// Make sure `family` is loaded. Returns false when no source has it;
    /// the miss is remembered so a missing family is only searched once.
    pub fn prepare(&mut self, family: &str) -> bool {
        let key = family.to_lowercase();
        if self.fonts.contains_key(&key) {
            return true;
        }
        if self.missing.contains(&key) {
            return false;
        }
        let found = self.load_from_dir(family).or_else(|| load_system_font(family));
        match found {
            Some(font) => {
                tracing::debug!(family, "font loaded");
                self.fonts.insert(key, font);
                true
            }
            None => {
                tracing::warn!(family, "font not found; using the bundled fallback");
                self.missing.push(key);
                false
            }
        }
    }

    fn load_from_dir(&self, family: &str) -> Option<FontArc> {
        let dir = self.font_dir.as_ref()?;
        let stem = family.replace(' ', "");
        for name in [
            format!("{family}.ttf"),
            format!("{family}.otf"),
            format!("{stem}.ttf"),
            format!("{stem}-Regular.ttf"),
            format!("{stem}.otf"),
        ] {
            let path = dir.join(name);
            if let Ok(bytes) = std::fs::read(&path)
                && let Ok(font) = FontArc::try_from_vec(bytes)
            {
                return Some(font);
            }
        }
        None
    }
}

/// Load a regular-weight font by family name from the system.
#[cfg(feature = "system-fonts")]
fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::Title(family.to_string())], &Properties::new())
        .ok()?;
    let font_data = handle.load().ok()?;
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

#[cfg(not(feature = "system-fonts"))]
fn load_system_font(_family: &str) -> Option<FontArc> {
    None
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(s: &str) -> Option<Rgba<u8>> {
    let hex = s.trim().strip_prefix('#')?;
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [255u8; 4];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            Some(Rgba(out))
        }
        6 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255])),
        8 => Some(Rgba([channel(0)?, channel(2)?, channel(4)?, channel(6)?])),
        _ => None,
    }
}

/// Lay out a single line of text, returning glyph ids with their x offsets
/// and the total advance width.
fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }
    (glyphs, cursor_x)
}

/// Size of the block [`rasterize_text`] produces for `text`.
pub fn measure_text(font: &FontArc, text: &str, font_size: f32) -> (u32, u32) {
    let lines: Vec<_> = text.split('\n').map(|line| layout_line(font, line, font_size)).collect();
    block_size(font, &lines, font_size)
}

fn block_size(font: &FontArc, lines: &[(Vec<(GlyphId, f32)>, f32)], font_size: f32) -> (u32, u32) {
    let scaled = font.as_scaled(font_size);
    let line_height = scaled.height() + scaled.line_gap();
    let width = lines.iter().map(|(_, w)| *w).fold(0.0f32, f32::max).ceil() as u32;
    let height = (lines.len() as f32 * line_height).ceil() as u32;
    (width.max(1), height.max(1))
}

/// Rasterize `text` into a tight RGBA block (one line per `\n`, left aligned).
/// The block is `ceil(max line width) × ceil(lines × line height)`.
pub fn rasterize_text(font: &FontArc, text: &str, font_size: f32, fill: Rgba<u8>) -> RgbaImage {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();
    let line_height = scaled.height() + scaled.line_gap();

    let lines: Vec<(Vec<(GlyphId, f32)>, f32)> = text
        .split('\n')
        .map(|line| layout_line(font, line, font_size))
        .collect();
    let (width, height) = block_size(font, &lines, font_size);
    let mut out = RgbaImage::new(width, height);
    let (out_w, out_h) = out.dimensions();

    let mut coverage = vec![0.0f32; (out_w * out_h) as usize];
    for (line_idx, (glyphs, _)) in lines.iter().enumerate() {
        let baseline = ascent + line_idx as f32 * line_height;
        for &(id, x) in glyphs {
            let glyph = id.with_scale_and_position(font_size, point(x, baseline));
            let Some(outlined) = font.outline_glyph(glyph) else { continue };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, c| {
                let px = bounds.min.x as i32 + gx as i32;
                let py = bounds.min.y as i32 + gy as i32;
                if px >= 0 && py >= 0 && (px as u32) < out_w && (py as u32) < out_h {
                    let slot = &mut coverage[(py as u32 * out_w + px as u32) as usize];
                    *slot = (*slot + c).min(1.0);
                }
            });
        }
    }

    for (i, c) in coverage.iter().enumerate() {
        if *c <= 0.0 {
            continue;
        }
        let x = i as u32 % out_w;
        let y = i as u32 / out_w;
        let a = (fill[3] as f32 * c).round().clamp(0.0, 255.0) as u8;
        out.put_pixel(x, y, Rgba([fill[0], fill[1], fill[2], a]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#000000"), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(parse_hex_color("#fbd444"), Some(Rgba([0xfb, 0xd4, 0x44, 255])));
        assert_eq!(parse_hex_color("#ff000080"), Some(Rgba([255, 0, 0, 128])));
        assert_eq!(parse_hex_color("#fff"), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(parse_hex_color("red"), None);
        assert_eq!(parse_hex_color("#12345"), None);
    }

    #[test]
    fn missing_family_is_remembered() {
        let mut book = FontBook::new(Some(PathBuf::from("/nonexistent/fonts")));
        assert!(!book.prepare("Definitely Not A Font"));
        assert!(!book.prepare("definitely not a font"));
        assert!(book.get("Definitely Not A Font").is_none());
        assert!(book.resolve("Definitely Not A Font").is_some());
    }

    #[test]
    fn fallback_face_rasterizes_glyphs() {
        let book = FontBook::default();
        let font = book.resolve("Roboto").unwrap();
        let block = rasterize_text(font, "HELLO", 32.0, Rgba([10, 20, 30, 255]));
        assert_eq!(block.dimensions(), measure_text(font, "HELLO", 32.0));
        assert!(block.width() > 60 && block.height() >= 32);

        let inked: Vec<_> = block.pixels().filter(|p| p[3] > 0).collect();
        assert!(inked.len() > 100, "only {} covered pixels", inked.len());
        assert!(inked.iter().all(|p| p[0] == 10 && p[1] == 20 && p[2] == 30));
    }

    #[test]
    fn lines_stack_vertically() {
        let book = FontBook::default();
        let font = book.resolve("Roboto").unwrap();
        let (one_w, one_h) = measure_text(font, "WIDE LINE", 20.0);
        let (two_w, two_h) = measure_text(font, "WIDE LINE\nab", 20.0);
        assert_eq!(one_w, two_w);
        assert!(two_h > one_h + 15);
    }
}
