// ============================================================================
// EXPORT — per-mode off-screen rendering to PNG
// ============================================================================
//
// The live surface is only read: it is serialized, rebuilt off-screen,
// filtered to one mode, given that mode's background, and rasterized.
// Off-screen surfaces share nothing, so several modes are rasterized and
// encoded in parallel once their images are loaded.
// ============================================================================

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::canvas::{BackgroundFit, DrawingSurface};
use crate::document::{from_document, to_document};
use crate::error::Result;
use crate::io::{ImageLoader, UploadRef, Uploader, encode_png};
use crate::layer::Mode;
use crate::ops::mode::ModeBackgrounds;
use crate::ops::text::FontBook;

/// Upload references of an `export_all` run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSet {
    pub front: UploadRef,
    pub back: Option<UploadRef>,
}

/// What an export needs besides the surface itself.
pub struct Exporter<'a, L: ImageLoader> {
    pub backgrounds: &'a ModeBackgrounds,
    pub loader: &'a L,
    pub fit: BackgroundFit,
}

impl<'a, L: ImageLoader> Exporter<'a, L> {
    pub fn new(backgrounds: &'a ModeBackgrounds, loader: &'a L, fit: BackgroundFit) -> Self {
        Self { backgrounds, loader, fit }
    }

    /// Rebuild `surface` off-screen showing only `mode`, on that mode's
    /// background. Fails fast when the mode has no background.
    pub async fn prepare(&self, surface: &DrawingSurface, mode: &Mode) -> Result<DrawingSurface> {
        let bg_src = self.backgrounds.resolve(mode)?;
        let doc = to_document(surface);
        let mut offscreen = from_document(&doc, self.loader).await?;
        offscreen.apply_mode_visibility(mode.clone());
        let bg = self.loader.load(bg_src).await?;
        offscreen.place_background(bg_src, mode.clone(), bg, self.fit);
        Ok(offscreen)
    }

    /// PNG bytes of `surface` as seen in `mode`. The live surface is untouched.
    pub async fn export_for_mode(&self, surface: &DrawingSurface, mode: &Mode, fonts: &mut FontBook) -> Result<Vec<u8>> {
        let mut offscreen = self.prepare(surface, mode).await?;
        preload_fonts(&mut offscreen, fonts);
        let png = encode_png(&offscreen.composite(fonts))?;
        tracing::info!(mode = %mode, bytes = png.len(), "mode exported");
        Ok(png)
    }

    /// Export each of `modes` and hand the PNGs to `uploader`.
    pub async fn export_modes<U: Uploader>(
        &self,
        surface: &DrawingSurface,
        modes: &[Mode],
        fonts: &mut FontBook,
        uploader: &U,
    ) -> Result<BTreeMap<Mode, UploadRef>> {
        let mut prepared = Vec::with_capacity(modes.len());
        for mode in modes {
            let mut offscreen = self.prepare(surface, mode).await?;
            preload_fonts(&mut offscreen, fonts);
            prepared.push((mode.clone(), offscreen));
        }

        let fonts: &FontBook = fonts;
        let encoded = prepared
            .par_iter()
            .map(|(mode, offscreen)| encode_png(&offscreen.composite(fonts)).map(|png| (mode.clone(), png)))
            .collect::<Result<Vec<_>>>()?;

        let mut refs = BTreeMap::new();
        for (mode, png) in encoded {
            let reference = uploader.upload(png, &mode).await?;
            tracing::info!(mode = %mode, reference = %reference, "mode uploaded");
            refs.insert(mode, reference);
        }
        Ok(refs)
    }

    /// Always exports `front`; `back` only when it has a background.
    pub async fn export_all<U: Uploader>(
        &self,
        surface: &DrawingSurface,
        fonts: &mut FontBook,
        uploader: &U,
    ) -> Result<ExportSet> {
        let mut modes = vec![Mode::front()];
        if self.backgrounds.contains(&Mode::back()) {
            modes.push(Mode::back());
        }
        let mut refs = self.export_modes(surface, &modes, fonts, uploader).await?;
        let front = refs
            .remove(&Mode::front())
            .ok_or_else(|| crate::error::EditorError::ModeUnavailable(Mode::front()))?;
        Ok(ExportSet { front, back: refs.remove(&Mode::back()) })
    }
}

fn preload_fonts(surface: &mut DrawingSurface, fonts: &mut FontBook) {
    for family in surface.font_families() {
        fonts.prepare(&family);
    }
    surface.measure_text(fonts);
}
