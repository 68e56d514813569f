use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::canvas::{DrawingSurface, Selection};
use crate::document::{self, Document};
use crate::error::Result;
use crate::export::{ExportSet, Exporter};
use crate::io::{self, ImageLoader, UploadRef, Uploader};
use crate::layer::{CropRect, Layer, LayerId, LayerIdGenerator, Mode};
use crate::ops::crop::{self, CropPhase};
use crate::ops::layers;
use crate::ops::mode::{self, BackgroundTickets, ModeBackgrounds};
use crate::ops::text::FontBook;
use crate::settings::EditorSettings;

/// One open design: the live drawing surface plus everything the editing
/// operations need. All operations go through the session; there is no
/// process-wide canvas.
pub struct EditorSession<L: ImageLoader> {
    pub id: Uuid,
    pub surface: DrawingSurface,
    pub settings: EditorSettings,
    pub backgrounds: ModeBackgrounds,
    pub fonts: FontBook,
    /// `None` until saved or opened from a file.
    pub path: Option<PathBuf>,
    ids: LayerIdGenerator,
    loader: L,
    tickets: BackgroundTickets,
}

impl<L: ImageLoader> EditorSession<L> {
    pub fn new(width: u32, height: u32, settings: EditorSettings, loader: L) -> Self {
        let font_dir = (!settings.font_dir.is_empty()).then(|| PathBuf::from(&settings.font_dir));
        let id = Uuid::new_v4();
        tracing::info!(session = %id, width, height, "editor session started");
        Self {
            id,
            surface: DrawingSurface::new(width, height, Mode::front()),
            settings,
            backgrounds: ModeBackgrounds::new(),
            fonts: FontBook::new(font_dir),
            path: None,
            ids: LayerIdGenerator::new(),
            loader,
            tickets: BackgroundTickets::default(),
        }
    }

    pub fn with_backgrounds(mut self, backgrounds: ModeBackgrounds) -> Self {
        self.backgrounds = backgrounds;
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    // ========================================================================
    // LAYER REGISTRY
    // ========================================================================

    pub fn add_text(&mut self, content: Option<&str>) -> Layer {
        let layer = layers::add_text(&mut self.surface, &mut self.ids, &self.settings, content);
        self.refresh_text_metrics();
        self.surface.find(layer.id).cloned().unwrap_or(layer)
    }

    /// Load the fonts text layers use and re-measure their boxes.
    fn refresh_text_metrics(&mut self) {
        for family in self.surface.font_families() {
            self.fonts.prepare(&family);
        }
        self.surface.measure_text(&self.fonts);
    }

    /// Load `src` and add it as an image layer. On failure nothing changes.
    pub async fn add_image(&mut self, src: &str) -> Result<Layer> {
        let element = self.loader.load(src).await?;
        Ok(layers::insert_image(&mut self.surface, &mut self.ids, &self.settings, src, element))
    }

    pub fn select<F: FnOnce(&Layer)>(&mut self, id: LayerId, on_selected: Option<F>) -> bool {
        layers::select(&mut self.surface, id, on_selected)
    }

    pub fn selection(&self) -> Selection {
        self.surface.selection
    }

    pub fn remove(&mut self, id: LayerId) -> usize {
        layers::remove(&mut self.surface, id)
    }

    pub fn duplicate(&mut self, id: LayerId) -> Option<LayerId> {
        layers::duplicate(&mut self.surface, &mut self.ids, &self.settings, id)
    }

    pub fn clear_all(&mut self) {
        layers::clear_all(&mut self.surface)
    }

    pub fn set_filter(&mut self, id: LayerId, name: &str, enabled: bool) -> Result<()> {
        layers::set_filter(&mut self.surface, id, name, enabled)
    }

    pub fn has_filter(&self, id: LayerId, name: &str) -> bool {
        layers::has_filter(&self.surface, id, name)
    }

    // ========================================================================
    // MODES
    // ========================================================================

    pub fn set_mode(&mut self, mode: Mode) {
        mode::set_mode(&mut self.surface, mode)
    }

    /// Swap the background to `mode`'s mockup. Returns false when a newer
    /// background request overtook this one.
    pub async fn set_background(&mut self, mode: &Mode) -> Result<bool> {
        let request = mode::request_background(&mut self.tickets, &self.backgrounds, mode)?;
        let loaded = mode::load_background(&self.loader, request).await?;
        let fit = crate::canvas::BackgroundFit::Relative(self.settings.background_fit);
        Ok(mode::apply_background(&mut self.surface, &self.tickets, loaded, fit))
    }

    // ========================================================================
    // CROP
    // ========================================================================

    pub fn begin_crop(&mut self, id: LayerId) -> Result<bool> {
        crop::begin_crop(&mut self.surface, id, self.settings.min_crop_extent)
    }

    pub fn move_crop_window(&mut self, left: f32, top: f32) -> Result<(f32, f32)> {
        crop::move_crop_window(&mut self.surface, left, top)
    }

    pub fn scale_crop_window(&mut self, scale_x: f32, scale_y: f32) -> Result<()> {
        crop::scale_crop_window(&mut self.surface, scale_x, scale_y)
    }

    pub fn resize_crop_window(&mut self, width: f32, height: f32) -> Result<()> {
        crop::resize_crop_window(&mut self.surface, width, height)
    }

    pub fn on_deselect(&mut self) -> Result<CropRect> {
        crop::on_deselect(&mut self.surface)
    }

    pub fn commit_crop(&mut self) -> Result<CropRect> {
        crop::commit_crop(&mut self.surface)
    }

    pub fn cancel_crop(&mut self) -> Result<()> {
        crop::cancel_crop(&mut self.surface)
    }

    pub fn crop_phase(&self) -> CropPhase {
        crop::crop_phase(&self.surface)
    }

    // ========================================================================
    // DOCUMENTS & EXPORT
    // ========================================================================

    pub fn to_document(&self) -> Document {
        document::to_document(&self.surface)
    }

    /// Replace the live surface with `doc` once every resource loaded.
    /// The current surface is kept when loading fails.
    pub async fn load_document(&mut self, doc: &Document) -> Result<()> {
        let surface = document::from_document(doc, &self.loader).await?;
        for layer in &surface.layers {
            self.ids.observe(layer.id);
        }
        self.surface = surface;
        self.refresh_text_metrics();
        self.surface.request_render();
        Ok(())
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        io::save_document(path, &self.to_document())?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    pub async fn open(&mut self, path: &Path) -> Result<()> {
        let doc = io::load_document_file(path)?;
        self.load_document(&doc).await?;
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    fn exporter(&self) -> Exporter<'_, L> {
        Exporter::new(&self.backgrounds, &self.loader, self.settings.export_background_fit)
    }

    pub async fn export_for_mode(&mut self, mode: &Mode) -> Result<Vec<u8>> {
        let mut fonts = std::mem::take(&mut self.fonts);
        let result = self.exporter().export_for_mode(&self.surface, mode, &mut fonts).await;
        self.fonts = fonts;
        result
    }

    pub async fn export_all<U: Uploader>(&mut self, uploader: &U) -> Result<ExportSet> {
        let mut fonts = std::mem::take(&mut self.fonts);
        let result = self.exporter().export_all(&self.surface, &mut fonts, uploader).await;
        self.fonts = fonts;
        result
    }

    pub async fn export_modes<U: Uploader>(
        &mut self,
        modes: &[Mode],
        uploader: &U,
    ) -> Result<std::collections::BTreeMap<Mode, UploadRef>> {
        let mut fonts = std::mem::take(&mut self.fonts);
        let result = self.exporter().export_modes(&self.surface, modes, &mut fonts, uploader).await;
        self.fonts = fonts;
        result
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::error::EditorError;
    use crate::io::{MemoryImageLoader, MemoryUploader};

    fn session() -> EditorSession<MemoryImageLoader> {
        let mut loader = MemoryImageLoader::new();
        loader.insert("front.png", RgbaImage::from_pixel(50, 50, Rgba([255, 255, 255, 255])));
        loader.insert("photo.png", RgbaImage::from_pixel(200, 100, Rgba([9, 9, 9, 255])));
        let backgrounds = ModeBackgrounds::new().with(Mode::front(), "front.png");
        EditorSession::new(500, 500, EditorSettings::default(), loader).with_backgrounds(backgrounds)
    }

    #[test]
    fn failed_image_add_leaves_surface_unchanged() {
        let mut s = session();
        s.add_text(None);
        let generation = s.surface.render_generation();
        let err = pollster::block_on(s.add_image("missing.png")).unwrap_err();
        assert!(matches!(err, EditorError::ResourceLoad { .. }));
        assert_eq!(s.surface.layers.len(), 1);
        assert_eq!(s.surface.render_generation(), generation);
    }

    #[test]
    fn layers_keep_their_creation_mode() {
        let mut s = session();
        let front = s.add_text(Some("front"));
        s.set_mode(Mode::back());
        let back = s.add_text(Some("back"));
        assert_eq!(*back.mode(), Mode::back());
        assert!(!s.surface.find(front.id).unwrap().visible);

        s.set_mode(Mode::front());
        assert!(s.surface.find(front.id).unwrap().visible);
        assert!(!s.surface.find(back.id).unwrap().visible);
        assert_eq!(*s.surface.find(front.id).unwrap().mode(), Mode::front());
    }

    #[test]
    fn background_uses_live_fit() {
        let mut s = session();
        assert!(pollster::block_on(s.set_background(&Mode::front())).unwrap());
        let bg = s.surface.background.as_ref().unwrap();
        assert!((bg.scale_x - 500.0 / 50.0 * 0.9).abs() < 1e-4);
        assert_eq!((bg.left, bg.top), (250.0, 250.0));
    }

    #[test]
    fn document_reload_replaces_surface_and_reserves_ids() {
        let mut s = session();
        let img = pollster::block_on(s.add_image("photo.png")).unwrap();
        s.set_filter(img.id, "Sepia", true).unwrap();
        let doc = s.to_document();

        let mut other = session();
        pollster::block_on(other.load_document(&doc)).unwrap();
        assert_eq!(other.surface.layers, s.surface.layers);
        let fresh = other.add_text(None);
        assert!(fresh.id > img.id);
    }

    #[test]
    fn text_layers_appear_in_export() {
        let mut loader = MemoryImageLoader::new();
        loader.insert("white.png", RgbaImage::from_pixel(200, 200, Rgba([255, 255, 255, 255])));
        let settings = EditorSettings { export_background_fit: crate::canvas::BackgroundFit::Absolute(1.0), ..Default::default() };
        let mut s = EditorSession::new(200, 200, settings, loader)
            .with_backgrounds(ModeBackgrounds::new().with(Mode::front(), "white.png"));
        let layer = s.add_text(Some("HELLO WORLD HELLO"));
        let size = layer.as_text().and_then(|t| t.measured);
        assert!(size.is_some_and(|(w, h)| w > 100.0 && h > 20.0));

        let png = pollster::block_on(s.export_for_mode(&Mode::front())).unwrap();
        let out = image::load_from_memory(&png).unwrap().to_rgba8();
        let inked = out.pixels().filter(|p| p[0] < 128 && p[3] == 255).count();
        assert!(inked > 100, "only {inked} text pixels in the export");
        // Glyphs stay inside the measured box around the center
        let b = s.surface.find(layer.id).unwrap().bounds();
        for (x, y, p) in out.enumerate_pixels() {
            if p[0] < 128 {
                assert!(b.left - 1.0 <= x as f32 && x as f32 <= b.right() + 1.0);
                assert!(b.top - 1.0 <= y as f32 && y as f32 <= b.bottom() + 1.0);
            }
        }
    }

    #[test]
    fn export_all_with_front_only() {
        let mut s = session();
        s.add_text(None);
        pollster::block_on(s.add_image("photo.png")).unwrap();
        let uploader = MemoryUploader::new();
        let set = pollster::block_on(s.export_all(&uploader)).unwrap();
        assert!(set.back.is_none());
        assert_eq!(uploader.uploads().len(), 1);
        assert_eq!(s.surface.layers.len(), 2);
    }
}
