// ============================================================================
// MODE VISIBILITY — front/back view switching and background swaps
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use image::RgbaImage;

use crate::canvas::{BackgroundFit, DrawingSurface, Selection};
use crate::error::{EditorError, Result};
use crate::io::ImageLoader;
use crate::layer::Mode;
use crate::ops::crop;

/// Background image reference per mode. A mode with no entry cannot be
/// shown with a mockup or exported.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeBackgrounds(BTreeMap<Mode, String>);

impl ModeBackgrounds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mode: Mode, src: impl Into<String>) -> Self {
        self.insert(mode, src);
        self
    }

    pub fn insert(&mut self, mode: Mode, src: impl Into<String>) {
        self.0.insert(mode, src.into());
    }

    pub fn get(&self, mode: &Mode) -> Option<&str> {
        self.0.get(mode).map(String::as_str)
    }

    pub fn contains(&self, mode: &Mode) -> bool {
        self.0.contains_key(mode)
    }

    pub fn modes(&self) -> impl Iterator<Item = &Mode> {
        self.0.keys()
    }

    pub fn resolve(&self, mode: &Mode) -> Result<&str> {
        self.get(mode).ok_or_else(|| EditorError::ModeUnavailable(mode.clone()))
    }
}

/// Show exactly the layers tagged with `mode`. Layers are never removed.
pub fn set_mode(surface: &mut DrawingSurface, mode: Mode) {
    crop::release_crop(surface);
    tracing::info!(from = %surface.mode(), to = %mode, "mode switched");
    surface.apply_mode_visibility(mode);
    surface.selection = Selection::None;
    surface.request_render();
}

// ============================================================================
// BACKGROUND SWAP
// ============================================================================
//
// request → load → apply. Loading borrows nothing mutable, so layer edits may
// happen while it is in flight; apply only writes background fields and drops
// results superseded by a newer request.

/// Issues background request tickets; only the newest one may be applied.
#[derive(Clone, Debug, Default)]
pub struct BackgroundTickets {
    latest: u64,
}

impl BackgroundTickets {
    fn issue(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        ticket == self.latest
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackgroundRequest {
    pub ticket: u64,
    pub mode: Mode,
    pub src: String,
}

#[derive(Clone, Debug)]
pub struct LoadedBackground {
    pub ticket: u64,
    pub mode: Mode,
    pub src: String,
    pub image: Arc<RgbaImage>,
}

pub fn request_background(
    tickets: &mut BackgroundTickets,
    backgrounds: &ModeBackgrounds,
    mode: &Mode,
) -> Result<BackgroundRequest> {
    let src = backgrounds.resolve(mode)?.to_string();
    Ok(BackgroundRequest { ticket: tickets.issue(), mode: mode.clone(), src })
}

pub async fn load_background<L: ImageLoader>(loader: &L, request: BackgroundRequest) -> Result<LoadedBackground> {
    let image = loader.load(&request.src).await?;
    Ok(LoadedBackground { ticket: request.ticket, mode: request.mode, src: request.src, image })
}

/// Install a loaded background. Returns false when a newer request exists.
pub fn apply_background(
    surface: &mut DrawingSurface,
    tickets: &BackgroundTickets,
    loaded: LoadedBackground,
    fit: BackgroundFit,
) -> bool {
    if !tickets.is_current(loaded.ticket) {
        tracing::debug!(ticket = loaded.ticket, src = %loaded.src, "stale background discarded");
        return false;
    }
    tracing::info!(mode = %loaded.mode, src = %loaded.src, "background set");
    surface.place_background(&loaded.src, loaded.mode, loaded.image, fit);
    surface.request_render();
    true
}
