// ============================================================================
// EDITOR SETTINGS — tool constants, persisted as a key=value file
// ============================================================================

use std::path::PathBuf;

use crate::canvas::BackgroundFit;

/// Editor settings that persist across sessions.
///
/// The defaults are the values the product designer has always shipped with;
/// a settings file only needs to list the keys it overrides.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Font size for newly added text layers
    pub text_font_size: f32,
    /// Font family for newly added text layers
    pub text_font_family: String,
    /// Fill colour (`#rrggbb`) for newly added text layers
    pub text_fill: String,
    /// Content used when `add_text` is called without any
    pub text_placeholder: String,
    /// New image layers are scaled to this fraction of the surface width
    pub image_width_fraction: f32,
    /// Live background fit: `(surface / natural) * background_fit` per axis
    pub background_fit: f32,
    /// Background placement used by the export renderer
    pub export_background_fit: BackgroundFit,
    /// Offset (both axes) applied to duplicated layers
    pub duplicate_offset: f32,
    /// Smallest crop extent, in source pixels, a commit may produce
    pub min_crop_extent: f32,
    /// Session log level: error, warn, info, debug, trace
    pub log_level: String,
    /// Directory searched for `<Family>.ttf` / `.otf` font files.
    /// Empty = system fonts only (with `system-fonts`), then the bundled face.
    pub font_dir: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            text_font_size: 24.0,
            text_font_family: "Roboto".to_string(),
            text_fill: "#000000".to_string(),
            text_placeholder: "Print Designer".to_string(),
            image_width_fraction: 0.35,
            background_fit: 0.9,
            export_background_fit: BackgroundFit::Absolute(0.35),
            duplicate_offset: 10.0,
            min_crop_extent: 1.0,
            log_level: "info".to_string(),
            font_dir: String::new(),
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/printdesigner/printdesigner_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\PrintDesigner\printdesigner_settings.cfg
    /// On macOS:   ~/Library/Application Support/PrintDesigner/printdesigner_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("printdesigner_settings.cfg"))
    }

    /// Load from the default settings path, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Parse `key=value` lines. Unknown keys and malformed values are
    /// ignored so older/newer settings files keep loading.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "text_font_size" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v > 0.0
                    {
                        s.text_font_size = v;
                    }
                }
                "text_font_family" => s.text_font_family = val.to_string(),
                "text_fill" => s.text_fill = val.to_string(),
                "text_placeholder" => s.text_placeholder = val.to_string(),
                "image_width_fraction" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v > 0.0
                    {
                        s.image_width_fraction = v;
                    }
                }
                "background_fit" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v > 0.0
                    {
                        s.background_fit = v;
                    }
                }
                "export_background_fit" => {
                    if let Some(fit) = BackgroundFit::from_config_string(val) {
                        s.export_background_fit = fit;
                    }
                }
                "duplicate_offset" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.duplicate_offset = v;
                    }
                }
                "min_crop_extent" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v > 0.0
                    {
                        s.min_crop_extent = v;
                    }
                }
                "log_level" => s.log_level = val.to_lowercase(),
                "font_dir" => s.font_dir = val.to_string(),
                _ => {}
            }
        }
        s
    }

    /// Render as the `key=value` text written by [`save`](Self::save).
    pub fn to_config_string(&self) -> String {
        format!(
            "text_font_size={}\n\
             text_font_family={}\n\
             text_fill={}\n\
             text_placeholder={}\n\
             image_width_fraction={}\n\
             background_fit={}\n\
             export_background_fit={}\n\
             duplicate_offset={}\n\
             min_crop_extent={}\n\
             log_level={}\n\
             font_dir={}\n",
            self.text_font_size,
            self.text_font_family,
            self.text_fill,
            self.text_placeholder,
            self.image_width_fraction,
            self.background_fit,
            self.export_background_fit.to_config_string(),
            self.duplicate_offset,
            self.min_crop_extent,
            self.log_level,
            self.font_dir,
        )
    }

    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::settings_path() else { return Ok(()) };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, self.to_config_string())
    }

    /// Map `log_level` onto a tracing level (unknown → INFO).
    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

#[cfg(target_os = "windows")]
fn config_dir() -> Option<PathBuf> {
    let appdata = std::env::var("APPDATA")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()?;
    Some(PathBuf::from(appdata).join("PrintDesigner"))
}

#[cfg(target_os = "macos")]
fn config_dir() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    Some(
        PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("PrintDesigner"),
    )
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn config_dir() -> Option<PathBuf> {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) => PathBuf::from(xdg),
        Err(_) => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
    };
    Some(base.join("printdesigner"))
}
