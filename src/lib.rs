//! Layer editing, crop and per-mode export core of the PrintDesigner
//! product customizer.

#![allow(clippy::too_many_arguments)]

pub mod canvas;
pub mod cli;
pub mod document;
pub mod error;
pub mod export;
pub mod io;
pub mod layer;
pub mod logger;
pub mod ops;
pub mod session;
pub mod settings;

pub use canvas::{BackgroundFit, DrawingSurface};
pub use document::Document;
pub use error::{EditorError, Result};
pub use layer::{Layer, LayerId, Mode};
pub use session::EditorSession;
pub use settings::EditorSettings;
