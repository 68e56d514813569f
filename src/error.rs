// ============================================================================
// EDITOR ERRORS
// ============================================================================

use crate::layer::{LayerId, Mode};

/// Every failure the editor core reports to its caller.
///
/// Operating on a layer id that is not on the surface is deliberately *not*
/// an error: select / remove / duplicate scan and silently do nothing.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("failed to load image '{src}': {reason}")]
    ResourceLoad { src: String, reason: String },

    #[error("no background configured for mode '{0}'")]
    ModeUnavailable(Mode),

    #[error("a crop session is already open")]
    CropInProgress,

    #[error("no crop session is open")]
    NoCropSession,

    #[error("layer {0} is not an image layer")]
    NotAnImage(LayerId),

    #[error("layer {0} has a zero scale factor")]
    DegenerateTransform(LayerId),

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("document error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("upload failed: {0}")]
    Upload(String),
}

impl EditorError {
    pub fn resource_load(src: &str, reason: impl std::fmt::Display) -> Self {
        EditorError::ResourceLoad {
            src: src.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = EditorError> = std::result::Result<T, E>;
