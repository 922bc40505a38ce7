//! OCR seam: turns a captured frame into text blocks with pixel bounds.

pub mod vision;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use vision::VisionOcr;

/// Language hint attached to a recognized word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    pub code: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    /// Word text, including a trailing space when the engine detected one.
    pub text: String,
    pub languages: Vec<DetectedLanguage>,
}

/// Axis-aligned bounds in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Smallest box containing every point. `None` for no points.
    pub fn enclosing(points: impl IntoIterator<Item = (i32, i32)>) -> Option<Self> {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => Bounds {
                    left: x,
                    top: y,
                    right: x,
                    bottom: y,
                },
                Some(b) => Bounds {
                    left: b.left.min(x),
                    top: b.top.min(y),
                    right: b.right.max(x),
                    bottom: b.bottom.max(y),
                },
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub words: Vec<OcrWord>,
    pub bounds: Bounds,
}

/// OCR engine (adapter for different backends).
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Detect text blocks in an encoded image (PNG).
    async fn detect(&self, image: Vec<u8>) -> Result<Vec<TextBlock>, OcrError>;
}

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR request failed: {0}")]
    RequestFailed(String),
    #[error("OCR service error: {0}")]
    Service(String),
    #[error("OCR cancelled")]
    Cancelled,
}
