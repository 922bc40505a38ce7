//! Frame capture: which windows to grab and how to grab them as PNG bytes.

pub mod screen;

use thiserror::Error;

pub use screen::ScreenCapture;

/// Which window(s) a capture cycle looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowTarget {
    /// Whatever window has focus when the cycle starts.
    Foreground,
    /// Every window whose title is exactly this string.
    Titled(String),
}

impl WindowTarget {
    pub fn from_title(title: Option<&str>) -> Self {
        match title {
            Some(t) if !t.is_empty() => WindowTarget::Titled(t.to_string()),
            _ => WindowTarget::Foreground,
        }
    }
}

/// Opaque handle of a window found by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowId(pub u64);

/// Platform-agnostic capture trait.
pub trait FrameSource: Send + Sync {
    /// Windows matching `target`. May be empty.
    fn windows(&self, target: &WindowTarget) -> Result<Vec<WindowId>, CaptureError>;

    /// Capture one window (or the whole screen when the backend cannot target
    /// windows) as PNG bytes. `Ok(None)` when no frame was produced.
    fn capture(&self, window: WindowId) -> Result<Option<Vec<u8>>, CaptureError>;
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no screen capture tool available (need grim, maim, or scrot)")]
    NoBackendAvailable,
    #[error("required tool not found: {0}")]
    ToolNotAvailable(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
