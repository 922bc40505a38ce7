//! Screen capture for Linux using system tools.
//! Windows are discovered with `xdotool`; frames are grabbed with `maim`
//! (per window), `grim` or `scrot` (whole screen). Returns raw PNG bytes.

use std::process::Command;

use tracing::{debug, info, warn};

use super::{CaptureError, FrameSource, WindowId, WindowTarget};

/// Screen capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBackend {
    Maim,
    Grim,
    Scrot,
}

impl CaptureBackend {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "maim" => Some(Self::Maim),
            "grim" => Some(Self::Grim),
            "scrot" => Some(Self::Scrot),
            _ => None,
        }
    }

    fn command(self) -> &'static str {
        match self {
            Self::Maim => "maim",
            Self::Grim => "grim",
            Self::Scrot => "scrot",
        }
    }

    fn targets_windows(self) -> bool {
        matches!(self, Self::Maim)
    }
}

/// Detect available screen capture backend.
/// Prefers maim (can grab a single window), then grim (Wayland), then scrot.
pub fn detect_backend() -> Option<CaptureBackend> {
    for backend in [CaptureBackend::Maim, CaptureBackend::Grim, CaptureBackend::Scrot] {
        if probe_command(backend.command()) {
            info!(backend = backend.command(), "screen capture backend detected");
            return Some(backend);
        }
    }
    warn!("no screen capture backend found");
    None
}

pub struct ScreenCapture {
    backend: Option<CaptureBackend>,
    xdotool: bool,
}

impl ScreenCapture {
    /// Probe for tools once; `preferred` overrides auto-detection.
    pub fn new(preferred: Option<CaptureBackend>) -> Self {
        let backend = preferred.or_else(detect_backend);
        let xdotool = probe_command("xdotool");
        if !xdotool {
            warn!("xdotool not found, window discovery will fall back to the whole screen");
        }
        Self { backend, xdotool }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn run_xdotool(&self, args: &[&str]) -> Result<Vec<WindowId>, CaptureError> {
        if !self.xdotool {
            return Err(CaptureError::ToolNotAvailable("xdotool".into()));
        }
        let output = Command::new("xdotool").args(args).output()?;
        // `search` exits non-zero when nothing matched
        if !output.status.success() {
            return Ok(Vec::new());
        }
        Ok(parse_window_ids(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl FrameSource for ScreenCapture {
    fn windows(&self, target: &WindowTarget) -> Result<Vec<WindowId>, CaptureError> {
        let backend = self.backend.ok_or(CaptureError::NoBackendAvailable)?;
        if !backend.targets_windows() || !self.xdotool {
            if matches!(target, WindowTarget::Titled(_)) {
                warn!(backend = backend.command(), "backend cannot target windows, capturing the whole screen");
            }
            return Ok(vec![WindowId(0)]);
        }

        let ids = match target {
            WindowTarget::Foreground => self.run_xdotool(&["getactivewindow"])?,
            WindowTarget::Titled(title) => {
                let pattern = format!("^{}$", regex::escape(title));
                self.run_xdotool(&["search", "--name", pattern.as_str()])?
            }
        };
        debug!(?target, windows = ids.len(), "windows resolved");
        Ok(ids)
    }

    fn capture(&self, window: WindowId) -> Result<Option<Vec<u8>>, CaptureError> {
        let backend = self.backend.ok_or(CaptureError::NoBackendAvailable)?;
        let mut cmd = Command::new(backend.command());
        match backend {
            // maim and grim write PNG to stdout when no file is given
            CaptureBackend::Maim => {
                if window.0 != 0 {
                    cmd.arg("-i").arg(window.0.to_string());
                }
            }
            CaptureBackend::Grim => {
                cmd.arg("-");
            }
            CaptureBackend::Scrot => {
                cmd.args(["-o", "-"]);
            }
        }

        let output = cmd.output()?;
        if !output.status.success() {
            return Err(CaptureError::CaptureFailed(format!(
                "{} failed: {}",
                backend.command(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if output.stdout.is_empty() {
            return Ok(None);
        }
        debug!(size = output.stdout.len(), window = window.0, "frame captured");
        Ok(Some(output.stdout))
    }
}

fn parse_window_ids(stdout: &str) -> Vec<WindowId> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<u64>().ok())
        .map(WindowId)
        .collect()
}

fn probe_command(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xdotool_output() {
        assert_eq!(
            parse_window_ids("12582919\n\n 41943047 \nnot-a-window\n"),
            vec![WindowId(12582919), WindowId(41943047)]
        );
        assert!(parse_window_ids("").is_empty());
    }

    #[test]
    fn backend_names() {
        assert_eq!(CaptureBackend::parse("maim"), Some(CaptureBackend::Maim));
        assert_eq!(CaptureBackend::parse("grim"), Some(CaptureBackend::Grim));
        assert_eq!(CaptureBackend::parse("gnome-screenshot"), None);
        assert!(CaptureBackend::Maim.targets_windows());
        assert!(!CaptureBackend::Scrot.targets_windows());
    }
}
