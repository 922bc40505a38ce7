//! Rendering of translated blocks.
//! Renderers receive structured records only; there is no user code execution.

use std::io::Write;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::ocr::Bounds;

/// A translated block ready to show, with its position in the captured frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRecord {
    pub original: String,
    pub translated: String,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl DisplayRecord {
    pub fn new(original: String, translated: String, bounds: Bounds) -> Self {
        Self {
            original,
            translated,
            left: bounds.left,
            top: bounds.top,
            right: bounds.right,
            bottom: bounds.bottom,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pluggable output for one capture cycle.
pub trait Renderer: Send + Sync {
    fn render(&self, records: &[DisplayRecord]) -> Result<(), RenderError>;
}

/// Prints `original` / `->translated` pairs, optionally clearing the terminal first.
pub struct ConsoleRenderer<W> {
    out: Mutex<W>,
    clear: bool,
}

impl ConsoleRenderer<std::io::Stdout> {
    pub fn stdout(clear: bool) -> Self {
        Self::new(std::io::stdout(), clear)
    }
}

impl<W: Write + Send> ConsoleRenderer<W> {
    pub fn new(out: W, clear: bool) -> Self {
        Self {
            out: Mutex::new(out),
            clear,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> Renderer for ConsoleRenderer<W> {
    fn render(&self, records: &[DisplayRecord]) -> Result<(), RenderError> {
        let mut out = self.out.lock();
        if self.clear {
            // ANSI: erase display, cursor home
            write!(out, "\x1b[2J\x1b[H")?;
        }
        for record in records {
            write!(out, "{}\n->{}\n\n", record.original, record.translated)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Rewrites an HTML page with one absolutely positioned box per block, laid out
/// at the block's position in the captured frame. Meant to be opened in a
/// browser with auto-refresh or shown as an overlay.
pub struct HtmlRenderer {
    path: PathBuf,
}

impl HtmlRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn page(records: &[DisplayRecord]) -> String {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
             <meta http-equiv=\"refresh\" content=\"1\">\
             <style>body{margin:0;position:relative}\
             .t{position:absolute;background:rgba(0,0,0,.75);color:#fff;font:14px sans-serif;padding:2px}\
             </style></head><body>\n",
        );
        for r in records {
            html.push_str(&format!(
                "<div class=\"t\" style=\"left:{}px;top:{}px;min-width:{}px;min-height:{}px\" title=\"{}\">{}</div>\n",
                r.left,
                r.top,
                (r.right - r.left).max(0),
                (r.bottom - r.top).max(0),
                escape_html(&r.original),
                escape_html(&r.translated),
            ));
        }
        html.push_str("</body></html>\n");
        html
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, records: &[DisplayRecord]) -> Result<(), RenderError> {
        let tmp = self.path.with_extension("html.tmp");
        std::fs::write(&tmp, Self::page(records))?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
