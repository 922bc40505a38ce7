//! Capture → OCR → bulk translate → render, once or on a fixed interval.
//!
//! A cycle resolves the target windows, captures each one, turns the frame
//! into text blocks, translates every block in one batch and renders what is
//! worth showing. Ctrl-C cancels the cycle in flight and stops the loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cancellation::{CycleToken, Interrupt};
use crate::capture::{CaptureError, FrameSource, WindowId, WindowTarget};
use crate::display::{DisplayRecord, RenderError, Renderer};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::ocr::{Bounds, OcrEngine, OcrError, OcrWord, TextBlock};
use crate::translate::BulkTranslator;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("capture task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub struct Pipeline {
    frames: Arc<dyn FrameSource>,
    ocr: Arc<dyn OcrEngine>,
    translator: BulkTranslator,
    renderer: Arc<dyn Renderer>,
    /// Words OCR is certain belong to one of these languages never reach the translator.
    ignored_word_languages: HashSet<String>,
    target: WindowTarget,
    metrics: Arc<MetricsRegistry>,
}

impl Pipeline {
    pub fn new(
        frames: Arc<dyn FrameSource>,
        ocr: Arc<dyn OcrEngine>,
        translator: BulkTranslator,
        renderer: Arc<dyn Renderer>,
        target: WindowTarget,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            frames,
            ocr,
            translator,
            renderer,
            ignored_word_languages: HashSet::new(),
            target,
            metrics,
        }
    }

    pub fn with_ignored_word_languages(
        mut self,
        codes: impl IntoIterator<Item = String>,
    ) -> Self {
        self.ignored_word_languages = codes.into_iter().collect();
        self
    }

    pub fn target(&self) -> &WindowTarget {
        &self.target
    }

    /// OCR one frame and translate its blocks. Only blocks with a non-empty
    /// translation are returned, each with its bounds in the frame.
    pub async fn detect_text(
        &self,
        image: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Vec<DisplayRecord>, PipelineError> {
        let span = self.metrics.span(metric_names::OCR);
        let blocks = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OcrError::Cancelled.into()),
            r = self.ocr.detect(image) => r?,
        };
        span.finish();

        let (texts, bounds): (Vec<String>, Vec<Bounds>) = blocks
            .into_iter()
            .filter_map(|block| self.block_text(block))
            .unzip();
        debug!(blocks = texts.len(), "text blocks detected");
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let translated = self.translator.bulk_translate(&texts, cancel).await;
        Ok(translated
            .into_iter()
            .zip(bounds)
            .filter(|(t, _)| t.is_displayable())
            .map(|(t, b)| DisplayRecord::new(t.original, t.translated, b))
            .collect())
    }

    /// Joined text of a block without ignored-language words; `None` when blank.
    fn block_text(&self, block: TextBlock) -> Option<(String, Bounds)> {
        let joined: String = block
            .words
            .iter()
            .filter(|w| !self.is_ignored_word(w))
            .map(|w| w.text.as_str())
            .collect();
        let text = joined.trim();
        if text.is_empty() {
            None
        } else {
            Some((text.to_string(), block.bounds))
        }
    }

    fn is_ignored_word(&self, word: &OcrWord) -> bool {
        word.languages
            .iter()
            .any(|l| l.confidence >= 1.0 && self.ignored_word_languages.contains(&l.code))
    }

    /// Capture one window, translate it and render. A window that yields no
    /// frame is skipped; a cancelled cycle renders nothing.
    pub async fn translate_window(
        &self,
        window: WindowId,
        cycle: &CycleToken,
    ) -> Result<(), PipelineError> {
        let span = self.metrics.span(metric_names::CAPTURE);
        let frames = Arc::clone(&self.frames);
        let frame = tokio::task::spawn_blocking(move || frames.capture(window)).await??;
        span.finish();

        let Some(image) = frame else {
            debug!(window = window.0, "no frame captured");
            return Ok(());
        };

        let records = self.detect_text(image, cycle.token()).await?;
        if cycle.is_cancelled() {
            return Ok(());
        }

        let span = self.metrics.span(metric_names::RENDER);
        self.renderer.render(&records)?;
        span.finish();
        info!(window = window.0, shown = records.len(), "window translated");
        Ok(())
    }

    /// One pass over every window matching the target.
    pub async fn run_cycle(&self, cycle: &CycleToken) -> Result<(), PipelineError> {
        let frames = Arc::clone(&self.frames);
        let target = self.target.clone();
        let windows = tokio::task::spawn_blocking(move || frames.windows(&target)).await??;
        if windows.is_empty() {
            debug!(target = ?self.target, "no matching window");
        }

        for window in windows {
            if cycle.is_cancelled() {
                break;
            }
            match self.translate_window(window, cycle).await {
                Err(PipelineError::Ocr(OcrError::Cancelled)) => break,
                other => other?,
            }
        }
        Ok(())
    }

    /// Run one cycle, or one cycle every `interval` until interrupted. In loop
    /// mode a failed cycle is logged and the loop goes on.
    pub async fn run(
        &self,
        interrupt: &Interrupt,
        interval: Option<Duration>,
    ) -> Result<(), PipelineError> {
        info!(target = ?self.target, ?interval, "capture loop started");
        let mut result = Ok(());

        loop {
            let started = Instant::now();
            let cycle = interrupt.next_cycle();
            let outcome = self
                .run_cycle(&cycle)
                .instrument(info_span!("cycle", generation = cycle.generation()))
                .await;

            let Some(interval) = interval else {
                result = outcome;
                break;
            };
            if let Err(e) = outcome {
                warn!(error = %e, generation = cycle.generation(), "capture cycle failed");
            }
            if interrupt.is_interrupted() {
                break;
            }

            let remaining = interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = interrupt.interrupted() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        match serde_json::to_string(&self.metrics.snapshot()) {
            Ok(summary) => info!(metrics = %summary, "capture loop stopped"),
            Err(e) => error!(error = %e, "metrics summary unavailable"),
        }
        result
    }
}
