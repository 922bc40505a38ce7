//! Bulk translation of the text blocks found in one frame.
//!
//! Each text is resolved independently: skipped (ignore list, digits only),
//! served from the history store, or sent to the external translator and
//! persisted. A batch runs every text as its own task on a bounded pool and
//! waits for all of them, so one failing call never takes its siblings down
//! and a cancelled batch leaves no work running behind it.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::entities::unescape_html;
use super::{TranslateError, Translator};
use crate::history::{HistoryRecord, HistoryStore};
use crate::metrics::{metric_names, MetricsRegistry};

/// What gets translated and which results are worth showing.
#[derive(Debug, Clone, Default)]
pub struct TranslationPolicy {
    pub target_language_code: String,
    /// Source languages whose translations are surfaced.
    pub display_languages: HashSet<String>,
    /// Literal texts that are never translated.
    pub ignored_texts: HashSet<String>,
}

impl TranslationPolicy {
    pub fn new(
        target_language_code: impl Into<String>,
        display_languages: impl IntoIterator<Item = String>,
        ignored_texts: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            target_language_code: target_language_code.into(),
            display_languages: display_languages.into_iter().collect(),
            ignored_texts: ignored_texts.into_iter().collect(),
        }
    }

    pub fn is_skipped(&self, text: &str) -> bool {
        self.ignored_texts.contains(text) || is_digits_only(text)
    }

    pub fn displays(&self, source_language_code: &str) -> bool {
        self.display_languages.contains(source_language_code)
    }
}

/// Non-empty and made of decimal digits only: ASCII `0-9` or full-width `０-９`.
/// Fractions, roman numerals and other non-decimal numerals are translated.
pub fn is_digits_only(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_decimal_digit)
}

fn is_decimal_digit(c: char) -> bool {
    c.is_ascii_digit() || ('\u{ff10}'..='\u{ff19}').contains(&c)
}

/// One resolved text. `translated` is empty when there is nothing to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedText {
    pub original: String,
    pub translated: String,
}

impl TranslatedText {
    pub fn empty(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            translated: String::new(),
        }
    }

    pub fn is_displayable(&self) -> bool {
        !self.translated.is_empty()
    }
}

/// Default worker count: CPUs + 4, capped at 32.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_add(4)
        .min(32)
}

#[derive(Clone)]
pub struct BulkTranslator {
    translator: Arc<dyn Translator>,
    store: Arc<HistoryStore>,
    policy: Arc<TranslationPolicy>,
    metrics: Arc<MetricsRegistry>,
    max_concurrency: usize,
}

impl BulkTranslator {
    pub fn new(
        translator: Arc<dyn Translator>,
        store: Arc<HistoryStore>,
        policy: TranslationPolicy,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            translator,
            store,
            policy: Arc::new(policy),
            metrics,
            max_concurrency: default_concurrency(),
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn policy(&self) -> &TranslationPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    /// Resolve a single text. Never fails: every error ends as an empty translation.
    pub async fn translate_text(&self, text: &str, cancel: &CancellationToken) -> TranslatedText {
        debug!(text, "resolve text");
        if self.policy.is_skipped(text) {
            self.metrics.incr(metric_names::SKIPPED);
            return TranslatedText::empty(text);
        }

        if let Some(record) = self.lookup(text).await {
            self.metrics.incr(metric_names::STORE_HITS);
            debug!(text, slc = %record.source_language_code, "found in history");
            return self.shown_if_wanted(text, &record.source_language_code, record.translated);
        }

        if cancel.is_cancelled() {
            self.metrics.incr(metric_names::CANCELLED);
            return TranslatedText::empty(text);
        }

        self.metrics.incr(metric_names::EXTERNAL_CALLS);
        let span = self.metrics.span(metric_names::TRANSLATE_CALL);
        let tlc = &self.policy.target_language_code;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TranslateError::Cancelled),
            r = self.translator.translate(text, tlc, cancel) => r,
        };
        span.finish();

        match result {
            Ok(translation) => {
                let translated = unescape_html(&translation.translated_text).into_owned();
                let slc = translation.detected_language_code;
                debug!(text, slc = %slc, translated = %translated, "translated");
                self.persist(HistoryRecord {
                    original: text.to_string(),
                    translated: translated.clone(),
                    target_language_code: tlc.clone(),
                    source_language_code: slc.clone(),
                })
                .await;
                self.shown_if_wanted(text, &slc, translated)
            }
            Err(TranslateError::Cancelled) => {
                debug!(text, "translation cancelled");
                self.metrics.incr(metric_names::CANCELLED);
                TranslatedText::empty(text)
            }
            Err(e) => {
                warn!(error = %e, text, "translation failed");
                self.metrics.incr(metric_names::EXTERNAL_FAILURES);
                TranslatedText::empty(text)
            }
        }
    }

    /// Resolve every text concurrently. The result has one entry per input, in
    /// input order. Cancelling `cancel` makes unfinished items resolve empty; the
    /// call still waits for every task before returning.
    pub async fn bulk_translate(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Vec<TranslatedText> {
        let batch_id = uuid::Uuid::new_v4();
        let span = self.metrics.span(metric_names::BATCH);
        info!(batch = %batch_id, texts = texts.len(), "bulk translate");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (idx, text) in texts.iter().enumerate() {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let token = cancel.child_token();
            let text = text.clone();

            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let resolved = match permit {
                    Some(_permit) => this.translate_text(&text, &token).await,
                    None => {
                        this.metrics.incr(metric_names::CANCELLED);
                        TranslatedText::empty(text)
                    }
                };
                (idx, resolved)
            });
        }

        let mut slots: Vec<Option<TranslatedText>> = vec![None; texts.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, resolved)) => slots[idx] = Some(resolved),
                Err(e) => warn!(batch = %batch_id, error = %e, "translation task did not finish"),
            }
        }

        let results: Vec<TranslatedText> = slots
            .into_iter()
            .zip(texts)
            .map(|(slot, text)| slot.unwrap_or_else(|| TranslatedText::empty(text.as_str())))
            .collect();

        let elapsed_ms = span.finish();
        info!(
            batch = %batch_id,
            displayable = results.iter().filter(|r| r.is_displayable()).count(),
            cancelled = cancel.is_cancelled(),
            elapsed_ms,
            "bulk translate done"
        );
        results
    }

    fn shown_if_wanted(&self, text: &str, slc: &str, translated: String) -> TranslatedText {
        if self.policy.displays(slc) {
            TranslatedText {
                original: text.to_string(),
                translated,
            }
        } else {
            debug!(text, slc, "source language not in display list");
            TranslatedText::empty(text)
        }
    }

    async fn lookup(&self, text: &str) -> Option<HistoryRecord> {
        let store = Arc::clone(&self.store);
        let original = text.to_string();
        let tlc = self.policy.target_language_code.clone();

        match tokio::task::spawn_blocking(move || store.lookup(&original, &tlc)).await {
            Ok(Ok(record)) => Some(record),
            Ok(Err(e)) => {
                debug!(error = %e, "history lookup missed");
                None
            }
            Err(e) => {
                warn!(error = %e, "history lookup task failed");
                None
            }
        }
    }

    async fn persist(&self, record: HistoryRecord) {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.insert(record)).await {
            Ok(Ok(outcome)) => debug!(?outcome, "history written"),
            Ok(Err(e)) => {
                warn!(error = %e, "history write failed");
                self.metrics.incr(metric_names::STORE_WRITE_FAILURES);
            }
            Err(e) => {
                warn!(error = %e, "history write task failed");
                self.metrics.incr(metric_names::STORE_WRITE_FAILURES);
            }
        }
    }
}
