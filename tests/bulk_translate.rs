use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use scshot::history::{HistoryRecord, HistoryStore};
use scshot::metrics::{metric_names, MetricsRegistry};
use scshot::translate::{
    BulkTranslator, TranslateError, TranslatedText, Translation, TranslationPolicy, Translator,
};

const TLC: &str = "en-US";

/// Echoes `[tlc] text`, records every call and tracks how many calls overlap.
struct MockTranslator {
    language: String,
    fail_on: HashSet<String>,
    hang_on: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTranslator {
    fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            fail_on: HashSet::new(),
            hang_on: HashSet::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn failing_on(mut self, text: &str) -> Self {
        self.fail_on.insert(text.to_string());
        self
    }

    fn hanging_on(mut self, text: &str) -> Self {
        self.hang_on.insert(text.to_string());
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().clone();
        calls.sort();
        calls
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(
        &self,
        text: &str,
        target_language_code: &str,
        cancel: &CancellationToken,
    ) -> Result<Translation, TranslateError> {
        self.calls.lock().push(text.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if self.hang_on.contains(text) {
            cancel.cancelled().await;
            return Err(TranslateError::Cancelled);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.contains(text) {
            return Err(TranslateError::Api("500 backend error".into()));
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(Translation {
            translated_text: format!("[{target_language_code}] {text}"),
            detected_language_code: self.language.clone(),
        })
    }
}

fn open_store(dir: &TempDir) -> Arc<HistoryStore> {
    Arc::new(HistoryStore::open(dir.path(), 64).unwrap())
}

fn bulk_with(translator: Arc<MockTranslator>, store: Arc<HistoryStore>) -> BulkTranslator {
    let policy = TranslationPolicy::new(TLC, vec!["ja".to_string()], vec!["HP".to_string()]);
    BulkTranslator::new(translator, store, policy, Arc::new(MetricsRegistry::new()))
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn shown(original: &str) -> TranslatedText {
    TranslatedText {
        original: original.to_string(),
        translated: format!("[{TLC}] {original}"),
    }
}

#[tokio::test]
async fn skips_ignored_and_digit_texts_without_calling_out() {
    let dir = TempDir::new().unwrap();
    let translator = Arc::new(MockTranslator::new("ja"));
    let bulk = bulk_with(Arc::clone(&translator), open_store(&dir));

    let batch = texts(&["１２３", "HP", "こんにちは", "さようなら"]);
    let results = bulk.bulk_translate(&batch, &CancellationToken::new()).await;

    assert_eq!(
        results,
        vec![
            TranslatedText::empty("１２３"),
            TranslatedText::empty("HP"),
            shown("こんにちは"),
            shown("さようなら"),
        ]
    );
    assert_eq!(translator.calls(), texts(&["こんにちは", "さようなら"]));
}

#[tokio::test]
async fn stored_record_short_circuits_the_call() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store
        .insert(HistoryRecord {
            original: "ありがとう".into(),
            translated: "thanks".into(),
            target_language_code: TLC.into(),
            source_language_code: "ja".into(),
        })
        .unwrap();

    let translator = Arc::new(MockTranslator::new("ja"));
    let bulk = bulk_with(Arc::clone(&translator), store);
    let results = bulk
        .bulk_translate(&texts(&["ありがとう"]), &CancellationToken::new())
        .await;

    assert_eq!(results[0].translated, "thanks");
    assert!(translator.calls().is_empty());
}

#[tokio::test]
async fn undisplayed_language_is_persisted_but_hidden() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let translator = Arc::new(MockTranslator::new("fr"));
    let bulk = bulk_with(Arc::clone(&translator), Arc::clone(&store));

    let batch = texts(&["bonjour"]);
    let first = bulk.bulk_translate(&batch, &CancellationToken::new()).await;
    assert_eq!(first, vec![TranslatedText::empty("bonjour")]);

    let record = store.get("bonjour", TLC).unwrap();
    assert_eq!(record.source_language_code, "fr");
    assert_eq!(record.translated, "[en-US] bonjour");

    let second = bulk.bulk_translate(&batch, &CancellationToken::new()).await;
    assert_eq!(second, first);
    assert_eq!(translator.calls().len(), 1);
}

#[tokio::test]
async fn failing_call_does_not_affect_siblings() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let translator = Arc::new(MockTranslator::new("ja").failing_on("壊れた"));
    let metrics = Arc::new(MetricsRegistry::new());
    let policy = TranslationPolicy::new(TLC, vec!["ja".to_string()], Vec::new());
    let bulk = BulkTranslator::new(
        translator.clone(),
        Arc::clone(&store),
        policy,
        Arc::clone(&metrics),
    );

    let results = bulk
        .bulk_translate(&texts(&["壊れた", "元気"]), &CancellationToken::new())
        .await;

    assert_eq!(results, vec![TranslatedText::empty("壊れた"), shown("元気")]);
    assert!(store.get("壊れた", TLC).is_err());
    assert!(store.get("元気", TLC).is_ok());
    assert_eq!(metrics.counter(metric_names::EXTERNAL_FAILURES), 1);
    assert_eq!(metrics.counter(metric_names::EXTERNAL_CALLS), 2);
}

#[tokio::test]
async fn html_entities_are_decoded_before_storing() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let translator = Arc::new(MockTranslator::new("ja"));
    let bulk = bulk_with(translator, Arc::clone(&store));

    let original = "Tom &amp; &#39;Jerry&#x27;";
    let results = bulk
        .bulk_translate(&texts(&[original]), &CancellationToken::new())
        .await;

    assert_eq!(results[0].translated, "[en-US] Tom & 'Jerry'");
    assert_eq!(store.get(original, TLC).unwrap().translated, "[en-US] Tom & 'Jerry'");
}

#[tokio::test]
async fn cancelled_batch_returns_promptly_and_keeps_finished_items() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let translator = Arc::new(
        MockTranslator::new("ja")
            .hanging_on("待つ")
            .hanging_on("まだ"),
    );
    let bulk = bulk_with(Arc::clone(&translator), Arc::clone(&store));
    let cancel = CancellationToken::new();

    let canceller = {
        let translator = Arc::clone(&translator);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while translator.completed.load(Ordering::SeqCst) < 1
                || translator.in_flight.load(Ordering::SeqCst) < 2
            {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            cancel.cancel();
        })
    };

    let batch = texts(&["速い", "待つ", "まだ"]);
    let results = tokio::time::timeout(Duration::from_secs(5), bulk.bulk_translate(&batch, &cancel))
        .await
        .expect("cancelled batch must return");
    canceller.await.unwrap();

    assert_eq!(
        results,
        vec![
            shown("速い"),
            TranslatedText::empty("待つ"),
            TranslatedText::empty("まだ"),
        ]
    );
    assert_eq!(translator.in_flight.load(Ordering::SeqCst), 0);
    assert!(store.get("速い", TLC).is_ok());
    assert!(store.get("待つ", TLC).is_err());
    assert!(store.get("まだ", TLC).is_err());
}

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let dir = TempDir::new().unwrap();
    let translator = Arc::new(MockTranslator::new("ja"));
    let bulk = bulk_with(Arc::clone(&translator), open_store(&dir));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let batch = texts(&["一", "二", "三"]);
    let results = bulk.bulk_translate(&batch, &cancel).await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| !r.is_displayable()));
    assert!(translator.calls().is_empty());
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let dir = TempDir::new().unwrap();
    let translator = Arc::new(MockTranslator::new("ja").with_delay(Duration::from_millis(10)));
    let bulk = bulk_with(Arc::clone(&translator), open_store(&dir)).with_max_concurrency(3);

    let batch: Vec<String> = (0..20).map(|i| format!("文{i}")).collect();
    let results = bulk.bulk_translate(&batch, &CancellationToken::new()).await;

    assert!(results.iter().all(TranslatedText::is_displayable));
    assert_eq!(translator.calls().len(), 20);
    let max = translator.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=3).contains(&max), "max in flight was {max}");
}

#[tokio::test]
async fn later_batches_and_restarts_are_served_from_history() {
    let dir = TempDir::new().unwrap();
    let translator = Arc::new(MockTranslator::new("ja"));
    let batch = texts(&["朝", "昼", "夜"]);

    let first = bulk_with(Arc::clone(&translator), open_store(&dir))
        .bulk_translate(&batch, &CancellationToken::new())
        .await;
    assert_eq!(translator.calls().len(), 3);

    // fresh store over the same directory, as after a restart
    let again = bulk_with(Arc::clone(&translator), open_store(&dir))
        .bulk_translate(&batch, &CancellationToken::new())
        .await;
    assert_eq!(again, first);
    assert_eq!(translator.calls().len(), 3);
}

#[tokio::test]
async fn duplicate_texts_in_one_batch_keep_a_single_record() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let translator = Arc::new(MockTranslator::new("ja"));
    let bulk = bulk_with(translator, Arc::clone(&store));

    let results = bulk
        .bulk_translate(&texts(&["同じ", "同じ"]), &CancellationToken::new())
        .await;
    assert_eq!(results, vec![shown("同じ"), shown("同じ")]);

    let shard = std::fs::read_to_string(store.shard_path("同じ", TLC)).unwrap();
    let records: Vec<HistoryRecord> = serde_json::from_str(&shard).unwrap();
    assert_eq!(records.iter().filter(|r| r.original == "同じ").count(), 1);
}
