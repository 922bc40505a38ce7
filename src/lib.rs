//! scshot: capture a window, OCR it and translate the text blocks worth reading.
//! Main library: tracing setup and wiring of the capture loop.

pub mod cancellation;
pub mod capture;
pub mod config;
pub mod display;
pub mod google;
pub mod history;
pub mod metrics;
pub mod ocr;
pub mod pipeline;
pub mod translate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use cancellation::Interrupt;
use capture::screen::CaptureBackend;
use capture::{CaptureError, ScreenCapture, WindowTarget};
use config::{ConfigError, DisplayKind, Settings};
use display::{ConsoleRenderer, HtmlRenderer, Renderer};
use google::{CloudClient, CloudError};
use history::{HistoryError, HistoryStore};
use metrics::MetricsRegistry;
use ocr::VisionOcr;
use pipeline::{Pipeline, PipelineError};
use translate::google::GoogleTranslator;
use translate::{BulkTranslator, TranslateError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Cloud(#[from] CloudError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("invalid loop interval: {0}")]
    InvalidInterval(f64),
}

/// Command-line options, already parsed.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: PathBuf,
    pub verbose: bool,
    /// Seconds between cycles; negative runs a single cycle.
    pub loop_secs: f64,
    /// Overrides `target_window_title` from the config file.
    pub window: Option<String>,
}

impl RunOptions {
    pub fn interval(&self) -> Result<Option<Duration>, AppError> {
        if !self.loop_secs.is_finite() {
            return Err(AppError::InvalidInterval(self.loop_secs));
        }
        if self.loop_secs < 0.0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_secs_f64(self.loop_secs)))
    }
}

/// Install the fmt subscriber. `RUST_LOG` wins over the defaults.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "scshot=debug" } else { "scshot=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

fn build_renderer(settings: &Settings) -> Arc<dyn Renderer> {
    match settings.display.kind {
        DisplayKind::Console => Arc::new(ConsoleRenderer::stdout(settings.display.clear)),
        DisplayKind::Html => Arc::new(HtmlRenderer::new(settings.display.html_path.clone())),
    }
}

/// Load settings, wire the services and run the capture loop until it ends
/// or Ctrl-C is pressed.
pub async fn run(options: RunOptions) -> Result<(), AppError> {
    let interval = options.interval()?;
    let settings = Settings::load_from_file(&options.config)?;
    debug!(?settings, "settings loaded");

    let interrupt = Arc::new(Interrupt::new());
    interrupt.listen_for_ctrl_c();
    let metrics = Arc::new(MetricsRegistry::new());

    let store = Arc::new(HistoryStore::open(
        &settings.history_db_dir,
        settings.history_cache_capacity,
    )?);

    let project = settings.google_translate_api_project_name.as_str();
    let translator = Arc::new(GoogleTranslator::from_env(project)?);
    let quota_project = translate::google::project_id(project).to_string();
    let vision_client = CloudClient::from_env(Some(quota_project))?;
    let ocr = Arc::new(VisionOcr::new(vision_client, interrupt.token()));

    let preferred = settings
        .capture_backend
        .as_deref()
        .and_then(CaptureBackend::parse);
    let frames = ScreenCapture::new(preferred);
    if !frames.is_available() {
        return Err(CaptureError::NoBackendAvailable.into());
    }

    let bulk = BulkTranslator::new(
        translator,
        store,
        settings.translation_policy(),
        Arc::clone(&metrics),
    )
    .with_max_concurrency(settings.max_concurrency);

    let title = options
        .window
        .as_deref()
        .or(settings.target_window_title.as_deref());
    let pipeline = Pipeline::new(
        Arc::new(frames),
        ocr,
        bulk,
        build_renderer(&settings),
        WindowTarget::from_title(title),
        metrics,
    )
    .with_ignored_word_languages(settings.language_codes_ignore.iter().cloned());

    pipeline.run(&interrupt, interval).await?;
    Ok(())
}
