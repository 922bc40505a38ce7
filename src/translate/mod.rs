//! Translation: the external translator seam, the Cloud Translation client,
//! and the bulk orchestrator that sits between OCR output and the history store.

pub mod bulk;
pub mod entities;
pub mod google;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use bulk::{BulkTranslator, TranslatedText, TranslationPolicy};

/// Result of one external translation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// As returned by the service; may still contain HTML entities.
    pub translated_text: String,
    pub detected_language_code: String,
}

/// Translator trait (adapter for different backends).
/// Implementations are shared across concurrent calls and must not keep
/// per-call mutable state.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        target_language_code: &str,
        cancel: &CancellationToken,
    ) -> Result<Translation, TranslateError>;
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("API error: {0}")]
    Api(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("translation timeout")]
    Timeout,
    #[error("translation cancelled")]
    Cancelled,
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
