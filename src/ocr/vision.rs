//! Cloud Vision `images:annotate` client (TEXT_DETECTION).
//! Blocks come from the full-text annotation; each word keeps the language
//! hints Vision attached to it so callers can drop words before translation.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Bounds, DetectedLanguage, OcrEngine, OcrError, OcrWord, TextBlock};
use crate::google::{CloudClient, CloudError};

const ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

pub struct VisionOcr {
    client: CloudClient,
    cancel: CancellationToken,
}

impl VisionOcr {
    /// `cancel` aborts in-flight requests (e.g. on Ctrl-C).
    pub fn new(client: CloudClient, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }
}

impl From<CloudError> for OcrError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Cancelled => OcrError::Cancelled,
            other => OcrError::RequestFailed(other.to_string()),
        }
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn detect(&self, image: Vec<u8>) -> Result<Vec<TextBlock>, OcrError> {
        let content = base64::engine::general_purpose::STANDARD.encode(&image);
        let body = serde_json::json!({
            "requests": [{
                "image": { "content": content },
                "features": [{ "type": "TEXT_DETECTION" }],
            }]
        });

        let response = self.client.post_json(ENDPOINT, &body, &self.cancel).await?;
        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| OcrError::RequestFailed(format!("bad response: {e}")))?;

        let Some(first) = parsed.responses.into_iter().next() else {
            return Ok(Vec::new());
        };
        if let Some(err) = first.error {
            return Err(OcrError::Service(err.message));
        }
        let blocks = first
            .full_text_annotation
            .map(blocks_from_annotation)
            .unwrap_or_default();
        debug!(blocks = blocks.len(), "vision text detection");
        Ok(blocks)
    }
}

fn blocks_from_annotation(annotation: TextAnnotation) -> Vec<TextBlock> {
    let mut blocks = Vec::new();
    for block in annotation.pages.into_iter().flat_map(|p| p.blocks) {
        let Some(bounds) = Bounds::enclosing(
            block
                .bounding_box
                .vertices
                .iter()
                .map(|v| (v.x, v.y)),
        ) else {
            continue;
        };

        let words = block
            .paragraphs
            .into_iter()
            .flat_map(|p| p.words)
            .map(|word| {
                let mut text = String::new();
                for symbol in &word.symbols {
                    text.push_str(&symbol.text);
                    if symbol.breaks_with_space() {
                        text.push(' ');
                    }
                }
                let languages = word
                    .property
                    .map(|p| p.detected_languages)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|l| DetectedLanguage {
                        code: l.language_code,
                        confidence: l.confidence,
                    })
                    .collect();
                OcrWord { text, languages }
            })
            .collect();

        blocks.push(TextBlock { words, bounds });
    }
    blocks
}

// --- images:annotate response types ---

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Block {
    #[serde(default)]
    bounding_box: BoundingPoly,
    #[serde(default)]
    paragraphs: Vec<Paragraph>,
}

#[derive(Deserialize, Default)]
struct BoundingPoly {
    #[serde(default)]
    vertices: Vec<Vertex>,
}

/// Vision omits zero coordinates.
#[derive(Deserialize)]
struct Vertex {
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}

#[derive(Deserialize)]
struct Paragraph {
    #[serde(default)]
    words: Vec<Word>,
}

#[derive(Deserialize)]
struct Word {
    property: Option<TextProperty>,
    #[serde(default)]
    symbols: Vec<Symbol>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextProperty {
    #[serde(default)]
    detected_languages: Vec<ApiLanguage>,
    detected_break: Option<DetectedBreak>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLanguage {
    #[serde(default)]
    language_code: String,
    #[serde(default)]
    confidence: f32,
}

#[derive(Deserialize)]
struct DetectedBreak {
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Deserialize)]
struct Symbol {
    #[serde(default)]
    text: String,
    property: Option<TextProperty>,
}

impl Symbol {
    fn breaks_with_space(&self) -> bool {
        let kind = self
            .property
            .as_ref()
            .and_then(|p| p.detected_break.as_ref())
            .map(|b| b.kind.as_str());
        matches!(kind, Some("SPACE" | "SURE_SPACE" | "EOL_SURE_SPACE"))
    }
}
