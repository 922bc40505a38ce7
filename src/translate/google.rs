//! Cloud Translation v3 client (`projects/*:translateText`).

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{TranslateError, Translation, Translator};
use crate::google::{CloudClient, CloudError};

const ENDPOINT: &str = "https://translation.googleapis.com/v3";

pub struct GoogleTranslator {
    client: CloudClient,
    /// `projects/<id>` or `projects/<id>/locations/<location>`.
    parent: String,
}

impl GoogleTranslator {
    pub fn new(client: CloudClient, project: &str) -> Self {
        Self {
            client,
            parent: parent_resource(project),
        }
    }

    pub fn from_env(project: &str) -> Result<Self, TranslateError> {
        let client = CloudClient::from_env(Some(project_id(project).to_string()))
            .map_err(|e| TranslateError::InvalidInput(e.to_string()))?;
        Ok(Self::new(client, project))
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }
}

/// Accept either a bare project id or a full `projects/...` resource name.
fn parent_resource(project: &str) -> String {
    let project = project.trim().trim_matches('/');
    if project.starts_with("projects/") {
        project.to_string()
    } else {
        format!("projects/{project}")
    }
}

pub(crate) fn project_id(project: &str) -> &str {
    let project = project.trim().trim_matches('/');
    let rest = project.strip_prefix("projects/").unwrap_or(project);
    rest.split('/').next().unwrap_or(rest)
}

impl From<CloudError> for TranslateError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Cancelled => TranslateError::Cancelled,
            CloudError::Timeout => TranslateError::Timeout,
            CloudError::RateLimited => TranslateError::RateLimited { retry_after_ms: 0 },
            CloudError::MissingToken => {
                TranslateError::InvalidInput(CloudError::MissingToken.to_string())
            }
            CloudError::Api(msg) => TranslateError::Api(msg),
        }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        target_language_code: &str,
        cancel: &CancellationToken,
    ) -> Result<Translation, TranslateError> {
        if text.is_empty() {
            return Err(TranslateError::InvalidInput("empty text".into()));
        }

        let url = format!("{ENDPOINT}/{}:translateText", self.parent);
        let body = serde_json::json!({
            "contents": [text],
            "targetLanguageCode": target_language_code,
        });

        let response = self.client.post_json(&url, &body, cancel).await?;
        let parsed: TranslateTextResponse = tokio::select! {
            r = response.json() => r.map_err(|e| TranslateError::Api(format!("bad response: {e}")))?,
            _ = cancel.cancelled() => return Err(TranslateError::Cancelled),
        };

        let first = parsed
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| TranslateError::Api("response carried no translations".into()))?;
        debug!(
            detected = %first.detected_language_code,
            "translateText ok"
        );

        Ok(Translation {
            translated_text: first.translated_text,
            detected_language_code: first.detected_language_code,
        })
    }
}

#[derive(Deserialize)]
struct TranslateTextResponse {
    #[serde(default)]
    translations: Vec<ApiTranslation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTranslation {
    translated_text: String,
    #[serde(default)]
    detected_language_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_accepts_bare_and_qualified_names() {
        assert_eq!(parent_resource("my-proj"), "projects/my-proj");
        assert_eq!(parent_resource("projects/my-proj"), "projects/my-proj");
        assert_eq!(
            parent_resource("projects/my-proj/locations/global"),
            "projects/my-proj/locations/global"
        );
        assert_eq!(project_id("projects/my-proj/locations/global"), "my-proj");
        assert_eq!(project_id("my-proj"), "my-proj");
    }

    #[test]
    fn parses_translate_text_response() {
        let body = r#"{"translations":[{"translatedText":"I&#39;m fine","detectedLanguageCode":"ja"}]}"#;
        let parsed: TranslateTextResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.translations[0].translated_text, "I&#39;m fine");
        assert_eq!(parsed.translations[0].detected_language_code, "ja");
    }

    #[test]
    fn cloud_errors_map_onto_translate_errors() {
        assert!(matches!(
            TranslateError::from(CloudError::Cancelled),
            TranslateError::Cancelled
        ));
        assert!(matches!(
            TranslateError::from(CloudError::Api("x".into())),
            TranslateError::Api(_)
        ));
    }
}
