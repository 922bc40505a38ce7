//! Settings loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::history::cache::DEFAULT_CAPACITY;
use crate::translate::bulk::default_concurrency;
use crate::translate::TranslationPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// `projects/<id>` (or a bare project id) used for the Translation API.
    pub google_translate_api_project_name: String,
    #[serde(default)]
    pub target_window_title: Option<String>,
    #[serde(default)]
    pub text_ignore: Vec<String>,
    #[serde(default = "default_target_language_code")]
    pub target_language_code: String,
    #[serde(default = "default_display_codes")]
    pub language_codes_display: Vec<String>,
    /// Words OCR is certain are in one of these languages are dropped before translation.
    #[serde(default)]
    pub language_codes_ignore: Vec<String>,
    #[serde(default = "default_history_db_dir")]
    pub history_db_dir: PathBuf,
    #[serde(default = "default_cache_capacity")]
    pub history_cache_capacity: usize,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    /// `maim`, `grim` or `scrot`; auto-detected when absent.
    #[serde(default)]
    pub capture_backend: Option<String>,
    #[serde(default)]
    pub display: DisplaySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    Console,
    Html,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplaySettings {
    #[serde(default = "default_display_kind")]
    pub kind: DisplayKind,
    /// Clear the terminal before each console render.
    #[serde(default = "default_true")]
    pub clear: bool,
    #[serde(default = "default_html_path")]
    pub html_path: PathBuf,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            kind: default_display_kind(),
            clear: default_true(),
            html_path: default_html_path(),
        }
    }
}

fn default_target_language_code() -> String {
    "en-US".into()
}

fn default_display_codes() -> Vec<String> {
    vec!["en-US".into()]
}

fn default_history_db_dir() -> PathBuf {
    PathBuf::from("~/.cache/scshot/db")
}

fn default_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_display_kind() -> DisplayKind {
    DisplayKind::Console
}

fn default_true() -> bool {
    true
}

fn default_html_path() -> PathBuf {
    PathBuf::from("index.html")
}

impl Settings {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = toml::from_str(content)?;
        settings.history_db_dir = expand_home(&settings.history_db_dir);
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.google_translate_api_project_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "google_translate_api_project_name must not be empty".into(),
            ));
        }
        if self.target_language_code.trim().is_empty() {
            return Err(ConfigError::Invalid("target_language_code must not be empty".into()));
        }
        if self.history_cache_capacity == 0 {
            return Err(ConfigError::Invalid("history_cache_capacity must be > 0".into()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be > 0".into()));
        }
        if let Some(backend) = &self.capture_backend {
            if crate::capture::screen::CaptureBackend::parse(backend).is_none() {
                return Err(ConfigError::Invalid(format!("unknown capture_backend: {backend}")));
            }
        }
        Ok(())
    }

    pub fn translation_policy(&self) -> TranslationPolicy {
        TranslationPolicy::new(
            self.target_language_code.clone(),
            self.language_codes_display.iter().cloned(),
            self.text_ignore.iter().cloned(),
        )
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_settings_use_defaults() {
        let settings = Settings::from_toml(
            r#"
            google_translate_api_project_name = "project-id/name"
            target_window_title = "Game.exe"
            "#,
        )
        .unwrap();

        assert_eq!(settings.google_translate_api_project_name, "project-id/name");
        assert_eq!(settings.target_window_title.as_deref(), Some("Game.exe"));
        assert_eq!(settings.target_language_code, "en-US");
        assert_eq!(settings.language_codes_display, vec!["en-US".to_string()]);
        assert!(settings.text_ignore.is_empty());
        assert_eq!(settings.history_cache_capacity, 256);
        assert_eq!(settings.display.kind, DisplayKind::Console);
        assert!(settings.display.clear);
        assert!(!settings.history_db_dir.to_string_lossy().starts_with('~'));
        assert!(settings
            .history_db_dir
            .to_string_lossy()
            .ends_with(".cache/scshot/db"));
    }

    #[test]
    fn full_settings() {
        let settings = Settings::from_toml(
            r#"
            google_translate_api_project_name = "projects/demo"
            text_ignore = ["HP", "MP"]
            target_language_code = "ja"
            language_codes_display = ["en", "ko"]
            language_codes_ignore = ["ja"]
            history_db_dir = "/var/tmp/scshot"
            history_cache_capacity = 32
            max_concurrency = 4
            capture_backend = "grim"

            [display]
            kind = "html"
            html_path = "/tmp/overlay.html"
            "#,
        )
        .unwrap();

        let policy = settings.translation_policy();
        assert_eq!(policy.target_language_code, "ja");
        assert!(policy.displays("ko"));
        assert!(policy.is_skipped("MP"));
        assert_eq!(settings.history_db_dir, PathBuf::from("/var/tmp/scshot"));
        assert_eq!(settings.display.kind, DisplayKind::Html);
        assert_eq!(settings.display.html_path, PathBuf::from("/tmp/overlay.html"));
        assert_eq!(settings.max_concurrency, 4);
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            Settings::from_toml("target_window_title = \"x\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Settings::from_toml(
                "google_translate_api_project_name = \"p\"\ndisplay_code = \"print(results)\""
            ),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Settings::from_toml(
                "google_translate_api_project_name = \"p\"\nhistory_cache_capacity = 0"
            ),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Settings::from_toml("google_translate_api_project_name = \"p\"\ncapture_backend = \"gdi\""),
            Err(ConfigError::Invalid(_))
        ));
    }
}
