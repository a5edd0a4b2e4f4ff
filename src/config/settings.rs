//! Application settings and configuration types.
//!
//! Settings are persisted to `~/.config/sift/settings.json` (or the path
//! given with `--config`) and loaded at startup. A missing file yields
//! defaults; rule edits made through the HTTP config API are written back
//! to the same file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::{CategoryRule, Priority, RuleError, RuleSet};

/// Errors from loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Rules(#[from] RuleError),
}

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Gmail access configuration.
    pub gmail: GmailSettings,
    /// Language-model configuration.
    pub ai: AiSettings,
    /// Category rules driving classification and routing.
    pub rules: Vec<CategoryRule>,
    /// Calendar reminder defaults.
    pub calendar: CalendarSettings,
    /// Report output configuration.
    pub report: ReportSettings,
    /// HTTP surface configuration.
    pub server: ServerSettings,
    /// Attachment forwarding limits.
    pub attachments: AttachmentSettings,
}

impl Settings {
    /// Loads settings from `path`. A missing file yields defaults so the
    /// tool works before any configuration has been written.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "settings file missing, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes settings to `path` as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the rules as a [`RuleSet`] for matching and validation.
    pub fn ruleset(&self) -> RuleSet {
        RuleSet::new(self.rules.clone())
    }

    /// Validates the rule collection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ruleset().validate()?;
        Ok(())
    }

    /// Default settings path under the user's config directory.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("dev", "sift", "sift")
            .map(|dirs| dirs.config_dir().join("settings.json"))
            .unwrap_or_else(|| PathBuf::from("settings.json"))
    }

    /// Example settings with two illustrative (disabled) rules, used to
    /// seed a fresh config file.
    pub fn example() -> Self {
        let invoices = CategoryRule {
            keywords: vec![
                "invoice".into(),
                "payment due".into(),
                "receipt".into(),
                "billing".into(),
            ],
            senders: vec!["billing@vendor.example".into()],
            targets: vec!["finance@your-company.example".into()],
            priority: Priority::High,
            enabled: false,
            calendar: Some(crate::domain::CalendarRule {
                create_reminder: true,
                reminder_advance_minutes: 2880,
                duration_minutes: 30,
                color: Some("orange".into()),
                timezone: None,
                priorities: vec![Priority::High, Priority::Urgent],
            }),
            ..CategoryRule::named("invoices")
        };
        let travel = CategoryRule {
            keywords: vec![
                "flight".into(),
                "boarding pass".into(),
                "reservation".into(),
                "itinerary".into(),
            ],
            targets: vec!["you@your-domain.example".into()],
            direct_forward: false,
            enabled: false,
            ..CategoryRule::named("travel")
        };
        Self {
            rules: vec![invoices, travel],
            ..Self::default()
        }
    }
}

/// Gmail access configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailSettings {
    /// Path to the Google OAuth client file (`credentials.json`).
    pub credentials_path: PathBuf,
    /// Path where the OAuth token is stored after `sift auth`.
    pub token_path: PathBuf,
    /// Default cap on unread messages fetched per run.
    pub max_results: u32,
    /// API pacing: upper bound on message operations per minute.
    pub requests_per_minute: u32,
}

impl Default for GmailSettings {
    fn default() -> Self {
        let dir = directories::ProjectDirs::from("dev", "sift", "sift")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            credentials_path: dir.join("credentials.json"),
            token_path: dir.join("token.json"),
            max_results: 10,
            requests_per_minute: 60,
        }
    }
}

/// Language-model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    /// Provider name: "anthropic", "openai", or "ollama".
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable holding the API key. Keys never live in this file.
    pub api_key_env: String,
    /// Custom API endpoint (self-hosted or compatible APIs).
    pub base_url: Option<String>,
    /// Sampling temperature. Classification wants near-deterministic output.
    pub temperature: f32,
    /// Maximum tokens in the model response.
    pub max_tokens: Option<usize>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: 0.1,
            max_tokens: Some(1024),
        }
    }
}

/// Calendar reminder defaults; per-rule settings override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    /// Master switch for calendar reminders.
    pub enabled: bool,
    /// Target calendar. "primary" is the authenticated user's default.
    pub calendar_id: String,
    /// IANA timezone used when a rule does not set one.
    pub timezone: String,
    /// Default minutes-from-now for reminder start.
    pub reminder_advance_minutes: i64,
    /// Default event duration in minutes.
    pub duration_minutes: i64,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            calendar_id: "primary".to_string(),
            timezone: "UTC".to_string(),
            reminder_advance_minutes: 30,
            duration_minutes: 30,
        }
    }
}

/// Report output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Whether to email the report to the authenticated address.
    pub send_email: bool,
    /// Where the HTML report is written.
    pub html_path: PathBuf,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            send_email: true,
            html_path: PathBuf::from("triage-report.html"),
        }
    }
}

/// HTTP surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address for `sift serve` and the `sift auth` callback server.
    pub bind: String,
    /// Externally visible base URL; must match the redirect URI registered
    /// with the OAuth client.
    pub external_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            external_url: "http://localhost:8080".to_string(),
        }
    }
}

/// Attachment forwarding limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentSettings {
    /// Filename extensions eligible for forwarding.
    pub allowed_extensions: Vec<String>,
    /// Maximum attachment size carried on a forward.
    pub max_size_bytes: u64,
}

impl Default for AttachmentSettings {
    fn default() -> Self {
        Self {
            allowed_extensions: vec![
                "pdf".into(),
                "txt".into(),
                "doc".into(),
                "docx".into(),
                "xls".into(),
                "xlsx".into(),
                "csv".into(),
            ],
            max_size_bytes: 10 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.gmail.max_results, 10);
        assert!(!settings.calendar.enabled);
        assert_eq!(settings.ai.temperature, 0.1);
    }

    #[test]
    fn example_settings_are_valid_and_disabled() {
        let settings = Settings::example();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.rules.len(), 2);
        assert!(settings.rules.iter().all(|r| !r.enabled));
    }

    #[test]
    fn settings_roundtrip() {
        let mut settings = Settings::example();
        settings.ai.provider = "anthropic".to_string();
        settings.ai.model = "claude-3-5-haiku-20241022".to_string();
        settings.calendar.enabled = true;

        let json = serde_json::to_string_pretty(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();

        assert_eq!(back.ai.provider, "anthropic");
        assert!(back.calendar.enabled);
        assert_eq!(back.rules.len(), 2);
    }

    #[test]
    fn sparse_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"ai": {"provider": "ollama"}}"#).unwrap();
        assert_eq!(settings.ai.provider, "ollama");
        // Untouched sections keep defaults.
        assert_eq!(settings.gmail.max_results, 10);
        assert_eq!(settings.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let settings = Settings::load(&path).unwrap();
        assert!(settings.rules.is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::example();
        settings.report.send_email = false;
        settings.save(&path).unwrap();

        let back = Settings::load(&path).unwrap();
        assert!(!back.report.send_email);
        assert_eq!(back.rules.len(), 2);
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
