//! Configuration management
//!
//! This module handles loading and parsing configuration for both services.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables consulted for the session TTL, in priority order.
pub const SESSION_TTL_ENV_KEYS: [&str; 2] = ["SESSION_TTL_SECONDS", "CHAT_SESSION_TTL_SECONDS"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Session store configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Generative AI backend configuration
    #[serde(default)]
    pub gemini: GeminiConfig,
    /// SMTP configuration
    #[serde(default)]
    pub smtp: SmtpConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session stops being usable
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Period of the background sweeper (0 disables it)
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

fn default_ttl_seconds() -> u64 {
    30
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

impl SessionConfig {
    /// TTL as a duration, never shorter than one second
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds.max(1))
    }

    /// Sweeper period, `None` when the sweeper is disabled
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0).then(|| Duration::from_secs(self.sweep_interval_seconds))
    }
}

/// Generative AI backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key (required for uploads and completions)
    #[serde(default)]
    pub api_key: Option<String>,
    /// API base URL
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// Model used for completions
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Outbound request timeout in seconds
    #[serde(default = "default_gemini_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            timeout_seconds: default_gemini_timeout(),
        }
    }
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_timeout() -> u64 {
    120
}

/// SMTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// SMTP relay host
    #[serde(default = "default_smtp_server")]
    pub server: String,
    /// SMTP port (STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// SMTP login
    #[serde(default)]
    pub login: String,
    /// SMTP password
    #[serde(default)]
    pub password: String,
    /// Sender address
    #[serde(default)]
    pub from_email: String,
    /// Sender display name
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: default_smtp_server(),
            port: default_smtp_port(),
            login: String::new(),
            password: String::new(),
            from_email: String::new(),
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Contract Lock".to_string()
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum document size in bytes (default: 20MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_max_file_size() -> u64 {
    20 * 1024 * 1024 // 20MB
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - CONTRACT_ASSIST_SERVER_HOST, CONTRACT_ASSIST_SERVER_PORT (or PORT)
    /// - SESSION_TTL_SECONDS / CHAT_SESSION_TTL_SECONDS
    /// - CONTRACT_ASSIST_SESSION_SWEEP_SECONDS
    /// - GEMINI_API_KEY (or GOOGLE_API_KEY), GEMINI_BASE_URL, GEMINI_MODEL
    /// - SMTP_SERVER, SMTP_PORT, SMTP_LOGIN, SMTP_PASSWORD, FROM_EMAIL, FROM_NAME
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Some(host) = env_non_empty("CONTRACT_ASSIST_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = first_env(&["CONTRACT_ASSIST_SERVER_PORT", "PORT"]) {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        // Session configuration
        if let Some(ttl) = resolve_session_ttl_seconds(first_env(&SESSION_TTL_ENV_KEYS)) {
            self.session.ttl_seconds = ttl;
        }
        if let Some(sweep) = env_non_empty("CONTRACT_ASSIST_SESSION_SWEEP_SECONDS") {
            if let Ok(sweep) = sweep.parse::<u64>() {
                self.session.sweep_interval_seconds = sweep;
            }
        }

        // Gemini configuration
        if let Some(key) = first_env(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]) {
            self.gemini.api_key = Some(key);
        }
        if let Some(base_url) = env_non_empty("GEMINI_BASE_URL") {
            self.gemini.base_url = base_url;
        }
        if let Some(model) = env_non_empty("GEMINI_MODEL") {
            self.gemini.model = model;
        }

        // SMTP configuration
        if let Some(server) = env_non_empty("SMTP_SERVER") {
            self.smtp.server = server;
        }
        if let Some(port) = env_non_empty("SMTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.smtp.port = port;
            }
        }
        if let Some(login) = env_non_empty("SMTP_LOGIN") {
            self.smtp.login = login;
        }
        if let Some(password) = env_non_empty("SMTP_PASSWORD") {
            self.smtp.password = password;
        }
        if let Some(from_email) = env_non_empty("FROM_EMAIL") {
            self.smtp.from_email = from_email;
        }
        if let Some(from_name) = env_non_empty("FROM_NAME") {
            self.smtp.from_name = from_name;
        }
    }
}

/// Resolve the TTL from a raw environment value.
///
/// `None` means the variable was absent and the configured value stands.
/// An unparsable value falls back to the 30 second default; parsed values
/// are clamped to at least one second.
pub fn resolve_session_ttl_seconds(raw: Option<String>) -> Option<u64> {
    let raw = raw?;
    match raw.trim().parse::<i64>() {
        Ok(ttl) => Some(ttl.max(1) as u64),
        Err(_) => Some(default_ttl_seconds()),
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// First non-empty value among `keys`
fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| env_non_empty(key))
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ALL_ENV_KEYS: &[&str] = &[
        "CONTRACT_ASSIST_SERVER_HOST",
        "CONTRACT_ASSIST_SERVER_PORT",
        "PORT",
        "SESSION_TTL_SECONDS",
        "CHAT_SESSION_TTL_SECONDS",
        "CONTRACT_ASSIST_SESSION_SWEEP_SECONDS",
        "GEMINI_API_KEY",
        "GOOGLE_API_KEY",
        "GEMINI_BASE_URL",
        "GEMINI_MODEL",
        "SMTP_SERVER",
        "SMTP_PORT",
        "SMTP_LOGIN",
        "SMTP_PASSWORD",
        "FROM_EMAIL",
        "FROM_NAME",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        for key in ALL_ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.session.ttl_seconds, 30);
        assert_eq!(config.session.sweep_interval_seconds, 60);
        assert_eq!(config.gemini.model, "gemini-2.5-flash");
        assert!(config.gemini.api_key.is_none());
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.smtp.from_name, "Contract Lock");
        assert_eq!(config.upload.max_file_size, 20 * 1024 * 1024);
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "   \n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.session.ttl_seconds, 30);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "session:\n  ttl_seconds: 90\nsmtp:\n  from_email: \"noreply@example.com\"\n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.session.ttl_seconds, 90);
        assert_eq!(config.session.sweep_interval_seconds, 60);
        assert_eq!(config.smtp.from_email, "noreply@example.com");
        assert_eq!(config.smtp.server, "smtp.gmail.com");
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "session:\n  ttl_seconds: [unclosed\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_session_ttl_never_below_one_second() {
        let config = SessionConfig {
            ttl_seconds: 0,
            sweep_interval_seconds: 0,
        };
        assert_eq!(config.ttl(), Duration::from_secs(1));
        assert!(config.sweep_interval().is_none());
    }

    #[test]
    fn test_resolve_session_ttl() {
        assert_eq!(resolve_session_ttl_seconds(None), None);
        assert_eq!(resolve_session_ttl_seconds(Some("45".into())), Some(45));
        assert_eq!(resolve_session_ttl_seconds(Some("not-a-number".into())), Some(30));
        assert_eq!(resolve_session_ttl_seconds(Some("0".into())), Some(1));
        assert_eq!(resolve_session_ttl_seconds(Some("-12".into())), Some(1));
    }

    #[test]
    fn test_env_ttl_first_non_empty_wins() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("SESSION_TTL_SECONDS", "");
        std::env::set_var("CHAT_SESSION_TTL_SECONDS", "75");
        let config = Config::load_with_env(std::path::Path::new("nonexistent_config.yml")).unwrap();
        assert_eq!(config.session.ttl_seconds, 75);

        std::env::set_var("SESSION_TTL_SECONDS", "15");
        let config = Config::load_with_env(std::path::Path::new("nonexistent_config.yml")).unwrap();
        assert_eq!(config.session.ttl_seconds, 15);

        clear_env();
    }

    #[test]
    fn test_env_ttl_unparsable_uses_default() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "session:\n  ttl_seconds: 300\n").unwrap();

        std::env::set_var("SESSION_TTL_SECONDS", "soon");
        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.session.ttl_seconds, 30);

        clear_env();
    }

    #[test]
    fn test_env_override_smtp_and_gemini() {
        let _guard = lock_env();
        clear_env();

        std::env::set_var("SMTP_SERVER", "mail.example.com");
        std::env::set_var("SMTP_PORT", "2525");
        std::env::set_var("FROM_EMAIL", "sign@example.com");
        std::env::set_var("GOOGLE_API_KEY", "fallback-key");
        std::env::set_var("GEMINI_MODEL", "gemini-2.0-pro");

        let config = Config::load_with_env(std::path::Path::new("nonexistent_config.yml")).unwrap();
        assert_eq!(config.smtp.server, "mail.example.com");
        assert_eq!(config.smtp.port, 2525);
        assert_eq!(config.smtp.from_email, "sign@example.com");
        assert_eq!(config.gemini.api_key.as_deref(), Some("fallback-key"));
        assert_eq!(config.gemini.model, "gemini-2.0-pro");

        std::env::set_var("GEMINI_API_KEY", "primary-key");
        let config = Config::load_with_env(std::path::Path::new("nonexistent_config.yml")).unwrap();
        assert_eq!(config.gemini.api_key.as_deref(), Some("primary-key"));

        clear_env();
    }

    #[test]
    fn test_env_override_invalid_port_ignored() {
        let _guard = lock_env();
        clear_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 9100\n").unwrap();

        std::env::set_var("CONTRACT_ASSIST_SERVER_PORT", "not_a_port");
        std::env::set_var("SMTP_PORT", "99999");
        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.smtp.port, 587);

        clear_env();
    }
}
