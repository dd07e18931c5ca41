use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::platform::telegram::DEFAULT_API_URL;

/// Optional settings file. Every field has a default, so a missing file is
/// the same as an empty one.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub webhook: WebhookSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    #[serde(default = "default_api_url")]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingSettings {
    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_certificate")]
    pub certificate: PathBuf,
    #[serde(default = "default_private_key")]
    pub private_key: PathBuf,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_poll_timeout() -> u32 {
    20
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_certificate() -> PathBuf {
    PathBuf::from("./cert/certificate.pem")
}

fn default_private_key() -> PathBuf {
    PathBuf::from("./cert/privkey.pem")
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: default_api_url(),
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            certificate: default_certificate(),
            private_key: default_private_key(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load `path` if one was given, otherwise use defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Everything the polling gateway needs.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub token: String,
    pub api_url: String,
    pub timeout_secs: u32,
}

impl PollingConfig {
    pub fn new(token: String, settings: &Settings) -> Self {
        Self {
            token,
            api_url: settings.api.url.clone(),
            timeout_secs: settings.polling.timeout_secs,
        }
    }
}

/// Everything the webhook gateway needs.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub token: String,
    pub api_url: String,
    pub port: u16,
    pub public_url: String,
    pub bind: String,
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

impl WebhookConfig {
    pub fn new(token: String, port: u16, public_url: String, settings: &Settings) -> Self {
        Self {
            token,
            api_url: settings.api.url.clone(),
            port,
            public_url,
            bind: settings.webhook.bind.clone(),
            certificate: settings.webhook.certificate.clone(),
            private_key: settings.webhook.private_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load_optional(None).unwrap();
        assert_eq!(settings.api.url, "https://api.telegram.org");
        assert_eq!(settings.polling.timeout_secs, 20);
        assert_eq!(settings.webhook.bind, "0.0.0.0");
        assert_eq!(
            settings.webhook.certificate,
            PathBuf::from("./cert/certificate.pem")
        );
        assert_eq!(settings.webhook.private_key, PathBuf::from("./cert/privkey.pem"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[api]
url = "http://127.0.0.1:9000"

[webhook]
certificate = "/etc/botgate/cert.pem"
"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.api.url, "http://127.0.0.1:9000");
        assert_eq!(settings.polling.timeout_secs, 20);
        assert_eq!(
            settings.webhook.certificate,
            PathBuf::from("/etc/botgate/cert.pem")
        );
        assert_eq!(settings.webhook.private_key, PathBuf::from("./cert/privkey.pem"));
    }

    #[test]
    fn test_missing_or_malformed_file_is_error() {
        assert!(Settings::load(Path::new("/nonexistent/botgate.toml")).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[polling]\ntimeout_secs = \"soon\"\n").unwrap();
        assert!(Settings::load(file.path()).is_err());
    }

    #[test]
    fn test_gateway_configs_take_cli_values() {
        let settings = Settings::default();
        let polling = PollingConfig::new("t".to_string(), &settings);
        assert_eq!(polling.token, "t");
        assert_eq!(polling.timeout_secs, 20);

        let webhook = WebhookConfig::new(
            "t".to_string(),
            8443,
            "https://example.com/webhook".to_string(),
            &settings,
        );
        assert_eq!(webhook.port, 8443);
        assert_eq!(webhook.public_url, "https://example.com/webhook");
        assert_eq!(webhook.bind, "0.0.0.0");
    }
}
