use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::constants::{
    DEFAULT_API_BASE, DEFAULT_MAX_IMAGE_MB, DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS,
};

pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_MODEL: &str = "CHILLI_SCAN_MODEL";
pub const ENV_API_BASE: &str = "CHILLI_SCAN_API_BASE";
pub const ENV_TIMEOUT_SECS: &str = "CHILLI_SCAN_TIMEOUT_SECS";
pub const ENV_MAX_IMAGE_MB: &str = "CHILLI_SCAN_MAX_IMAGE_MB";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API_KEY environment variable is not set (GEMINI_API_KEY is also accepted)")]
    MissingApiKey,
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub api_base: Url,
    pub request_timeout: Duration,
    pub max_image_bytes: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base", &self.api_base.as_str())
            .field("request_timeout", &self.request_timeout)
            .field("max_image_bytes", &self.max_image_bytes)
            .finish()
    }
}

impl Config {
    /// Validates the process environment once at startup. A `.env` file in
    /// the working directory is honoured when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = non_blank(ENV_API_KEY)
            .or_else(|| non_blank(ENV_GEMINI_API_KEY))
            .ok_or(ConfigError::MissingApiKey)?
            .trim()
            .to_string();

        let model = non_blank(ENV_MODEL).unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let api_base = match non_blank(ENV_API_BASE) {
            Some(raw) => parse_base(&raw)?,
            None => parse_base(DEFAULT_API_BASE)?,
        };

        let timeout_secs = match non_blank(ENV_TIMEOUT_SECS) {
            Some(raw) => parse_positive(ENV_TIMEOUT_SECS, &raw)?,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        let max_image_bytes = match non_blank(ENV_MAX_IMAGE_MB) {
            Some(raw) => {
                let mb = parse_positive(ENV_MAX_IMAGE_MB, &raw)?;
                usize::try_from(mb)
                    .ok()
                    .and_then(|mb| mb.checked_mul(1024 * 1024))
                    .ok_or_else(|| ConfigError::Invalid {
                        name: ENV_MAX_IMAGE_MB,
                        reason: format!("{mb} MB does not fit in memory"),
                    })?
            }
            None => DEFAULT_MAX_IMAGE_MB * 1024 * 1024,
        };

        Ok(Self {
            api_key,
            model,
            api_base,
            request_timeout: Duration::from_secs(timeout_secs),
            max_image_bytes,
        })
    }

    /// `{api_base}v1beta/models/{model}:generateContent`
    pub fn generate_content_url(&self) -> Result<Url, ConfigError> {
        self.api_base
            .join(&format!("v1beta/models/{}:generateContent", self.model))
            .map_err(|e| ConfigError::Invalid {
                name: ENV_MODEL,
                reason: e.to_string(),
            })
    }
}

fn parse_base(raw: &str) -> Result<Url, ConfigError> {
    // Url::join drops the last path segment unless the base ends with '/'.
    let raw = raw.trim();
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&normalized).map_err(|e| ConfigError::Invalid {
        name: ENV_API_BASE,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            name: ENV_API_BASE,
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn missing_key_is_fatal() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey);

        let err = Config::from_lookup(lookup(&[(ENV_API_KEY, "   ")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey);
    }

    #[test]
    fn falls_back_to_gemini_key_and_defaults() {
        let config = Config::from_lookup(lookup(&[(ENV_GEMINI_API_KEY, "k-123")])).unwrap();
        assert_eq!(config.api_key, "k-123");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_image_bytes, 20 * 1024 * 1024);
        assert_eq!(
            config.generate_content_url().unwrap().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn api_base_without_trailing_slash_keeps_its_path() {
        let config = Config::from_lookup(lookup(&[
            (ENV_API_KEY, "k"),
            (ENV_API_BASE, "http://127.0.0.1:9000/proxy"),
            (ENV_MODEL, "gemini-test"),
        ]))
        .unwrap();
        assert_eq!(
            config.generate_content_url().unwrap().as_str(),
            "http://127.0.0.1:9000/proxy/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn rejects_malformed_optional_values() {
        let err = Config::from_lookup(lookup(&[(ENV_API_KEY, "k"), (ENV_TIMEOUT_SECS, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name, .. } if name == ENV_TIMEOUT_SECS));

        let err = Config::from_lookup(lookup(&[(ENV_API_KEY, "k"), (ENV_API_BASE, "ftp://x")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name, .. } if name == ENV_API_BASE));

        let err = Config::from_lookup(lookup(&[
            (ENV_API_KEY, "k"),
            (ENV_MAX_IMAGE_MB, "18446744073709551615"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name, .. } if name == ENV_MAX_IMAGE_MB));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = Config::from_lookup(lookup(&[(ENV_API_KEY, "secret-key")])).unwrap();
        assert!(!format!("{config:?}").contains("secret-key"));
    }
}
