//! Client configuration and loading
//!
//! Precedence: env vars > config file > defaults. Everything the resilient
//! layer tunes (base URL, timeout, retry budget, refresh skew) is supplied
//! here; nothing is read from globals at request time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::telemetry::LogFormat;
use peloton_auth::DEFAULT_CLIENT_ID;
use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Subscriber settings for `common::telemetry::init_tracing`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Backend location and transport settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Fallback retry budget
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Token lifecycle settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Defaults to `{base_url}/auth/refresh`
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_refresh_skew")]
    pub refresh_skew_secs: u64,
    /// Where to persist the credential between runs. Memory-only when unset.
    #[serde(default)]
    pub credential_file: Option<PathBuf>,
}

/// Header added to every request
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

fn default_timeout() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_refresh_skew() -> u64 {
    60
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_endpoint: None,
            client_id: default_client_id(),
            refresh_skew_secs: default_refresh_skew(),
            credential_file: None,
        }
    }
}

impl ClientConfig {
    /// Programmatic config with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
                timeout_secs: default_timeout(),
            },
            retry: RetryConfig::default(),
            auth: AuthConfig::default(),
            headers: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file, overlay environment variables,
    /// then validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: ClientConfig = toml::from_str(&contents)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate without touching the environment.
    pub fn from_toml_str(contents: &str) -> common::Result<Self> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `PELOTON_API_URL`, `PELOTON_TIMEOUT_SECS` and
    /// `PELOTON_CREDENTIAL_FILE`.
    pub fn apply_env(&mut self) -> common::Result<()> {
        if let Ok(url) = std::env::var("PELOTON_API_URL") {
            self.api.base_url = url;
        }
        if let Ok(raw) = std::env::var("PELOTON_TIMEOUT_SECS") {
            self.api.timeout_secs = raw.trim().parse().map_err(|e| {
                common::Error::Config(format!("PELOTON_TIMEOUT_SECS must be an integer: {e}"))
            })?;
        }
        if let Ok(path) = std::env::var("PELOTON_CREDENTIAL_FILE") {
            self.auth.credential_file = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> common::Result<()> {
        if !is_http_url(&self.api.base_url) {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if let Some(endpoint) = &self.auth.token_endpoint
            && !is_http_url(endpoint)
        {
            return Err(common::Error::Config(format!(
                "token_endpoint must start with http:// or https://, got: {endpoint}"
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.retry.base_delay_ms == 0 {
            return Err(common::Error::Config(
                "base_delay_ms must be greater than 0".into(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(common::Error::Config(format!(
                "max_delay_ms ({}) must be at least base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }

        Ok(())
    }

    /// Resolve config file path from an explicit argument or `PELOTON_CONFIG`.
    pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
        if let Some(p) = explicit {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("PELOTON_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("peloton.toml")
    }

    /// Install the tracing subscriber in the configured format. Returns
    /// `false` when one was already installed.
    pub fn init_tracing(&self) -> bool {
        common::telemetry::init_tracing(self.logging.format)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn refresh_skew(&self) -> Duration {
        Duration::from_secs(self.auth.refresh_skew_secs)
    }

    pub fn token_endpoint(&self) -> String {
        self.auth.token_endpoint.clone().unwrap_or_else(|| {
            format!("{}/auth/refresh", self.api.base_url.trim_end_matches('/'))
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn header_injections(&self) -> Vec<interceptor::HeaderInjection> {
        self.headers
            .iter()
            .map(|h| interceptor::HeaderInjection {
                name: h.name.clone(),
                value: h.value.clone(),
            })
            .collect()
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_overrides() {
        unsafe {
            remove_env("PELOTON_API_URL");
            remove_env("PELOTON_TIMEOUT_SECS");
            remove_env("PELOTON_CREDENTIAL_FILE");
        }
    }

    fn valid_toml() -> &'static str {
        r#"
[api]
base_url = "https://api.peloton.example/v1"

[auth]
client_id = "peloton-ios"

[[headers]]
name = "x-client"
value = "peloton-web"
"#
    }

    #[test]
    fn load_applies_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_overrides();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peloton.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.api.base_url, "https://api.peloton.example/v1");
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(config.auth.client_id, "peloton-ios");
        assert_eq!(config.auth.refresh_skew_secs, 60);
        assert!(config.auth.credential_file.is_none());
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.token_endpoint(),
            "https://api.peloton.example/v1/auth/refresh"
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peloton.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        unsafe {
            set_env("PELOTON_API_URL", "http://localhost:8080/api");
            set_env("PELOTON_TIMEOUT_SECS", "5");
            set_env("PELOTON_CREDENTIAL_FILE", "/tmp/peloton-cred.json");
        }
        let config = ClientConfig::load(&path);
        clear_overrides();

        let config = config.unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080/api");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(
            config.auth.credential_file,
            Some(PathBuf::from("/tmp/peloton-cred.json"))
        );
    }

    #[test]
    fn non_numeric_timeout_env_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut config = ClientConfig::new("https://api.peloton.example");
        unsafe { set_env("PELOTON_TIMEOUT_SECS", "soon") };
        let result = config.apply_env();
        clear_overrides();
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_is_error() {
        assert!(ClientConfig::load(Path::new("/nonexistent/peloton.toml")).is_err());
    }

    #[test]
    fn missing_api_section_is_error() {
        assert!(ClientConfig::from_toml_str("[retry]\nmax_retries = 1\n").is_err());
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = ClientConfig::from_toml_str("[api]\nbase_url = \"ftp://files\"\n").unwrap_err();
        assert!(err.to_string().contains("base_url"), "got: {err}");
    }

    #[test]
    fn rejects_zero_timeout() {
        let toml = "[api]\nbase_url = \"https://x\"\ntimeout_secs = 0\n";
        assert!(ClientConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn rejects_max_delay_below_base() {
        let toml = "[api]\nbase_url = \"https://x\"\n[retry]\nbase_delay_ms = 500\nmax_delay_ms = 100\n";
        let err = ClientConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("max_delay_ms"), "got: {err}");
    }

    #[test]
    fn rejects_non_http_token_endpoint() {
        let toml = "[api]\nbase_url = \"https://x\"\n[auth]\ntoken_endpoint = \"x/refresh\"\n";
        assert!(ClientConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn retry_policy_and_headers_are_derived() {
        let config = ClientConfig::from_toml_str(valid_toml()).unwrap();
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(config.header_injections()[0].name, "x-client");
        assert_eq!(config.refresh_skew(), Duration::from_secs(60));
    }

    #[test]
    fn logging_format_is_read() {
        let toml = "[api]\nbase_url = \"https://x\"\n[logging]\nformat = \"pretty\"\n";
        let config = ClientConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn resolve_path_prefers_explicit() {
        assert_eq!(
            ClientConfig::resolve_path(Some("/etc/peloton.toml")),
            PathBuf::from("/etc/peloton.toml")
        );
    }
}
