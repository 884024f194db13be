//! Configuration for a BOSH session.
//!
//! Holds everything recognized in the "Configuration (recognized options)"
//! section: the required CM endpoint and target domain, the optional
//! `from`/`lang`/`route` attributes decorated onto the session-creation
//! body, the requested `wait` seconds, and the process-scope tunables that
//! govern empty-request delay, pause margin, and debug assertions.

use crate::error::{BoshError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_lang() -> String {
    "en".to_string()
}

fn default_wait_seconds() -> u64 {
    60
}

fn default_empty_request_delay_ms() -> u64 {
    100
}

fn default_pause_margin_ms() -> u64 {
    500
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection manager HTTP endpoint.
    pub uri: String,

    /// Target domain (the `to` attribute).
    pub to: String,

    /// Optional `from` attribute.
    #[serde(default)]
    pub from: Option<String>,

    /// `xml:lang` attribute. Defaults to `"en"`.
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Optional `route` attribute.
    #[serde(default)]
    pub route: Option<String>,

    /// Requested `wait` seconds for long-polling. Defaults to 60.
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: u64,

    /// Delay before scheduling an empty keep-alive request, in milliseconds.
    /// Defaults to 100ms; only used when `hold=0` and no `polling` value was
    /// provided by the CM.
    #[serde(default = "default_empty_request_delay_ms")]
    pub empty_request_delay_ms: u64,

    /// Margin subtracted from `maxpause` when scheduling the pause-wake
    /// timer, in milliseconds. Defaults to 500ms.
    #[serde(default = "default_pause_margin_ms")]
    pub pause_margin_ms: u64,

    /// When true, enables extra invariant assertions useful in tests. Never
    /// enable in production: the assertions panic on violation rather than
    /// returning an error.
    #[serde(default)]
    pub assertions_enabled: bool,

    /// Disables scheduling of empty keep-alive requests entirely. Test hook
    /// only (see the empty-request keepalive scheduling rules).
    #[serde(default)]
    pub empty_requests_disabled: bool,
}

impl Config {
    /// Construct directly from required fields, applying defaults to the rest.
    pub fn new(uri: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            to: to.into(),
            from: None,
            lang: default_lang(),
            route: None,
            wait_seconds: default_wait_seconds(),
            empty_request_delay_ms: default_empty_request_delay_ms(),
            pause_margin_ms: default_pause_margin_ms(),
            assertions_enabled: false,
            empty_requests_disabled: false,
        }
    }

    /// Load configuration from a YAML file, then apply `BOSH_*` environment
    /// variable overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("config file not found at {}, falling back to env", path);
            Self::from_env()?
        };
        config.apply_env_vars();
        Ok(config)
    }

    /// Build configuration purely from `BOSH_URI`/`BOSH_TO` and friends.
    pub fn from_env() -> Result<Self> {
        let uri = std::env::var("BOSH_URI")
            .map_err(|_| BoshError::Config("BOSH_URI is not set".to_string()))?;
        let to = std::env::var("BOSH_TO")
            .map_err(|_| BoshError::Config("BOSH_TO is not set".to_string()))?;
        let mut config = Self::new(uri, to);
        config.apply_env_vars();
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BoshError::Config(format!("failed to read config file: {}", e)))?;
        let config: Self = serde_yaml::from_str(&contents)
            .map_err(|e| BoshError::Config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        if let Ok(uri) = std::env::var("BOSH_URI") {
            self.uri = uri;
        }
        if let Ok(to) = std::env::var("BOSH_TO") {
            self.to = to;
        }
        if let Ok(from) = std::env::var("BOSH_FROM") {
            self.from = Some(from);
        }
        if let Ok(lang) = std::env::var("BOSH_LANG") {
            self.lang = lang;
        }
        if let Ok(route) = std::env::var("BOSH_ROUTE") {
            self.route = Some(route);
        }
        if let Ok(wait) = std::env::var("BOSH_WAIT_SECONDS") {
            match wait.parse() {
                Ok(v) => self.wait_seconds = v,
                Err(_) => tracing::warn!("invalid BOSH_WAIT_SECONDS: {}", wait),
            }
        }
    }

    /// Parse `uri` as a URL, returning a config error if malformed.
    pub fn endpoint(&self) -> Result<url::Url> {
        Ok(url::Url::parse(&self.uri)?)
    }

    /// Validate field ranges and required content.
    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(BoshError::Config("uri must not be empty".to_string()).into());
        }
        self.endpoint()?;
        if self.to.trim().is_empty() {
            return Err(BoshError::Config("to must not be empty".to_string()).into());
        }
        if self.wait_seconds == 0 {
            return Err(BoshError::Config("wait_seconds must be greater than 0".to_string()).into());
        }
        if self.empty_request_delay_ms > 60_000 {
            return Err(BoshError::Config(
                "empty_request_delay_ms must be at most 60000".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn new_applies_defaults() {
        let cfg = Config::new("http://localhost:5280/http-bind", "example.com");
        assert_eq!(cfg.lang, "en");
        assert_eq!(cfg.wait_seconds, 60);
        assert_eq!(cfg.empty_request_delay_ms, 100);
        assert_eq!(cfg.pause_margin_ms, 500);
        assert!(!cfg.assertions_enabled);
        assert!(cfg.from.is_none());
    }

    #[test]
    fn validate_success() {
        let cfg = Config::new("http://localhost:5280/http-bind", "example.com");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_uri() {
        let mut cfg = Config::new("http://localhost:5280/http-bind", "example.com");
        cfg.uri = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_uri() {
        let mut cfg = Config::new("http://localhost:5280/http-bind", "example.com");
        cfg.uri = "not a url".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_to() {
        let mut cfg = Config::new("http://localhost:5280/http-bind", "example.com");
        cfg.to = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_wait() {
        let mut cfg = Config::new("http://localhost:5280/http-bind", "example.com");
        cfg.wait_seconds = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn from_yaml() {
        let yaml = r#"
uri: "http://cm.example.com/http-bind"
to: "example.com"
from: "client@example.com"
wait_seconds: 30
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.uri, "http://cm.example.com/http-bind");
        assert_eq!(cfg.to, "example.com");
        assert_eq!(cfg.from.as_deref(), Some("client@example.com"));
        assert_eq!(cfg.wait_seconds, 30);
        assert_eq!(cfg.lang, "en");
    }

    #[test]
    #[serial]
    fn load_reads_a_real_file_from_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "uri: \"http://cm.example.com/http-bind\"\nto: \"example.com\"\nwait_seconds: 45\n"
        )
        .unwrap();

        let cfg = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.uri, "http://cm.example.com/http-bind");
        assert_eq!(cfg.to, "example.com");
        assert_eq!(cfg.wait_seconds, 45);
    }

    #[test]
    #[serial]
    fn load_nonexistent_file_falls_back_to_env() {
        let _guard = EnvGuard::set(&[
            ("BOSH_URI", "http://cm.example.com/http-bind"),
            ("BOSH_TO", "example.com"),
        ]);
        let cfg = Config::load("/nonexistent/path/does-not-exist.yaml").unwrap();
        assert_eq!(cfg.uri, "http://cm.example.com/http-bind");
        assert_eq!(cfg.to, "example.com");
    }

    #[test]
    #[serial]
    fn apply_env_vars_overrides_fields() {
        let _guard = EnvGuard::set(&[
            ("BOSH_URI", "http://override.example.com/http-bind"),
            ("BOSH_TO", "override.example.com"),
            ("BOSH_FROM", "user@override.example.com"),
            ("BOSH_WAIT_SECONDS", "45"),
        ]);
        let mut cfg = Config::new("http://original.example.com/http-bind", "original.example.com");
        cfg.apply_env_vars();
        assert_eq!(cfg.uri, "http://override.example.com/http-bind");
        assert_eq!(cfg.to, "override.example.com");
        assert_eq!(cfg.from.as_deref(), Some("user@override.example.com"));
        assert_eq!(cfg.wait_seconds, 45);
    }

    /// Minimal RAII guard so env-mutating tests clean up after themselves.
    /// Tests using it are marked `#[serial]` since env vars are process-global.
    struct EnvGuard {
        keys: Vec<&'static str>,
    }

    impl EnvGuard {
        fn set(pairs: &[(&'static str, &str)]) -> Self {
            for (k, v) in pairs {
                unsafe {
                    std::env::set_var(k, v);
                }
            }
            Self {
                keys: pairs.iter().map(|(k, _)| *k).collect(),
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for k in &self.keys {
                unsafe {
                    std::env::remove_var(k);
                }
            }
        }
    }
}
