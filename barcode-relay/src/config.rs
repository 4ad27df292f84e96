use config::{Config as ConfigBuilder, ConfigError, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable prefix (`BARCODE_RELAY_UPSTREAM__URL`, etc.)
pub const ENV_PREFIX: &str = "BARCODE_RELAY";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Upstream change feed (the barcodes database)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Database URL; `_changes` is resolved beneath it
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_seconds: u64,
    /// Outer limit for one long-poll; must exceed the upstream's own window
    pub request_timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5984/barcodes".to_string(),
            username: None,
            password: None,
            connect_timeout_seconds: 10,
            // CouchDB closes an idle longpoll after 60s
            request_timeout_seconds: 90,
        }
    }
}

impl UpstreamConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided; must exist)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_file, None)
    }

    /// Same as [`Config::load`], reading variables from `env` instead of the
    /// process environment when given.
    fn load_with_env(
        config_file: Option<&str>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Values stay strings until deserialized so credentials such as "007"
        // survive; numeric fields are still converted by serde.
        // Nested keys use a double underscore: BARCODE_RELAY_UPSTREAM__REQUEST_TIMEOUT_SECONDS
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Get HTTP listen address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Check the loaded values, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.upstream.url) {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => errors.push(format!(
                "upstream.url must use http or https, got {}",
                url.scheme()
            )),
            Ok(_) => {}
            Err(e) => errors.push(format!("upstream.url is invalid: {e}")),
        }

        if self.upstream.password.is_some() && self.upstream.username.is_none() {
            errors.push("upstream.password is set without upstream.username".to_string());
        }
        if self.upstream.connect_timeout_seconds == 0 {
            errors.push("upstream.connect_timeout_seconds must be greater than 0".to_string());
        }
        if self.upstream.request_timeout_seconds == 0 {
            errors.push("upstream.request_timeout_seconds must be greater than 0".to_string());
        } else if self.upstream.request_timeout_seconds <= self.upstream.connect_timeout_seconds {
            errors.push(
                "upstream.request_timeout_seconds must exceed upstream.connect_timeout_seconds"
                    .to_string(),
            );
        }

        if crate::logging::parse_log_level(&self.logging.level).is_err() {
            errors.push(format!("logging.level is invalid: {}", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be json or pretty, got {}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
