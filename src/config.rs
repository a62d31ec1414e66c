//! Application-wide runtime configuration.
//!
//! Values are layered with `figment`: built-in defaults, then `parakeet.toml`,
//! then `parakeet.yaml`, then `PARAKEET_*` environment variables, and finally the
//! port assigned by the hosting platform through `SAGEMAKER_BIND_TO_PORT`.

use figment::{
    providers::{Env, Format, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{http, model};
use crate::error::{AppError, Result};

/// Serde helper for Duration serialization/deserialization as seconds
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    Json,
    /// Compact human readable lines.
    Pretty,
}

// Default value functions for serde defaults
fn default_server_host() -> String { "0.0.0.0".to_string() }
fn default_server_port() -> u16 { http::DEFAULT_PORT }
fn default_max_request_bytes() -> usize { 32 * 1024 * 1024 }
fn default_max_concurrent_inferences() -> usize { 1 }
fn default_model_id() -> String { model::DEFAULT_MODEL_ID.to_string() }
fn default_runtime_url() -> String { "http://127.0.0.1:9000".to_string() }
fn default_runtime_timeout() -> Duration { Duration::from_secs(300) }
fn default_load_attempts() -> u32 { 60 }
fn default_load_retry_delay() -> Duration { Duration::from_secs(5) }
fn default_warmup() -> bool { true }
fn default_audio_fetch_timeout() -> Duration { Duration::from_secs(60) }
fn default_max_audio_bytes() -> usize { 64 * 1024 * 1024 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> LogFormat { LogFormat::Json }

/// Inference service configuration loaded from multiple sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server host
    #[serde(default = "default_server_host")]
    pub server_host: String,

    /// HTTP server port
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Number of model calls allowed to run at the same time
    #[serde(default = "default_max_concurrent_inferences")]
    pub max_concurrent_inferences: usize,

    /// Hub identifier of the served model, echoed in every response
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Base URL of the speech runtime hosting the model
    #[serde(default = "default_runtime_url")]
    pub runtime_url: String,

    /// Optional bearer token for the speech runtime
    #[serde(default)]
    pub runtime_api_key: Option<String>,

    /// Timeout for a single transcription call against the runtime
    #[serde(with = "duration_secs", default = "default_runtime_timeout")]
    pub runtime_timeout: Duration,

    /// How many times to probe the runtime before giving up on loading
    #[serde(default = "default_load_attempts")]
    pub load_attempts: u32,

    /// Fixed delay between load probes
    #[serde(with = "duration_secs", default = "default_load_retry_delay")]
    pub load_retry_delay: Duration,

    /// Run a synthetic inference before reporting ready
    #[serde(default = "default_warmup")]
    pub warmup: bool,

    /// Timeout for fetching audio referenced by URL
    #[serde(with = "duration_secs", default = "default_audio_fetch_timeout")]
    pub audio_fetch_timeout: Duration,

    /// Largest accepted decoded audio payload in bytes
    #[serde(default = "default_max_audio_bytes")]
    pub max_audio_bytes: usize,

    /// Directory for per-request temporary files (system default when unset)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Log level filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: default_server_port(),
            max_request_bytes: default_max_request_bytes(),
            max_concurrent_inferences: default_max_concurrent_inferences(),
            model_id: default_model_id(),
            runtime_url: default_runtime_url(),
            runtime_api_key: None,
            runtime_timeout: default_runtime_timeout(),
            load_attempts: default_load_attempts(),
            load_retry_delay: default_load_retry_delay(),
            warmup: default_warmup(),
            audio_fetch_timeout: default_audio_fetch_timeout(),
            max_audio_bytes: default_max_audio_bytes(),
            temp_dir: None,
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with precedence:
    /// 1. `SAGEMAKER_BIND_TO_PORT` (highest priority)
    /// 2. `PARAKEET_*` environment variables
    /// 3. parakeet.yaml (if exists)
    /// 4. parakeet.toml (if exists)
    /// 5. Built-in defaults (lowest priority)
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// The layered provider chain, exposed so tests and tools can extend it.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("parakeet.toml"))
            .merge(Yaml::file("parakeet.yaml"))
            .merge(Env::prefixed("PARAKEET_"))
            .merge(
                Env::raw()
                    .only(&[http::BIND_PORT_ENV])
                    .map(|_| "server_port".into()),
            )
    }

    /// Extract and validate a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| AppError::Config(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server_host.is_empty() {
            return Err(AppError::Config("server_host cannot be empty".to_string()));
        }

        if self.server_port == 0 {
            return Err(AppError::Config(
                "server_port must be between 1 and 65535".to_string(),
            ));
        }

        if self.model_id.trim().is_empty() {
            return Err(AppError::Config("model_id cannot be empty".to_string()));
        }

        if !self.runtime_url.starts_with("http://") && !self.runtime_url.starts_with("https://")
        {
            return Err(AppError::Config(
                "runtime_url must start with http:// or https://".to_string(),
            ));
        }

        if self.max_concurrent_inferences == 0 {
            return Err(AppError::Config(
                "max_concurrent_inferences must be at least 1".to_string(),
            ));
        }

        if self.load_attempts == 0 {
            return Err(AppError::Config(
                "load_attempts must be at least 1".to_string(),
            ));
        }

        if self.runtime_timeout.is_zero() || self.audio_fetch_timeout.is_zero() {
            return Err(AppError::Config(
                "runtime_timeout and audio_fetch_timeout must be at least 1 second".to_string(),
            ));
        }

        if self.max_audio_bytes == 0 || self.max_request_bytes == 0 {
            return Err(AppError::Config(
                "size limits must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load().expect("defaults are valid");
            assert_eq!(config.server_port, 8080);
            assert_eq!(config.model_id, "nvidia/parakeet-tdt-0.6b-v2");
            assert_eq!(config.max_concurrent_inferences, 1);
            assert_eq!(config.audio_fetch_timeout, Duration::from_secs(60));
            assert_eq!(config.log_format, LogFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn test_platform_port_overrides_everything() {
        Jail::expect_with(|jail| {
            jail.create_file("parakeet.toml", "server_port = 9001")?;
            jail.set_env("PARAKEET_SERVER_PORT", "9002");
            jail.set_env("SAGEMAKER_BIND_TO_PORT", "9003");

            let config = Config::load().expect("valid config");
            assert_eq!(config.server_port, 9003);
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "parakeet.toml",
                r#"
                    runtime_url = "http://runtime:8000"
                    audio_fetch_timeout = 10
                    log_format = "pretty"
                "#,
            )?;
            jail.set_env("PARAKEET_MAX_CONCURRENT_INFERENCES", "4");

            let config = Config::load().expect("valid config");
            assert_eq!(config.runtime_url, "http://runtime:8000");
            assert_eq!(config.audio_fetch_timeout, Duration::from_secs(10));
            assert_eq!(config.log_format, LogFormat::Pretty);
            assert_eq!(config.max_concurrent_inferences, 4);
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_bad_runtime_url() {
        Jail::expect_with(|jail| {
            jail.set_env("PARAKEET_RUNTIME_URL", "runtime:8000");
            assert!(matches!(Config::load(), Err(AppError::Config(_))));
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        Jail::expect_with(|jail| {
            jail.set_env("PARAKEET_MAX_CONCURRENT_INFERENCES", "0");
            assert!(Config::load().is_err());
            Ok(())
        });
    }
}
