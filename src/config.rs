// Copyright 2026 The Streamlens Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator.
//
// Loads streamlens.yaml, applies defaults, and validates the result.

use serde::Deserialize;
use std::path::PathBuf;

/// Default listen port for the observing proxy. Always bound on
/// localhost.
pub const DEFAULT_PORT: u16 = 9870;

/// Default decode-buffer cap per connection.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = crate::session::DEFAULT_MAX_BUFFER_BYTES;

/// Default pass-through channel capacity per tapped stream.
pub const DEFAULT_TAP_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// All errors that can occur during config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config source: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// ConfigSource trait (interface-first, dependency injection)
// ---------------------------------------------------------------------------

/// Abstraction over where config YAML comes from.
///
/// `FileSource` reads from disk; `StringSource` provides content
/// directly (used in tests to avoid file I/O).
pub trait ConfigSource {
    fn load(&self) -> Result<String, ConfigError>;
}

/// Loads config from a file on disk.
pub struct FileSource {
    pub path: PathBuf,
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

/// Provides config content directly as a string. Used for testing.
pub struct StringSource {
    pub content: String,
}

impl ConfigSource for StringSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(self.content.clone())
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Raw YAML shape; every field optional except the upstream.
#[derive(Debug, Deserialize)]
struct RawConfig {
    upstream: Option<String>,
    listen_port: Option<u16>,
    max_buffer_bytes: Option<usize>,
    tap_channel_capacity: Option<usize>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL every proxied request is forwarded to.
    pub upstream: String,
    pub listen_port: u16,
    pub max_buffer_bytes: usize,
    pub tap_channel_capacity: usize,
}

impl Config {
    /// Defaults with the given upstream, for flag-only startup.
    pub fn with_upstream(upstream: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            upstream: upstream.into(),
            listen_port: DEFAULT_PORT,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            tap_channel_capacity: DEFAULT_TAP_CHANNEL_CAPACITY,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.is_empty() {
            return Err(ConfigError::Validation(
                "upstream base URL is required".to_string(),
            ));
        }
        if !self.upstream.starts_with("http://") && !self.upstream.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "upstream must be an http(s) URL, got \"{}\"",
                self.upstream
            )));
        }
        if self.max_buffer_bytes < 1024 {
            return Err(ConfigError::Validation(format!(
                "max_buffer_bytes must be at least 1024, got {}",
                self.max_buffer_bytes
            )));
        }
        if self.tap_channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "tap_channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load, default, and validate a config.
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw: RawConfig = serde_yaml::from_str(&source.load()?)?;

    let config = Config {
        upstream: raw.upstream.unwrap_or_default(),
        listen_port: raw.listen_port.unwrap_or(DEFAULT_PORT),
        max_buffer_bytes: raw.max_buffer_bytes.unwrap_or(DEFAULT_MAX_BUFFER_BYTES),
        tap_channel_capacity: raw
            .tap_channel_capacity
            .unwrap_or(DEFAULT_TAP_CHANNEL_CAPACITY),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        load_config(&StringSource {
            content: content.to_string(),
        })
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = from_yaml("upstream: \"https://api.example.com\"\n").unwrap();
        assert_eq!(config.upstream, "https://api.example.com");
        assert_eq!(config.listen_port, DEFAULT_PORT);
        assert_eq!(config.max_buffer_bytes, DEFAULT_MAX_BUFFER_BYTES);
        assert_eq!(config.tap_channel_capacity, DEFAULT_TAP_CHANNEL_CAPACITY);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = from_yaml(
            "upstream: \"http://localhost:8080\"\nlisten_port: 9999\nmax_buffer_bytes: 65536\ntap_channel_capacity: 8\n",
        )
        .unwrap();
        assert_eq!(config.listen_port, 9999);
        assert_eq!(config.max_buffer_bytes, 65536);
        assert_eq!(config.tap_channel_capacity, 8);
    }

    #[test]
    fn missing_upstream_is_rejected() {
        let err = from_yaml("listen_port: 9999\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn non_http_upstream_is_rejected() {
        let err = from_yaml("upstream: \"ftp://files.example.com\"\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("http(s)"), "got: {msg}");
    }

    #[test]
    fn tiny_buffer_cap_is_rejected() {
        let err =
            from_yaml("upstream: \"http://x\"\nmax_buffer_bytes: 16\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = from_yaml("upstream: [unterminated\n").unwrap_err();
        assert!(matches!(err, ConfigError::YamlError(_)));
    }

    #[test]
    fn with_upstream_builds_flag_only_config() {
        let config = Config::with_upstream("http://localhost:3000").unwrap();
        assert_eq!(config.listen_port, DEFAULT_PORT);
        assert!(Config::with_upstream("").is_err());
    }
}
