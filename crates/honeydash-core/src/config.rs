// Copyright 2025-Present HoneyDash contributors
// SPDX-License-Identifier: Apache-2.0

use crate::error::HoneydashError;
use reqwest::Url;
use std::collections::HashMap;
use std::env;

const ENV_API_URL: &str = "HONEYDASH_API_URL";
const ENV_LOG_LEVEL: &str = "HONEYDASH_LOG_LEVEL";
const ENV_FORWARD_TARGET: &str = "HONEYDASH_FORWARD_TARGET";
const ENV_LOG_LIMIT: &str = "HONEYDASH_LOG_LIMIT";
const ENV_PROXY_HTTPS: &str = "HONEYDASH_PROXY_HTTPS";
const ENV_HTTPS_PROXY: &str = "HTTPS_PROXY";
const ENV_ACCEPT_INVALID_CERTS: &str = "HONEYDASH_ACCEPT_INVALID_CERTS";

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_FORWARD_TARGET: &str = "splunk";
pub const DEFAULT_LOG_LIMIT: u32 = 50;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the HoneyDash control client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoneydashConfig {
    /// Base address of the control API (scheme, host and path prefix)
    pub api_url: String,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// Endpoint prefix of the SIEM forwarding target
    pub forward_target: String,
    /// Record limit used when a query does not specify one
    pub default_log_limit: u32,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Skip TLS certificate validation (self-signed lab deployments)
    pub accept_invalid_certs: bool,
}

impl Default for HoneydashConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            log_level: "info".to_string(),
            forward_target: DEFAULT_FORWARD_TARGET.to_string(),
            default_log_limit: DEFAULT_LOG_LIMIT,
            https_proxy: None,
            accept_invalid_certs: false,
        }
    }
}

impl HoneydashConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, HoneydashError> {
        Self::from_env_iter(env::vars())
    }

    /// Create configuration from an arbitrary set of key/value pairs.
    ///
    /// Unknown keys are ignored and missing keys fall back to defaults.
    pub fn from_env_iter<I, K, V>(iter: I) -> Result<Self, HoneydashError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let api_url = non_empty(map.get(ENV_API_URL))
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        let log_level = non_empty(map.get(ENV_LOG_LEVEL))
            .map(str::to_lowercase)
            .unwrap_or_else(|| "info".to_string());
        let forward_target = non_empty(map.get(ENV_FORWARD_TARGET))
            .unwrap_or(DEFAULT_FORWARD_TARGET)
            .to_string();
        let default_log_limit = match non_empty(map.get(ENV_LOG_LIMIT)) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                HoneydashError::InvalidConfig(format!(
                    "{ENV_LOG_LIMIT} must be a positive integer, got '{raw}'"
                ))
            })?,
            None => DEFAULT_LOG_LIMIT,
        };
        let https_proxy = non_empty(map.get(ENV_PROXY_HTTPS))
            .or_else(|| non_empty(map.get(ENV_HTTPS_PROXY)))
            .map(str::to_string);
        let accept_invalid_certs = non_empty(map.get(ENV_ACCEPT_INVALID_CERTS))
            .map(|val| matches!(val.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let config = Self {
            api_url,
            log_level,
            forward_target,
            default_log_limit,
            https_proxy,
            accept_invalid_certs,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), HoneydashError> {
        let url = Url::parse(&self.api_url).map_err(|e| {
            HoneydashError::InvalidConfig(format!("Invalid API URL '{}': {e}", self.api_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HoneydashError::InvalidConfig(format!(
                "API URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(HoneydashError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        let target = self.forward_target.trim();
        if target.is_empty() || target.contains('/') {
            return Err(HoneydashError::InvalidConfig(format!(
                "Forward target '{}' must be a single non-empty path segment",
                self.forward_target
            )));
        }

        if self.default_log_limit == 0 {
            return Err(HoneydashError::InvalidConfig(
                "Default log limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}
