//! Transport configuration.
//!
//! Configuration arrives as plain key/value pairs, from the environment
//! (`HYPERAPI_*`) or from any other loader. Credential and OTP prompts are
//! not configuration; they are installed on the transport builder.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{HyperApiError, Result};

/// Prefix of every environment variable read by [`TransportConfig::from_env`].
pub const ENV_PREFIX: &str = "HYPERAPI_";

/// Cache settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub disable_cache: bool,
    pub in_memory_cache: bool,
    pub cache_location: Option<PathBuf>,
}

/// Settings for an [`HttpTransport`](crate::transport::HttpTransport).
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_token: Option<String>,
    /// Existing session cookie value to install.
    pub session: Option<String>,
    pub session_cookie_name: String,
    pub cookie_file: Option<PathBuf>,
    pub save_cookies: bool,
    pub user_agent: Option<String>,
    pub timeout_secs: u64,
    pub disable_proxy: bool,
    pub proxy_url: Option<String>,
    pub proxy_authorization: Option<String>,
    /// PEM bundle of extra trusted certificates.
    pub ca_certs: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub disable_ssl_verification: bool,
    pub otp_header: String,
    pub cache: CacheConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            api_token: None,
            session: None,
            session_cookie_name: "sessionid".to_string(),
            cookie_file: None,
            save_cookies: true,
            user_agent: None,
            timeout_secs: 300,
            disable_proxy: false,
            proxy_url: None,
            proxy_authorization: None,
            ca_certs: None,
            client_cert: None,
            client_key: None,
            disable_ssl_verification: false,
            otp_header: "X-OTP".to_string(),
            cache: CacheConfig::default(),
        }
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("username", &self.username)
            .field("cookie_file", &self.cookie_file)
            .field("save_cookies", &self.save_cookies)
            .field("timeout_secs", &self.timeout_secs)
            .field("disable_proxy", &self.disable_proxy)
            .field("proxy_url", &self.proxy_url)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl TransportConfig {
    /// Read `HYPERAPI_<KEY>` variables for every known key.
    ///
    /// # Errors
    ///
    /// Returns [`HyperApiError::InvalidConfig`] for malformed booleans or
    /// integers.
    pub fn from_env() -> Result<Self> {
        Self::from_pairs(env::vars().filter_map(|(key, value)| {
            key.strip_prefix(ENV_PREFIX)
                .map(|key| (key.to_string(), value))
        }))
    }

    /// Build a configuration from key/value pairs.
    ///
    /// Keys are case-insensitive. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HyperApiError::InvalidConfig`] for malformed booleans or
    /// integers.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();

        for (key, value) in pairs {
            let key = key.as_ref().to_ascii_lowercase();
            let value: String = value.into();

            match key.as_str() {
                "username" => config.username = Some(value),
                "password" => config.password = Some(value),
                "api_token" => config.api_token = Some(value),
                "session" => config.session = Some(value),
                "session_cookie_name" => config.session_cookie_name = value,
                "cookie_file" => config.cookie_file = Some(PathBuf::from(value)),
                "save_cookies" => config.save_cookies = parse_bool(&key, &value)?,
                "user_agent" => config.user_agent = Some(value),
                "timeout_secs" | "timeout" => {
                    config.timeout_secs = value.trim().parse().map_err(|_| invalid(&key, &value))?;
                }
                "disable_proxy" => config.disable_proxy = parse_bool(&key, &value)?,
                "proxy_url" => config.proxy_url = Some(value),
                "proxy_authorization" => config.proxy_authorization = Some(value),
                "ca_certs" => config.ca_certs = Some(PathBuf::from(value)),
                "client_cert" => config.client_cert = Some(PathBuf::from(value)),
                "client_key" => config.client_key = Some(PathBuf::from(value)),
                "disable_ssl_verification" => {
                    config.disable_ssl_verification = parse_bool(&key, &value)?;
                }
                "otp_header" => config.otp_header = value,
                "disable_cache" => config.cache.disable_cache = parse_bool(&key, &value)?,
                "in_memory_cache" => config.cache.in_memory_cache = parse_bool(&key, &value)?,
                "cache_location" => config.cache.cache_location = Some(PathBuf::from(value)),
                _ => tracing::trace!(key, "Ignoring unknown configuration key"),
            }
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> HyperApiError {
    HyperApiError::InvalidConfig {
        key: key.to_string(),
        value: value.to_string(),
    }
}
