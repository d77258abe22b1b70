use std::env;

use tracing::info;

use crate::dispatch::{InvokeOptions, DEFAULT_MAX_BODY_BYTES};
use crate::error::ConfigError;
use crate::function::SignatureType;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    // Listener
    pub host: String,
    pub port: u16,

    // Function selection
    pub target: String,
    pub signature_type: Option<SignatureType>,

    // Invocation
    pub timeout_ms: u64,
    pub production: bool,
    pub max_body_bytes: usize,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            target: "function".to_string(),
            signature_type: None,
            timeout_ms: 0,
            production: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl InvokerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let timeout_secs: u64 = parse_or(
            var("CLOUD_RUN_TIMEOUT_SECONDS"),
            "CLOUD_RUN_TIMEOUT_SECONDS",
            "a whole number of seconds",
            0,
        )?;

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse_or(var("PORT"), "PORT", "a port number", defaults.port)?,
            target: var("FUNCTION_TARGET").unwrap_or(defaults.target),
            signature_type: var("FUNCTION_SIGNATURE_TYPE")
                .map(|v| v.parse())
                .transpose()?,
            timeout_ms: timeout_secs.saturating_mul(1000),
            production: var("FUNCTIONS_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production")),
            max_body_bytes: parse_or(
                var("MAX_BODY_BYTES"),
                "MAX_BODY_BYTES",
                "a byte count",
                defaults.max_body_bytes,
            )?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn invoke_options(&self) -> InvokeOptions {
        InvokeOptions {
            timeout_ms: self.timeout_ms,
            production: self.production,
            max_body_bytes: self.max_body_bytes,
        }
    }

    /// Log the effective configuration at startup.
    pub fn log_summary(&self) {
        info!(
            addr = %self.bind_addr(),
            function_target = %self.target,
            signature_type = ?self.signature_type.map(|s| s.as_str()),
            timeout_ms = self.timeout_ms,
            production = self.production,
            max_body_bytes = self.max_body_bytes,
            "invoker configuration"
        );
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value: raw,
        }),
    }
}
