//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (counts and timeouts > 0)
//! - Check addresses and backend URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Unknown URL schemes only warn; the slot fails at pool construction

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{CircuitProvider, GatewayConfig};

/// Upper bound on the ping baseline (one hour).
pub const MAX_PING_MS: u64 = 3_600_000;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validates a parsed configuration, collecting every violation.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("invalid socket address '{}'", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    if config.circuits.count == 0 {
        errors.push(ValidationError::new("circuits.count", "must be greater than 0"));
    }
    if config.circuits.provider == CircuitProvider::Socks5
        && config.circuits.socks_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "circuits.socks_address",
            format!("invalid socket address '{}'", config.circuits.socks_address),
        ));
    }
    if config.circuits.supervise_interval_secs == 0 {
        errors.push(ValidationError::new("circuits.supervise_interval_secs", "must be greater than 0"));
    }

    let timeouts = &config.timeouts;
    if timeouts.ping_ms == 0 {
        errors.push(ValidationError::new("timeouts.ping_ms", "must be greater than 0"));
    } else if timeouts.ping_ms > MAX_PING_MS {
        errors.push(ValidationError::new(
            "timeouts.ping_ms",
            format!("must be at most {MAX_PING_MS}"),
        ));
    }
    if timeouts.request_multiplier == 0 {
        errors.push(ValidationError::new("timeouts.request_multiplier", "must be greater than 0"));
    }
    if timeouts.handshake_multiplier < timeouts.request_multiplier {
        errors.push(ValidationError::new(
            "timeouts.handshake_multiplier",
            "must be at least timeouts.request_multiplier",
        ));
    }

    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new("retries.base_delay_ms", "must not exceed retries.max_delay_ms"));
    }

    if config.chains.is_empty() {
        errors.push(ValidationError::new("chains", "at least one chain is required"));
    }
    let mut names = HashSet::new();
    for (i, chain) in config.chains.iter().enumerate() {
        let field = format!("chains[{i}]");
        if chain.name.is_empty() {
            errors.push(ValidationError::new(format!("{field}.name"), "must not be empty"));
        } else if !names.insert(chain.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.name"),
                format!("duplicate chain '{}'", chain.name),
            ));
        }
        if chain.urls.is_empty() {
            errors.push(ValidationError::new(format!("{field}.urls"), "at least one URL is required"));
        }
        for url in &chain.urls {
            match Url::parse(url) {
                Ok(parsed) => {
                    if !matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") {
                        tracing::warn!(chain = %chain.name, url = %url, "Backend URL has an unsupported scheme; its slot will fail");
                    }
                }
                Err(e) => errors.push(ValidationError::new(
                    format!("{field}.urls"),
                    format!("invalid URL '{url}': {e}"),
                )),
            }
        }
        if chain.fanout == Some(0) {
            errors.push(ValidationError::new(format!("{field}.fanout"), "must be greater than 0"));
        }
        if chain.max_response_bytes == 0 {
            errors.push(ValidationError::new(format!("{field}.max_response_bytes"), "must be greater than 0"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
