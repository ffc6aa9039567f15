//! Configuration validation.
//!
//! Serde handles the syntax; this module checks values that would only fail
//! later at startup or per connection. All problems are reported at once.

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::new("backends", "at least one backend is required"));
    }
    for (i, backend) in config.backends.iter().enumerate() {
        let address = backend.address.trim();
        if address.is_empty() {
            errors.push(ValidationError::new(format!("backends[{i}].address"), "must not be empty"));
        } else if address.chars().any(char::is_whitespace) {
            errors.push(ValidationError::new(
                format!("backends[{i}].address"),
                "must not contain whitespace",
            ));
        }
    }

    if config.listener.http_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.http_address",
            format!("invalid socket address {:?}", config.listener.http_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if let Some(https) = &config.listener.https {
        if https.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "listener.https.bind_address",
                format!("invalid socket address {:?}", https.bind_address),
            ));
        }
        if https.cert_path.is_empty() {
            errors.push(ValidationError::new("listener.https.cert_path", "must not be empty"));
        }
        if https.key_path.is_empty() {
            errors.push(ValidationError::new("listener.https.key_path", "must not be empty"));
        }
    }

    if !is_cookie_token(&config.affinity.cookie_name) {
        errors.push(ValidationError::new(
            "affinity.cookie_name",
            format!("{:?} is not a valid cookie name", config.affinity.cookie_name),
        ));
    }
    if config.affinity.max_age_secs == 0 {
        errors.push(ValidationError::new("affinity.max_age_secs", "must be greater than 0"));
    }
    if !config.affinity.path.starts_with('/') {
        errors.push(ValidationError::new("affinity.path", "must start with '/'"));
    }

    if config.limits.max_header_bytes == 0 {
        errors.push(ValidationError::new("limits.max_header_bytes", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// RFC 6265 cookie-name: a non-empty HTTP token.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}
