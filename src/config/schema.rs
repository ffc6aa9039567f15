//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the sticky proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (plaintext and TLS addresses).
    pub listener: ListenerConfig,

    /// Ordered backend list. Indices are the affinity cookie values.
    pub backends: Vec<BackendConfig>,

    /// TLS settings used when dialing HTTPS backends.
    pub backend_tls: BackendTlsConfig,

    /// Sticky-session cookie settings.
    pub affinity: AffinityConfig,

    /// Defaults applied to forwarded requests.
    pub forwarding: ForwardingConfig,

    /// Message size limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Startup and shutdown settings.
    pub lifecycle: LifecycleConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plaintext bind address (e.g., "0.0.0.0:8080").
    pub http_address: String,

    /// TLS-terminating listener. Absent means no HTTPS loop.
    pub https: Option<HttpsListenerConfig>,

    /// Maximum concurrent connections per listener (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0:8080".to_string(),
            https: None,
            max_connections: 10_000,
        }
    }
}

/// TLS-terminating listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpsListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

impl Default for HttpsListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            cert_path: "cert.pem".to_string(),
            key_path: "key.pem".to_string(),
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Backend host, optionally with a port (e.g., "example.com" or "10.0.0.2:3000").
    pub address: String,

    /// Dial the backend over TLS.
    #[serde(default)]
    pub https: bool,
}

/// TLS client settings for HTTPS backends.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BackendTlsConfig {
    /// Verify backend certificates against the system roots.
    /// Off by default: the backend list is static and trusted.
    pub verify_certificates: bool,
}

/// Sticky-session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AffinityConfig {
    /// Cookie name, read from `Cookie` and written in `Set-Cookie`.
    pub cookie_name: String,

    /// Lifetime of the issued cookie in seconds.
    pub max_age_secs: u64,

    /// Cookie path attribute.
    pub path: String,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            cookie_name: "LB_NODE".to_string(),
            max_age_secs: 60,
            path: "/".to_string(),
        }
    }
}

/// Header defaults for forwarded requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// `User-Agent` sent when the client did not provide one.
    pub user_agent: String,

    /// `Accept` sent when the client did not provide one.
    pub accept: String,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            user_agent: "sticky-proxy".to_string(),
            accept: "*/*".to_string(),
        }
    }
}

/// Message size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a request or response header block, in bytes.
    pub max_header_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connect + TLS handshake timeout in seconds (0 = none).
    pub connect_secs: u64,
}

/// Startup and shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long to wait for in-flight connections after a shutdown signal.
    pub drain_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
