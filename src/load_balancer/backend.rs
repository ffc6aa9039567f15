//! Backend descriptors and the static registry.
//!
//! # Responsibilities
//! - Represent a single upstream server (address + TLS flag)
//! - Turn a descriptor into a dialable `host:port` and a bare hostname
//! - Hold the ordered, non-empty backend list shared by every connection

use std::fmt;
use std::sync::Arc;

use crate::config::BackendConfig;

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Host, optionally with a port.
    pub address: String,
    /// Dial over TLS.
    pub is_https: bool,
}

impl Backend {
    pub fn new(address: impl Into<String>, is_https: bool) -> Self {
        Self {
            address: address.into().trim().to_string(),
            is_https,
        }
    }

    /// Address to connect to. Adds the scheme's default port when the
    /// descriptor carries none.
    pub fn dial_address(&self) -> String {
        if self.port().is_some() {
            return self.address.clone();
        }
        let port = if self.is_https { HTTPS_PORT } else { HTTP_PORT };
        if self.address.contains(':') && !self.address.starts_with('[') {
            // Bare IPv6 literal.
            format!("[{}]:{}", self.address, port)
        } else {
            format!("{}:{}", self.address, port)
        }
    }

    /// Hostname without port or IPv6 brackets, used for `Host` and SNI.
    pub fn host(&self) -> &str {
        if let Some(rest) = self.address.strip_prefix('[') {
            return rest.split(']').next().unwrap_or(rest);
        }
        match self.port() {
            Some(_) => self.address.rsplit_once(':').map_or(&self.address, |(h, _)| h),
            None => &self.address,
        }
    }

    /// Explicit port in the descriptor, if any.
    fn port(&self) -> Option<&str> {
        let tail = match self.address.strip_prefix('[') {
            Some(rest) => rest.split_once(']')?.1.strip_prefix(':')?,
            None => {
                let (host, port) = self.address.rsplit_once(':')?;
                if host.contains(':') {
                    // Unbracketed IPv6 has no port.
                    return None;
                }
                port
            }
        };
        Some(tail)
    }
}

impl From<&BackendConfig> for Backend {
    fn from(config: &BackendConfig) -> Self {
        Backend::new(config.address.clone(), config.https)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.is_https { "https" } else { "http" };
        write!(f, "{}://{}", scheme, self.address)
    }
}

/// Error returned when building a registry from an empty list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyRegistry;

impl fmt::Display for EmptyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("backend registry must contain at least one backend")
    }
}

impl std::error::Error for EmptyRegistry {}

/// Ordered, immutable, non-empty backend list. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    backends: Arc<[Backend]>,
}

impl BackendRegistry {
    pub fn new(backends: Vec<Backend>) -> Result<Self, EmptyRegistry> {
        if backends.is_empty() {
            return Err(EmptyRegistry);
        }
        Ok(Self {
            backends: backends.into(),
        })
    }

    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, EmptyRegistry> {
        Self::new(configs.iter().map(Backend::from).collect())
    }

    pub fn get(&self, index: usize) -> Option<&Backend> {
        self.backends.get(index)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false for a constructed registry.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }
}

impl std::ops::Index<usize> for BackendRegistry {
    type Output = Backend;

    fn index(&self, index: usize) -> &Backend {
        &self.backends[index]
    }
}
