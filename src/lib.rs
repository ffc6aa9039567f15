//! Sticky-session HTTP/1.x reverse proxy library

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::{ProxyServer, StartupError};
pub use lifecycle::Shutdown;
