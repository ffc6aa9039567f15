//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (optional TLS handshake, inside the connection task)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to HTTP layer
//!
//! Outgoing backend connection
//!     → upstream.rs (dial, optional TLS, send request head)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - One fresh backend connection per request; no pooling

pub mod connection;
pub mod listener;
pub mod tls;
pub mod upstream;
