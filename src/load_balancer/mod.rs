//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request headers
//!     → sticky.rs (read affinity cookie, else pick uniformly at random)
//!     → backend.rs (index into the immutable registry)
//!     → Backend handed to net::upstream
//! ```
//!
//! # Design Decisions
//! - The registry is fixed at startup and shared read-only
//! - No health checks: a dead backend closes the client connection
//! - A sticky client keeps its backend for as long as its cookie lives

pub mod backend;
pub mod sticky;

pub use backend::{Backend, BackendRegistry};
pub use sticky::{Affinity, StickySelector};
