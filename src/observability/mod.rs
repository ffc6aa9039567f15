//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one span per connection)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout (text or JSON)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Connection ID flows through every event of a connection via its span
//! - Metrics are cheap: recording without an installed exporter is a no-op

pub mod logging;
pub mod metrics;
