//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Probes produce:
//!     → logging.rs (one structured event per outcome)
//!     → metrics.rs (outcome counters, RTT histogram, active probes)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - The log line is the primary output; metrics are opt-in
//! - Metrics are cheap and silently dropped when no recorder is installed

pub mod logging;
pub mod metrics;
