//! Probe harness.
//!
//! # Data Flow
//! ```text
//! swarm.rs (launcher)
//!     → N × harness.rs Probe task
//!         → delay.rs (randomized sleep, per-probe RNG)
//!         → Transport::request (shared context)
//!         → outcome.rs (Success / Timeout / Failed)
//!         → log line + metrics + optional tap
//! ```
//!
//! # Design Decisions
//! - Probes share only the transport and the immutable request
//! - Each probe owns its RNG so runs are reproducible under a seed
//! - Within a probe, cycles never overlap

pub mod delay;
pub mod harness;
pub mod outcome;
pub mod swarm;

pub use delay::DelayRange;
pub use harness::{Probe, ProbeSettings};
pub use outcome::{Outcome, OutcomeKind, ProbeId, ProbeRecord};
pub use swarm::{Swarm, SwarmHandle, SwarmSummary};
