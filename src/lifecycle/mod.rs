//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Resolve target → Bind context → Launch swarm
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast to probes → Wait (bounded) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Shutdown has a grace period; probes still running after it are aborted

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{wait_for_signal, Signal};
pub use startup::{prepare, Prepared, StartupError};
