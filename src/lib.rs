//! Concurrent CoAP probe swarm.
//!
//! Simulates many CoAP clients, each sleeping a random interval, issuing a
//! request against one endpoint under a tight deadline and logging the
//! outcome, forever or until shut down.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────┐
//!   │                        COAP SWARM                         │
//!   │                                                           │
//!   │   ┌────────┐   ┌─────────┐ × N   ┌──────────────┐        │
//!   │   │ swarm  │──▶│  probe  │──────▶│  transport   │────────┼──▶ CoAP server
//!   │   │launcher│   │  loop   │◀──────│ (one shared  │◀───────┼───
//!   │   └────────┘   └────┬────┘       │  UDP socket) │        │
//!   │                     │            └──────────────┘        │
//!   │                     ▼                                     │
//!   │              log line / metrics                           │
//!   │                                                           │
//!   │   ┌────────┐  ┌───────────────┐  ┌───────────┐            │
//!   │   │ config │  │ observability │  │ lifecycle │            │
//!   │   └────────┘  └───────────────┘  └───────────┘            │
//!   └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod transport;

pub use config::SwarmConfig;
pub use lifecycle::Shutdown;
pub use probe::{Outcome, Swarm};
pub use transport::{CoapContext, Transport};
