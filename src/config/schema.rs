//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the swarm.
//! All types derive Serde traits for deserialization from config files.
//! Defaults reproduce the stock workload: 1000 probes hitting
//! `coap://localhost/time` every 2-4 seconds with a 2.1ms deadline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::probe::DelayRange;
use crate::transport::Method;

/// Root configuration for the probe swarm.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SwarmConfig {
    /// Endpoint every probe queries.
    pub target: TargetConfig,

    /// Probe population and timing.
    pub probes: ProbeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shutdown behavior.
    pub shutdown: ShutdownConfig,
}

/// Target endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// CoAP URI (e.g., "coap://localhost/time").
    pub uri: String,

    /// Request method.
    pub method: Method,

    /// Local address for the shared UDP socket.
    /// When unset, an unspecified address of the peer's family is used.
    pub bind_address: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            uri: "coap://localhost/time".to_string(),
            method: Method::Get,
            bind_address: None,
        }
    }
}

/// Probe population and per-cycle timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Number of concurrent probes.
    pub count: usize,

    /// Lower bound of the randomized inter-request sleep, in seconds.
    pub min_delay_secs: f64,

    /// Upper bound of the randomized inter-request sleep, in seconds.
    pub max_delay_secs: f64,

    /// Per-request deadline, in seconds.
    pub response_deadline_secs: f64,

    /// Stop each probe after this many cycles (unbounded when unset).
    pub cycles: Option<u64>,

    /// Base seed for per-probe RNGs (OS entropy when unset).
    pub seed: Option<u64>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            count: 1000,
            min_delay_secs: 2.0,
            max_delay_secs: 4.0,
            response_deadline_secs: 0.0021,
            cycles: None,
            seed: None,
        }
    }
}

impl ProbeConfig {
    /// Inter-request delay bounds.
    ///
    /// Only meaningful on a validated config; out-of-range values saturate.
    pub fn delay_range(&self) -> DelayRange {
        DelayRange::new(
            saturating_secs(self.min_delay_secs),
            saturating_secs(self.max_delay_secs),
        )
    }

    /// Per-request deadline.
    pub fn response_deadline(&self) -> Duration {
        saturating_secs(self.response_deadline_secs)
    }
}

fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for probes to stop after a signal, in seconds.
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_secs: 5 }
    }
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}
