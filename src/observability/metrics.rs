//! Metrics collection and exposition.
//!
//! # Metrics
//! - `coap_swarm_outcomes_total` (counter): cycles by outcome
//! - `coap_swarm_rtt_seconds` (histogram): round-trip time of successful cycles
//! - `coap_swarm_active_probes` (gauge): probes currently running
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::probe::Outcome;

/// Install the Prometheus recorder and its HTTP scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_outcome(outcome: &Outcome) {
    counter!("coap_swarm_outcomes_total", "outcome" => outcome.kind().as_str()).increment(1);
    if let Some(rtt) = outcome.rtt() {
        histogram!("coap_swarm_rtt_seconds").record(rtt.as_secs_f64());
    }
}

/// Counts a probe as active for as long as it is held.
pub struct ActiveProbe(());

impl ActiveProbe {
    pub fn enter() -> Self {
        gauge!("coap_swarm_active_probes").increment(1.0);
        Self(())
    }
}

impl Drop for ActiveProbe {
    fn drop(&mut self) {
        gauge!("coap_swarm_active_probes").decrement(1.0);
    }
}
