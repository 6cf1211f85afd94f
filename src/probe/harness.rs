//! A single simulated client.
//!
//! # Cycle
//! ```text
//! draw delay (own RNG) → sleep → send request → wait ≤ deadline → report
//!        ↑                                                          │
//!        └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Deadline is a hard cutoff: a response measured at or past it is a timeout
//! - Transport errors are reported and the loop continues
//! - Shutdown interrupts either suspension point
//! - Nothing carries between cycles except the shared transport

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant};

use crate::observability::metrics;
use crate::probe::delay::DelayRange;
use crate::probe::outcome::{Outcome, ProbeId, ProbeRecord};
use crate::transport::{Request, Response, Transport, TransportError};

/// Timing shared by every probe in a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    pub delay: DelayRange,
    pub deadline: Duration,
    /// Stop after this many cycles; `None` runs until shutdown.
    pub cycles: Option<u64>,
}

pub struct Probe<T> {
    id: ProbeId,
    transport: Arc<T>,
    request: Arc<Request>,
    settings: ProbeSettings,
    rng: StdRng,
    tap: Option<mpsc::UnboundedSender<ProbeRecord>>,
}

impl<T: Transport> Probe<T> {
    pub fn new(
        id: ProbeId,
        transport: Arc<T>,
        request: Arc<Request>,
        settings: ProbeSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            id,
            transport,
            request,
            settings,
            rng,
            tap: None,
        }
    }

    /// Also deliver every outcome to `tap`.
    pub fn with_tap(mut self, tap: mpsc::UnboundedSender<ProbeRecord>) -> Self {
        self.tap = Some(tap);
        self
    }

    pub fn id(&self) -> ProbeId {
        self.id
    }

    /// Draw the sleep preceding the next request.
    pub fn next_delay(&mut self) -> Duration {
        self.settings.delay.sample(&mut self.rng)
    }

    /// Issue one request and classify what came back.
    pub async fn attempt(&self) -> Outcome {
        let deadline = self.settings.deadline;
        let start = Instant::now();

        let result = time::timeout(deadline, self.transport.request(&self.request)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(reply) => settle(deadline, elapsed, reply),
            Err(_) => Outcome::Timeout { deadline },
        }
    }

    /// Run cycles until shutdown or the cycle limit.
    ///
    /// Returns the number of completed cycles.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        tracing::debug!(probe = %self.id, "Probe starting");

        let mut cycle = 0;
        loop {
            if self.settings.cycles.is_some_and(|limit| cycle >= limit) {
                break;
            }

            let delay = self.next_delay();
            let outcome = tokio::select! {
                outcome = async {
                    time::sleep(delay).await;
                    self.attempt().await
                } => outcome,
                _ = shutdown.recv() => {
                    tracing::debug!(probe = %self.id, cycle, "Probe received shutdown signal");
                    break;
                }
            };

            cycle += 1;
            self.report(cycle, outcome);
        }

        cycle
    }

    fn report(&self, cycle: u64, outcome: Outcome) {
        outcome.log(self.id, cycle);
        metrics::record_outcome(&outcome);

        if let Some(tap) = &self.tap {
            let _ = tap.send(ProbeRecord {
                probe: self.id,
                cycle,
                outcome,
            });
        }
    }
}

/// Classify a reply that arrived `elapsed` after sending.
fn settle(
    deadline: Duration,
    elapsed: Duration,
    reply: Result<Response, TransportError>,
) -> Outcome {
    match reply {
        Ok(_) if elapsed >= deadline => Outcome::Timeout { deadline },
        Ok(response) => Outcome::success(elapsed, response),
        Err(error) => Outcome::Failed { error },
    }
}
