//! Probe launcher.
//!
//! # Responsibilities
//! - Spawn one task per probe, all sharing one transport and one request
//! - Give each probe its own identity and RNG
//! - Collect probe exits, isolating panics
//!
//! # Design Decisions
//! - Probes never talk to each other; a failing probe cannot stall another
//! - Dropping an unjoined handle aborts every remaining probe

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::ProbeConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::probe::harness::{Probe, ProbeSettings};
use crate::probe::outcome::{ProbeId, ProbeRecord};
use crate::transport::{Request, Transport};

/// A population of probes waiting to be launched.
pub struct Swarm<T> {
    transport: Arc<T>,
    request: Arc<Request>,
    count: usize,
    settings: ProbeSettings,
    seed: Option<u64>,
    tap: Option<mpsc::UnboundedSender<ProbeRecord>>,
}

impl<T: Transport> Swarm<T> {
    pub fn new(transport: Arc<T>, request: Request, count: usize, settings: ProbeSettings) -> Self {
        Self {
            transport,
            request: Arc::new(request),
            count,
            settings,
            seed: None,
            tap: None,
        }
    }

    /// Build a swarm from a validated probe config.
    pub fn from_config(transport: Arc<T>, request: Request, config: &ProbeConfig) -> Self {
        let settings = ProbeSettings {
            delay: config.delay_range(),
            deadline: config.response_deadline(),
            cycles: config.cycles,
        };
        Self::new(transport, request, config.count, settings).with_seed(config.seed)
    }

    /// Seed probe `i` with `seed + i`; `None` draws from OS entropy.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Deliver every probe's outcomes to `tap`.
    pub fn with_tap(mut self, tap: mpsc::UnboundedSender<ProbeRecord>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Launch every probe.
    pub fn spawn(self, shutdown: &Shutdown) -> SwarmHandle {
        let mut tasks = JoinSet::new();

        for index in 0..self.count {
            let id = ProbeId(index);
            let rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
                None => StdRng::from_entropy(),
            };

            let mut probe = Probe::new(
                id,
                self.transport.clone(),
                self.request.clone(),
                self.settings,
                rng,
            );
            if let Some(tap) = &self.tap {
                probe = probe.with_tap(tap.clone());
            }

            let stop = shutdown.subscribe();
            tasks.spawn(async move {
                let _active = metrics::ActiveProbe::enter();
                let cycles = probe.run(stop).await;
                (id, cycles)
            });
        }

        tracing::info!(
            probes = self.count,
            min_delay_ms = self.settings.delay.min().as_millis() as u64,
            max_delay_ms = self.settings.delay.max().as_millis() as u64,
            deadline_ms = self.settings.deadline.as_secs_f64() * 1000.0,
            "Swarm launched"
        );

        SwarmHandle {
            tasks,
            launched: self.count,
        }
    }

    /// Launch every probe and wait for all of them to stop.
    pub async fn run(self, shutdown: &Shutdown) -> SwarmSummary {
        self.spawn(shutdown).join().await
    }
}

/// Running probes.
pub struct SwarmHandle {
    tasks: JoinSet<(ProbeId, u64)>,
    launched: usize,
}

impl SwarmHandle {
    pub fn launched(&self) -> usize {
        self.launched
    }

    /// Wait until every probe has exited.
    pub async fn join(mut self) -> SwarmSummary {
        let mut summary = SwarmSummary {
            launched: self.launched,
            ..SwarmSummary::default()
        };

        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok((id, cycles)) => {
                    tracing::debug!(probe = %id, cycles, "Probe stopped");
                    summary.finished += 1;
                    summary.cycles += cycles;
                }
                Err(e) if e.is_panic() => {
                    tracing::error!(error = %e, "Probe panicked");
                    summary.panicked += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Probe cancelled");
                    summary.cancelled += 1;
                }
            }
        }

        summary
    }
}

/// How the probes of a swarm ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwarmSummary {
    pub launched: usize,
    pub finished: usize,
    pub panicked: usize,
    pub cancelled: usize,
    /// Cycles completed across all cleanly finished probes.
    pub cycles: u64,
}
