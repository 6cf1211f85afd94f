use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use coap_swarm::config::{load_config, validate_config, ConfigError, SwarmConfig};
use coap_swarm::lifecycle::{self, Shutdown};
use coap_swarm::observability::{logging, metrics};
use coap_swarm::Swarm;

#[derive(Parser)]
#[command(name = "coap-swarm")]
#[command(about = "Simulate many concurrent CoAP clients probing one endpoint", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint every probe queries
    #[arg(short, long)]
    target: Option<String>,

    /// Number of concurrent probes
    #[arg(short = 'n', long)]
    probes: Option<usize>,

    /// Minimum inter-request delay, seconds
    #[arg(long)]
    min_delay: Option<f64>,

    /// Maximum inter-request delay, seconds
    #[arg(long)]
    max_delay: Option<f64>,

    /// Per-request deadline, seconds
    #[arg(short, long)]
    deadline: Option<f64>,

    /// Stop each probe after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Base seed for reproducible delays
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics: Option<SocketAddr>,
}

impl Cli {
    fn into_config(self) -> Result<SwarmConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SwarmConfig::default(),
        };

        if let Some(target) = self.target {
            config.target.uri = target;
        }
        if let Some(count) = self.probes {
            config.probes.count = count;
        }
        if let Some(min) = self.min_delay {
            config.probes.min_delay_secs = min;
        }
        if let Some(max) = self.max_delay {
            config.probes.max_delay_secs = max;
        }
        if let Some(deadline) = self.deadline {
            config.probes.response_deadline_secs = deadline;
        }
        if self.cycles.is_some() {
            config.probes.cycles = self.cycles;
        }
        if self.seed.is_some() {
            config.probes.seed = self.seed;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(addr) = self.metrics {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = addr.to_string();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init_logging(&config.observability.log_level)?;

    tracing::info!("coap-swarm v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        uri = %config.target.uri,
        probes = config.probes.count,
        min_delay_secs = config.probes.min_delay_secs,
        max_delay_secs = config.probes.max_delay_secs,
        deadline_secs = config.probes.response_deadline_secs,
        "Configuration loaded"
    );

    let prepared = lifecycle::prepare(&config).await?;

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let swarm = Swarm::from_config(prepared.context, prepared.request, &config.probes);
    let join = swarm.spawn(&shutdown).join();
    tokio::pin!(join);

    tokio::select! {
        summary = &mut join => {
            tracing::info!(?summary, "All probes finished");
        }
        signal = lifecycle::wait_for_signal() => {
            match signal {
                Ok(signal) => tracing::info!(%signal, "Shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "Signal handler failed, shutting down"),
            }
            shutdown.trigger();

            let grace = config.shutdown.grace();
            match tokio::time::timeout(grace, &mut join).await {
                Ok(summary) => tracing::info!(?summary, "Probes stopped"),
                Err(_) => tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, aborting remaining probes"),
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
