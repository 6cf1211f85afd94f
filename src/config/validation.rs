//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (count > 0, deadline > 0, min <= max)
//! - Reject second counts too large to become a `Duration`
//! - Check that the target URI and addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SwarmConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::SwarmConfig;
use crate::transport::CoapUri;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("probes.count must be at least 1")]
    NoProbes,

    #[error("probes.{field} must be a non-negative number of seconds that fits a duration (got {value})")]
    InvalidDelay { field: &'static str, value: f64 },

    #[error("probes.min_delay_secs ({min}) exceeds probes.max_delay_secs ({max})")]
    InvertedDelayRange { min: f64, max: f64 },

    #[error("probes.response_deadline_secs must be greater than 0 and fit a duration (got {0})")]
    InvalidDeadline(f64),

    #[error("target.uri is invalid: {0}")]
    InvalidUri(String),

    #[error("{field} is not a socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("shutdown.grace_secs must be at least 1")]
    NoGrace,
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &SwarmConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let probes = &config.probes;

    if probes.count == 0 {
        errors.push(ValidationError::NoProbes);
    }

    let min_ok = check_delay("min_delay_secs", probes.min_delay_secs, &mut errors);
    let max_ok = check_delay("max_delay_secs", probes.max_delay_secs, &mut errors);
    if min_ok && max_ok && probes.min_delay_secs > probes.max_delay_secs {
        errors.push(ValidationError::InvertedDelayRange {
            min: probes.min_delay_secs,
            max: probes.max_delay_secs,
        });
    }

    let deadline = probes.response_deadline_secs;
    if !fits_duration(deadline) || deadline <= 0.0 {
        errors.push(ValidationError::InvalidDeadline(deadline));
    }

    if let Err(e) = CoapUri::parse(&config.target.uri) {
        errors.push(ValidationError::InvalidUri(e.to_string()));
    }

    if let Some(bind) = &config.target.bind_address {
        if bind.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field: "target.bind_address",
                value: bind.clone(),
            });
        }
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: obs.metrics_address.clone(),
        });
    }

    if config.shutdown.grace_secs == 0 {
        errors.push(ValidationError::NoGrace);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_delay(field: &'static str, value: f64, errors: &mut Vec<ValidationError>) -> bool {
    if fits_duration(value) {
        true
    } else {
        errors.push(ValidationError::InvalidDelay { field, value });
        false
    }
}

/// Finite, non-negative and below `Duration::MAX`.
fn fits_duration(secs: f64) -> bool {
    secs.is_finite() && secs >= 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}
