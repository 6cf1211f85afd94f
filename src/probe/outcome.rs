//! Result of one request cycle.

use std::fmt;
use std::time::Duration;

use crate::transport::{Response, ResponseCode, TransportError};

/// Label attributing log lines to a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(pub usize);

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to a single request.
#[derive(Debug)]
pub enum Outcome {
    /// A response arrived before the deadline.
    Success {
        rtt: Duration,
        code: ResponseCode,
        payload: Vec<u8>,
    },
    /// No response before the deadline.
    Timeout { deadline: Duration },
    /// The transport failed before the deadline.
    Failed { error: TransportError },
}

/// Classification of an [`Outcome`] without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Success,
    Timeout,
    Failed,
}

impl OutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::Failed => "failed",
        }
    }
}

impl Outcome {
    pub(crate) fn success(rtt: Duration, response: Response) -> Self {
        Outcome::Success {
            rtt,
            code: response.code,
            payload: response.payload,
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success { .. } => OutcomeKind::Success,
            Outcome::Timeout { .. } => OutcomeKind::Timeout,
            Outcome::Failed { .. } => OutcomeKind::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind() == OutcomeKind::Success
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == OutcomeKind::Timeout
    }

    /// Round-trip time, for successful cycles.
    pub fn rtt(&self) -> Option<Duration> {
        match self {
            Outcome::Success { rtt, .. } => Some(*rtt),
            _ => None,
        }
    }

    /// Emit the per-outcome log line.
    pub fn log(&self, probe: ProbeId, cycle: u64) {
        match self {
            Outcome::Success { rtt, code, payload } => {
                tracing::info!(
                    probe = %probe,
                    cycle,
                    rtt_ms = rtt.as_secs_f64() * 1000.0,
                    code = %code,
                    payload = %String::from_utf8_lossy(payload),
                    "Response received"
                );
            }
            Outcome::Timeout { deadline } => {
                tracing::info!(
                    probe = %probe,
                    cycle,
                    deadline_ms = deadline.as_secs_f64() * 1000.0,
                    "Request timed out"
                );
            }
            Outcome::Failed { error } => {
                tracing::warn!(probe = %probe, cycle, error = %error, "Request failed");
            }
        }
    }
}

/// An outcome attributed to the probe and cycle that produced it.
#[derive(Debug)]
pub struct ProbeRecord {
    pub probe: ProbeId,
    /// 1-based cycle number within the probe.
    pub cycle: u64,
    pub outcome: Outcome,
}
