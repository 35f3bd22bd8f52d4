use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};
use unity_types::{UnityError, UnityResult};

use crate::process::ProbeDescriptor;
use crate::supervisor::CancellationToken;

const MIN_ATTEMPT_BOUND: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    NotYet(String),
    Fatal(String),
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready)
    }
}

/// One probe attempt against a network target.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, descriptor: &ProbeDescriptor) -> ProbeOutcome;
}

#[derive(Clone)]
pub struct HealthProbe {
    prober: Arc<dyn Prober>,
    attempt_timeout: Duration,
}

impl HealthProbe {
    pub fn new(prober: Arc<dyn Prober>, attempt_timeout: Duration) -> Self {
        Self { prober, attempt_timeout }
    }

    /// Polls `descriptor` until it reports ready, `timeout` elapses, or `cancel` fires.
    pub async fn await_ready(
        &self,
        descriptor: &ProbeDescriptor,
        timeout: Duration,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> UnityResult<()> {
        let mut cancel = cancel.clone();
        let deadline = Instant::now() + timeout;

        match descriptor {
            ProbeDescriptor::None => return Ok(()),
            ProbeDescriptor::Liveness { settle } => {
                if *settle >= timeout {
                    return Err(UnityError::Timeout(timeout));
                }
                return tokio::select! {
                    _ = cancel.cancelled() => Err(UnityError::Cancelled),
                    _ = tokio::time::sleep(*settle) => Ok(()),
                };
            }
            ProbeDescriptor::Http { .. } | ProbeDescriptor::Tcp { .. } => {}
        }

        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(UnityError::Cancelled);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("Probe {} timed out after {} attempts", descriptor, attempts);
                return Err(UnityError::Timeout(timeout));
            }

            attempts += 1;
            let bound = self.attempt_bound(poll_interval, remaining);
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(UnityError::Cancelled),
                outcome = self.probe_once(descriptor, bound) => outcome,
            };

            match outcome {
                ProbeOutcome::Ready => {
                    debug!("Probe {} ready after {} attempts", descriptor, attempts);
                    return Ok(());
                }
                ProbeOutcome::Fatal(reason) => return Err(UnityError::Probe(reason)),
                ProbeOutcome::NotYet(reason) => {
                    trace!("Probe {} attempt {}: {}", descriptor, attempts, reason);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::select! {
                _ = cancel.cancelled() => return Err(UnityError::Cancelled),
                _ = tokio::time::sleep(poll_interval.min(remaining)) => {}
            }
        }
    }

    /// A single attempt bounded by `bound`; an attempt that overruns counts as not ready.
    pub async fn probe_once(&self, descriptor: &ProbeDescriptor, bound: Duration) -> ProbeOutcome {
        match tokio::time::timeout(bound, self.prober.probe(descriptor)).await {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::NotYet(format!("attempt exceeded {:?}", bound)),
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    fn attempt_bound(&self, poll_interval: Duration, remaining: Duration) -> Duration {
        self.attempt_timeout
            .min(poll_interval.max(MIN_ATTEMPT_BOUND))
            .min(remaining)
    }
}
