use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use unity_types::{QuotaReading, UnityResult, WatchdogSignal};

use super::policy::{FailoverPolicy, PolicyDecision};
use super::source::QuotaSource;
use crate::config::WatchdogConfig;
use crate::supervisor::{CancellationToken, SidecarSupervisor};

/// Whatever can take over from the remote dependency.
#[async_trait]
pub trait PromotionTarget: Send + Sync {
    async fn promote_local(&self) -> UnityResult<()>;

    async fn demote_local(&self) -> UnityResult<()>;
}

#[async_trait]
impl PromotionTarget for SidecarSupervisor {
    async fn promote_local(&self) -> UnityResult<()> {
        SidecarSupervisor::promote_local(self).await
    }

    async fn demote_local(&self) -> UnityResult<()> {
        SidecarSupervisor::demote_local(self).await
    }
}

pub struct FailoverWatchdog {
    config: WatchdogConfig,
    source: Arc<dyn QuotaSource>,
    target: Arc<dyn PromotionTarget>,
    policy: Mutex<FailoverPolicy>,
}

impl FailoverWatchdog {
    pub fn new(
        config: WatchdogConfig,
        source: Arc<dyn QuotaSource>,
        target: Arc<dyn PromotionTarget>,
    ) -> Self {
        let policy = FailoverPolicy::new(config.consecutive_threshold);
        Self {
            config,
            source,
            target,
            policy: Mutex::new(policy),
        }
    }

    /// Takes one sample. Errors and overruns both read as unreachable.
    pub async fn observe_once(&self) -> WatchdogSignal {
        let id = &self.config.dependency_id;
        match tokio::time::timeout(self.config.observe_timeout(), self.source.remaining()).await {
            Ok(Ok(remaining)) => WatchdogSignal::new(id.clone(), QuotaReading::Remaining(remaining)),
            Ok(Err(e)) => {
                debug!("Quota source for '{}' failed: {}", id, e);
                WatchdogSignal::unreachable(id.clone())
            }
            Err(_) => {
                debug!("Quota source for '{}' timed out", id);
                WatchdogSignal::unreachable(id.clone())
            }
        }
    }

    /// Feeds one signal through the policy and issues the promotion when it trips.
    pub async fn evaluate(&self, signal: &WatchdogSignal) -> PolicyDecision {
        let (decision, epoch, consecutive) = {
            let mut policy = self.policy.lock();
            let decision = policy.evaluate(signal);
            (decision, policy.epoch(), policy.consecutive())
        };

        if signal.is_bad() && decision != PolicyDecision::AlreadyPromoted {
            warn!(
                "Remote dependency '{}' bad sample ({:?}), {} consecutive",
                signal.dependency_id, signal.reading, consecutive
            );
        }

        if decision == PolicyDecision::Promote {
            info!("Failing over from '{}' to local inference", signal.dependency_id);
            match self.target.promote_local().await {
                Ok(()) => {
                    if self.policy.lock().mark_promoted(epoch) {
                        info!("Failover complete");
                    } else {
                        info!("Failover was reset while promoting, staying on remote");
                    }
                }
                Err(e) => {
                    self.policy.lock().promotion_failed(epoch);
                    error!("Failover promotion failed: {}", e);
                }
            }
        }

        decision
    }

    pub async fn tick(&self) -> PolicyDecision {
        let signal = self.observe_once().await;
        self.evaluate(&signal).await
    }

    pub async fn run(&self, mut cancel: CancellationToken) {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Failover watchdog running for '{}' every {:?}",
            self.config.dependency_id,
            self.config.interval()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        info!("Failover watchdog stopped");
    }

    /// Clears the promotion and hands the primary role back to the remote dependency.
    pub async fn reset(&self) -> UnityResult<()> {
        self.policy.lock().reset();
        info!("Failover reset, demoting local inference");
        self.target.demote_local().await
    }

    pub fn is_promoted(&self) -> bool {
        self.policy.lock().is_promoted()
    }
}
