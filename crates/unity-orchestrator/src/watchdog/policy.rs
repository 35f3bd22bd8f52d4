use tracing::debug;
use unity_types::WatchdogSignal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyDecision {
    Hold,
    Promote,
    AlreadyPromoted,
}

/// Debounced, one-way promotion decision over consecutive bad samples.
#[derive(Clone, Debug)]
pub struct FailoverPolicy {
    threshold: u32,
    consecutive: u32,
    promoted: bool,
    epoch: u64,
}

impl FailoverPolicy {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
            promoted: false,
            epoch: 0,
        }
    }

    pub fn evaluate(&mut self, signal: &WatchdogSignal) -> PolicyDecision {
        if self.promoted {
            return PolicyDecision::AlreadyPromoted;
        }

        if !signal.is_bad() {
            if self.consecutive > 0 {
                debug!("Healthy sample for '{}', resetting counter", signal.dependency_id);
            }
            self.consecutive = 0;
            return PolicyDecision::Hold;
        }

        self.consecutive += 1;
        if self.consecutive >= self.threshold {
            PolicyDecision::Promote
        } else {
            PolicyDecision::Hold
        }
    }

    /// Bumped by every `reset`. A promotion outcome only counts for the epoch it was decided in.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Records a completed promotion decided in `epoch`. Returns false if a reset intervened.
    pub fn mark_promoted(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.promoted = true;
        true
    }

    /// A failed promotion starts the count over.
    pub fn promotion_failed(&mut self, epoch: u64) {
        if epoch == self.epoch {
            self.promoted = false;
            self.consecutive = 0;
        }
    }

    pub fn reset(&mut self) {
        self.promoted = false;
        self.consecutive = 0;
        self.epoch += 1;
    }

    pub fn is_promoted(&self) -> bool {
        self.promoted
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
