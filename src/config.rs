//! Tunable timing parameters.

use std::time::Duration;

use crate::error::{RaftError, RaftResult};

/// Timing configuration for a `Raft` instance.
///
/// A 50ms heartbeat and a 150-300ms randomized election timeout, the
/// conventional Raft defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How often a leader sends AppendEntries to idle followers.
    pub heartbeat_interval: Duration,

    /// Lower bound (inclusive) of the randomized election timeout.
    pub election_timeout_min: Duration,

    /// Upper bound (exclusive) of the randomized election timeout.
    pub election_timeout_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(50),
            election_timeout_min: Duration::from_millis(150),
            election_timeout_max: Duration::from_millis(300),
        }
    }
}

impl Config {
    /// Validate that the timing parameters can't livelock the cluster.
    ///
    /// Called once at `Raft::new` so a misconfiguration is reported up front
    /// instead of manifesting later as a cluster that never elects a leader.
    pub fn validate(&self) -> RaftResult<()> {
        if self.election_timeout_min >= self.election_timeout_max {
            return Err(RaftError::Config(format!(
                "election_timeout_min ({:?}) must be < election_timeout_max ({:?})",
                self.election_timeout_min, self.election_timeout_max
            )));
        }
        if self.election_timeout_min <= self.heartbeat_interval {
            return Err(RaftError::Config(format!(
                "election_timeout_min ({:?}) must be > heartbeat_interval ({:?})",
                self.election_timeout_min, self.heartbeat_interval
            )));
        }
        Ok(())
    }
}
