//! The Timer & Driver.
//!
//! A single logical timer per peer, re-armable from any role transition. We
//! don't cancel the previous `tokio::time::sleep` task on re-arm — instead
//! every armed timer carries a generation number, and the driver loop
//! ignores a `TimerFired` event whose generation doesn't match the current
//! one. This avoids a cancellation-handle dance entirely: a stale wakeup is
//! just a no-op event.

use rand::Rng;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::Config;

/// An event delivered back to the driver loop when an armed timer expires.
#[derive(Debug, Clone, Copy)]
pub struct TimerFired {
    pub generation: u64,
}

/// Draws a fresh uniform random election timeout in `[min, max)`.
pub fn random_election_timeout(cfg: &Config) -> Duration {
    let min = cfg.election_timeout_min.as_millis() as u64;
    let max = cfg.election_timeout_max.as_millis() as u64;
    let millis = rand::thread_rng().gen_range(min..max);
    Duration::from_millis(millis)
}

/// Arms a one-shot timer that reports back `generation` through `tx` after
/// `duration`. The caller is responsible for bumping `generation` on every
/// re-arm so stale firings can be recognized and dropped.
pub fn arm(duration: Duration, generation: u64, tx: mpsc::UnboundedSender<TimerFired>) {
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        // A closed channel means the peer has shut down; nothing to do.
        let _ = tx.send(TimerFired { generation });
    });
}
