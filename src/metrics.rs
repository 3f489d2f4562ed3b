//! A cheap, informational snapshot of a peer's state.
//!
//! This is not part of the safety proof — nothing downstream of consensus
//! depends on it — it exists purely so a host can wire up a dashboard or a
//! log line without reaching into the core's lock itself.

use crate::types::{LogIndex, Role, ServerId, Term};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftMetrics {
    pub id: ServerId,
    pub term: Term,
    pub role: Role,
    pub last_log_index: LogIndex,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
}
