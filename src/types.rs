//! Core identifiers and the log entry data model.

use std::fmt;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Uniquely identifies a peer within the (static) cluster roster.
pub type ServerId = u64;

/// Monotonically increasing election epoch.
pub type Term = u64;

/// A strictly monotonic, 1-based position in the replicated log.
pub type LogIndex = u64;

/// The opaque payload type a host submits for replication.
///
/// The core never inspects a `Command`'s contents; this bound exists purely so
/// the core can move it into the log, serialize it into the persisted state
/// blob, and hand it back to the host untouched on delivery.
pub trait Command: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Command for T where T: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// The payload carried by a single log entry.
///
/// `Blank` is used for the sentinel zero-th entry and for the boundary entry
/// synthesized by `InstallSnapshot` when the follower's log doesn't already
/// contain an entry at the snapshot's `lastIncludedIndex`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EntryPayload<C: Command> {
    Blank,
    Command(C),
}

/// `(index, term, command)` triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry<C: Command> {
    pub index: LogIndex,
    pub term: Term,
    pub payload: EntryPayload<C>,
}

impl<C: Command> LogEntry<C> {
    pub fn new(index: LogIndex, term: Term, payload: EntryPayload<C>) -> Self {
        Self { index, term, payload }
    }

    /// The sentinel entry occupying index 0 of a log with no snapshot yet.
    pub fn sentinel() -> Self {
        Self { index: 0, term: 0, payload: EntryPayload::Blank }
    }
}

impl<C: Command> fmt::Display for LogEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.term)
    }
}

/// The role a peer believes it currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        };
        write!(f, "{}", s)
    }
}
