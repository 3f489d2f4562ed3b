//! The durable store abstraction.
//!
//! `RaftStorage` stands in for the host's persistent blob sink. The core
//! never implements it — only an in-memory test double under `tests/common`
//! does — but it still owns the serialization format for the "raft state"
//! blob, since that format is part of the core's contract with itself across
//! restarts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::types::{Command, LogEntry, LogIndex, ServerId, Term};

/// The full persistent state of a peer, as written atomically before any
/// RPC reply that depends on it (invariant 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentState<C: Command> {
    pub current_term: Term,

    /// `None` stands in for the conventional `votedFor = -1` sentinel.
    pub voted_for: Option<ServerId>,

    /// Log entries with contiguous indices starting at `last_included_index`
    /// (or 1, if no snapshot exists yet). Entry 0 of this vector always has
    /// `index == last_included_index`.
    pub log: Vec<LogEntry<C>>,

    pub last_included_index: LogIndex,
    pub last_included_term: Term,
}

impl<C: Command> Default for PersistentState<C> {
    fn default() -> Self {
        Self {
            current_term: 0,
            voted_for: None,
            log: vec![LogEntry::sentinel()],
            last_included_index: 0,
            last_included_term: 0,
        }
    }
}

impl<C: Command> PersistentState<C> {
    /// Encode to the on-disk wire format.
    ///
    /// The exact framing is an implementation detail; this uses
    /// `serde_json`, the same serialization crate a typical on-disk
    /// storage adapter for this trait would already depend on.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::error::StorageError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::error::StorageError::Serialization(e.to_string()))
    }
}

/// A trait defining the interface for a Raft durable store.
///
/// An implementation backs exactly two blobs: the Raft metadata+log blob, and
/// an optional opaque application snapshot blob. The core treats both as
/// uninterpreted bytes.
#[async_trait]
pub trait RaftStorage<C: Command>: Send + Sync + 'static {
    /// Replace the raft-state blob.
    async fn save_state(&self, bytes: Vec<u8>) -> StorageResult<()>;

    /// Read back the raft-state blob (empty if none has ever been written).
    async fn read_state(&self) -> StorageResult<Vec<u8>>;

    /// Atomically replace both the raft-state blob and the snapshot blob.
    ///
    /// Implementations must ensure this is all-or-nothing: a crash between
    /// the two writes must never leave `read_state` and `read_snapshot`
    /// disagreeing about which entries are covered by the snapshot.
    async fn save_state_and_snapshot(&self, state: Vec<u8>, snapshot: Vec<u8>) -> StorageResult<()>;

    /// Read back the snapshot blob (empty if none has ever been written).
    async fn read_snapshot(&self) -> StorageResult<Vec<u8>>;

    /// Size in bytes of the serialized persistent state, used by the host to
    /// decide when to trigger a snapshot.
    async fn state_size(&self) -> StorageResult<usize>;
}
