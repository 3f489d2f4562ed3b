//! Error types for the consensus core.
//!
//! A storage failure is always fatal to a peer: we never answer an RPC with
//! state that has not been durably written. Everything else degrades to a
//! negative, term-bearing reply instead of an error.

use thiserror::Error;

use crate::types::ServerId;

/// Failure surfaced by a `RaftStorage` implementation.
#[derive(Debug, Error, Clone)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(String),

    #[error("failed to (de)serialize persisted state: {0}")]
    Serialization(String),

    #[error("persisted state is corrupt: {0}")]
    Corrupt(String),
}

/// Top level error returned by fallible core operations.
#[derive(Debug, Error, Clone)]
pub enum RaftError {
    /// The durable store failed. Per invariant 8 this is fatal: the peer must
    /// halt rather than continue operating on unpersisted state.
    #[error("durable store failed: {0}")]
    Storage(#[from] StorageError),

    /// A host-facing call required leadership but this peer does not hold it.
    #[error("not leader (hint: {leader_hint:?})")]
    NotLeader { leader_hint: Option<ServerId> },

    /// The peer has been shut down and can no longer process requests.
    #[error("peer is shut down")]
    ShuttingDown,

    /// `Config` values failed validation at construction time.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type RaftResult<T> = std::result::Result<T, RaftError>;
pub type StorageResult<T> = std::result::Result<T, StorageError>;
