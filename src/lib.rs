//! A minimal, faithful implementation of the Raft consensus algorithm:
//! leader election, log replication, commitment, and snapshot-based log
//! compaction.
//!
//! This crate implements the Consensus State Machine, Log & Snapshot
//! Manager, Timer & Driver, and Delivery Pump. It deliberately does not
//! implement RPC transport, durable storage, an application state
//! machine, cluster membership changes, or client-request deduplication
//! — those are the host's responsibility, expressed here as the
//! [`RaftNetwork`] and [`RaftStorage`] traits.
//!
//! A host wires a peer together with [`Raft::new`], drives its
//! [`DeliveryReceiver`] to apply committed entries to its own state
//! machine, and calls [`Raft::submit`] to propose new commands.

mod config;
mod core;
mod delivery;
mod error;
mod log;
mod metrics;
mod network;
mod quorum;
mod storage;
mod timer;
mod types;

pub use config::Config;
pub use core::{Raft, SubmitOutcome};
pub use delivery::{Delivered, DeliveryReceiver, DeliverySender};
pub use error::{RaftError, RaftResult, StorageError, StorageResult};
pub use metrics::RaftMetrics;
pub use network::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    RaftNetwork, RequestVoteRequest, RequestVoteResponse,
};
pub use storage::{PersistentState, RaftStorage};
pub use types::{Command, EntryPayload, LogEntry, LogIndex, Role, ServerId, Term};
