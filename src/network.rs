//! Peer-to-peer RPC contracts.
//!
//! `RaftNetwork` stands in for the host's transport. A failed call is
//! reported as `Err` and transparently retried on the next heartbeat —
//! the core never distinguishes "peer unreachable" from "peer slow".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Command, LogEntry, LogIndex, ServerId, Term};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: ServerId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesRequest<C: Command> {
    pub term: Term,
    pub leader_id: ServerId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry<C>>,
    pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,

    /// On success: `lastLogIndex + 1` of the receiver, so the leader can
    /// advance `nextIndex`/`matchIndex` without an extra round trip.
    /// On failure: the accelerated backtracking conflict hint.
    pub confirm_index: LogIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshotRequest {
    pub term: Term,
    pub leader_id: ServerId,
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSnapshotResponse {
    pub term: Term,
}

/// A trait defining the interface for dispatching Raft RPCs to other peers.
///
/// Implementations are expected to apply their own timeout; a call that
/// doesn't complete within it should resolve to `Err` rather than hang
/// indefinitely, so the caller's fan-out task can move on.
#[async_trait]
pub trait RaftNetwork<C: Command>: Send + Sync + 'static {
    async fn request_vote(
        &self,
        target: ServerId,
        args: RequestVoteRequest,
    ) -> Result<RequestVoteResponse, String>;

    async fn append_entries(
        &self,
        target: ServerId,
        args: AppendEntriesRequest<C>,
    ) -> Result<AppendEntriesResponse, String>;

    async fn install_snapshot(
        &self,
        target: ServerId,
        args: InstallSnapshotRequest,
    ) -> Result<InstallSnapshotResponse, String>;
}
