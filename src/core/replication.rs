//! Log replication: the leader's fan-out of `AppendEntries`/`InstallSnapshot`,
//! the follower's `AppendEntries` receiver, and commit-index advancement.

use crate::log::Log;
use crate::network::{AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, RaftNetwork};
use crate::quorum;
use crate::storage::RaftStorage;
use crate::types::{Command, LogIndex, Role, ServerId, Term};

use super::state::CoreState;
use super::Raft;

impl<C: Command, N: RaftNetwork<C>, S: RaftStorage<C>> Raft<C, N, S> {
    /// Broadcast replication to every peer: used both for the periodic
    /// heartbeat and immediately after `Submit`.
    pub(crate) fn spawn_replicate_to_all(&self) {
        for &peer in &self.inner.peers {
            let raft = self.clone();
            tokio::spawn(async move { raft.replicate_to_peer(peer).await });
        }
    }

    async fn replicate_to_peer(&self, peer: ServerId) {
        enum Action<C: Command> {
            Append(AppendEntriesRequest<C>),
            Snapshot(InstallSnapshotRequest),
        }

        let (term, action) = {
            let st = self.inner.state.lock().await;
            if st.shutdown || st.role != Role::Leader {
                return;
            }

            let term = st.current_term;
            let next = *st.next_index.get(&peer).unwrap_or(&(st.log.last_log_index() + 1));

            if next <= st.log.last_included_index() {
                let req = InstallSnapshotRequest {
                    term,
                    leader_id: self.inner.id,
                    last_included_index: st.log.last_included_index(),
                    last_included_term: st.log.last_included_term(),
                    data: st.snapshot_bytes.clone(),
                };
                (term, Action::Snapshot(req))
            } else {
                let prev_log_index = next - 1;
                let prev_log_term = st.log.term_at(prev_log_index).unwrap_or(0);
                let entries = st.log.slice(next).to_vec();
                let req = AppendEntriesRequest {
                    term,
                    leader_id: self.inner.id,
                    prev_log_index,
                    prev_log_term,
                    entries,
                    leader_commit: st.commit_index,
                };
                (term, Action::Append(req))
            }
        };

        match action {
            Action::Append(req) => self.send_append_entries(peer, term, req).await,
            Action::Snapshot(req) => self.send_install_snapshot(peer, term, req).await,
        }
    }

    async fn send_append_entries(&self, peer: ServerId, sent_term: Term, req: AppendEntriesRequest<C>) {
        let reply = match self.inner.network.append_entries(peer, req).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(peer, %err, "append_entries transport failure; will retry next heartbeat");
                return;
            }
        };

        let mut st = self.inner.state.lock().await;
        if st.shutdown {
            return;
        }

        if reply.term > st.current_term {
            st.step_down(reply.term);
            self.persist_or_halt(&mut st).await;
            return;
        }

        if st.role != Role::Leader || st.current_term != sent_term {
            // Stale reply from a round this peer is no longer leading.
            return;
        }

        if reply.success {
            let confirm_index = reply.confirm_index;
            st.match_index.insert(peer, confirm_index.saturating_sub(1));
            st.next_index.insert(peer, confirm_index);
            self.maybe_advance_commit_locked(&mut st);
        } else {
            // `confirm_index` doubles as the accelerated backtracking hint on
            // failure.
            st.next_index.insert(peer, reply.confirm_index.max(1));
        }
    }

    async fn send_install_snapshot(&self, peer: ServerId, sent_term: Term, req: InstallSnapshotRequest) {
        let last_included_index = req.last_included_index;
        let reply = match self.inner.network.install_snapshot(peer, req).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(peer, %err, "install_snapshot transport failure; will retry next heartbeat");
                return;
            }
        };

        let mut st = self.inner.state.lock().await;
        if st.shutdown {
            return;
        }

        if reply.term > st.current_term {
            st.step_down(reply.term);
            self.persist_or_halt(&mut st).await;
            return;
        }

        if st.role != Role::Leader || st.current_term != sent_term {
            return;
        }

        let match_index = st.match_index.entry(peer).or_insert(0);
        if last_included_index > *match_index {
            *match_index = last_included_index;
        }
        st.next_index.insert(peer, last_included_index + 1);
        self.maybe_advance_commit_locked(&mut st);
    }

    /// Recompute `commitIndex` from every peer's `matchIndex` and advance it
    /// if a new index satisfies the majority + current-term rule.
    pub(crate) fn maybe_advance_commit_locked(&self, st: &mut CoreState<C>) {
        let mut match_indices: Vec<LogIndex> =
            self.inner.peers.iter().map(|p| *st.match_index.get(p).unwrap_or(&0)).collect();
        // Self is implicitly caught up to its own last log index.
        match_indices.push(st.log.last_log_index());

        let new_commit = calculate_new_commit_index(match_indices, st.commit_index, st.current_term, &st.log);
        if new_commit > st.commit_index {
            st.commit_index = new_commit;
            self.inner.commit_notify.notify_one();
            tracing::debug!(commit_index = new_commit, "advanced commit index");
        }
    }

    /// `AppendEntries` RPC handler.
    #[tracing::instrument(level = "trace", skip(self, args))]
    pub async fn handle_append_entries(&self, args: AppendEntriesRequest<C>) -> AppendEntriesResponse {
        let mut st = self.inner.state.lock().await;
        if st.shutdown {
            return AppendEntriesResponse { term: st.current_term, success: false, confirm_index: 0 };
        }

        if args.term < st.current_term {
            return AppendEntriesResponse { term: st.current_term, success: false, confirm_index: 0 };
        }

        let mut dirty = false;
        if args.term > st.current_term {
            st.step_down(args.term);
            dirty = true;
        } else if st.role == Role::Candidate {
            // A Leader never steps down on equal-term observations except
            // via a higher term; only a Candidate yields to a current-term
            // leader's AppendEntries.
            st.role = Role::Follower;
        }

        // This is a valid AppendEntries from the current leader: reset the
        // election timer regardless of the consistency-check outcome below.
        self.rearm_election_timer_locked(&mut st);

        let boundary = st.log.last_included_index();
        let last_log_index = st.log.last_log_index();

        if args.prev_log_index < boundary {
            if dirty && !self.persist_or_halt(&mut st).await {
                return AppendEntriesResponse { term: st.current_term, success: false, confirm_index: 0 };
            }
            return AppendEntriesResponse { term: st.current_term, success: false, confirm_index: boundary };
        }

        let consistent = st.log.term_at(args.prev_log_index) == Some(args.prev_log_term);

        if !consistent {
            let mut hint = last_log_index.min(args.prev_log_index);
            while hint > st.commit_index && hint > boundary {
                if st.log.term_at(hint) == Some(args.prev_log_term) {
                    break;
                }
                hint -= 1;
            }
            if dirty && !self.persist_or_halt(&mut st).await {
                return AppendEntriesResponse { term: st.current_term, success: false, confirm_index: 0 };
            }
            return AppendEntriesResponse { term: st.current_term, success: false, confirm_index: hint };
        }

        st.log.truncate_from_including(args.prev_log_index + 1);
        if !args.entries.is_empty() {
            st.log.append(args.entries);
            dirty = true;
        }

        if args.leader_commit > st.commit_index {
            let new_commit = args.leader_commit.min(st.log.last_log_index());
            if new_commit > st.commit_index {
                st.commit_index = new_commit;
                self.inner.commit_notify.notify_one();
            }
        }

        if dirty && !self.persist_or_halt(&mut st).await {
            return AppendEntriesResponse { term: st.current_term, success: false, confirm_index: 0 };
        }

        AppendEntriesResponse {
            term: st.current_term,
            success: true,
            confirm_index: st.log.last_log_index() + 1,
        }
    }
}

/// Determine the new `commitIndex` from the known `matchIndex` of every
/// peer (including self). `match_indices` need not be pre-sorted.
///
/// A majority of peers replicating index N is not sufficient to commit N
/// unless the leader has also replicated an entry of its *current* term at
/// or past N.
pub(crate) fn calculate_new_commit_index<C: Command>(
    mut match_indices: Vec<LogIndex>,
    current_commit: LogIndex,
    current_term: Term,
    log: &Log<C>,
) -> LogIndex {
    if match_indices.is_empty() {
        return current_commit;
    }

    match_indices.sort_unstable();

    let majority = quorum::majority_of(match_indices.len());
    let offset = match_indices.len() - majority;
    let candidate = match_indices[offset];

    if candidate > current_commit && log.term_at(candidate) == Some(current_term) {
        candidate
    } else {
        current_commit
    }
}
