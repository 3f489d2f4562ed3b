//! Snapshot installation (follower side) and log compaction (leader/host
//! side): the `InstallSnapshot` receiver and `CompactTo`.

use crate::delivery::Delivered;
use crate::network::{InstallSnapshotRequest, InstallSnapshotResponse, RaftNetwork};
use crate::storage::RaftStorage;
use crate::types::{Command, LogIndex, Role};

impl<C: Command, N: RaftNetwork<C>, S: RaftStorage<C>> super::Raft<C, N, S> {
    /// `InstallSnapshot` RPC handler.
    ///
    /// The resolved Open Question: the term recorded for the new
    /// boundary entry is `args.term` (the leader's current term at the time
    /// of the call), not `args.last_included_term`.
    #[tracing::instrument(level = "trace", skip(self, args))]
    pub async fn handle_install_snapshot(&self, args: InstallSnapshotRequest) -> InstallSnapshotResponse {
        let mut st = self.inner.state.lock().await;
        if st.shutdown {
            return InstallSnapshotResponse { term: st.current_term };
        }

        if args.term < st.current_term {
            return InstallSnapshotResponse { term: st.current_term };
        }

        let mut dirty = false;
        if args.term > st.current_term {
            st.step_down(args.term);
            dirty = true;
        } else if st.role == Role::Candidate {
            // A Leader never steps down on equal-term observations except
            // via a higher term; only a Candidate yields to a current-term
            // leader's InstallSnapshot.
            st.role = Role::Follower;
        }

        self.rearm_election_timer_locked(&mut st);

        if args.last_included_index <= st.log.last_included_index() {
            // Stale snapshot, already covered by ours; acknowledge without
            // touching anything further.
            if dirty {
                self.persist_or_halt(&mut st).await;
            }
            return InstallSnapshotResponse { term: st.current_term };
        }

        let retained = st.log.term_at(args.last_included_index) == Some(args.last_included_term);
        if retained {
            st.log.compact_through(args.last_included_index);
        } else {
            st.log.reset_to_boundary(args.last_included_index, args.term);
        }

        st.snapshot_bytes = args.data.clone();
        if args.last_included_index > st.commit_index {
            st.commit_index = args.last_included_index;
        }
        // The snapshot delivery below subsumes every entry up to and
        // including this index, so `lastApplied` jumps directly to it
        // rather than replaying them one at a time through the pump.
        st.last_applied = st.last_applied.max(args.last_included_index);

        if !self.persist_snapshot_or_halt(&mut st).await {
            return InstallSnapshotResponse { term: st.current_term };
        }

        let reply_term = st.current_term;
        // Deliveries must not happen while the mutex is held.
        drop(st);

        let _ = self.inner.delivery_tx.send(Delivered::Snapshot { data: args.data });

        tracing::debug!(
            last_included_index = args.last_included_index,
            "installed snapshot from leader"
        );

        InstallSnapshotResponse { term: reply_term }
    }

    /// `CompactTo`: the host has durably snapshotted everything
    /// through `through_index` and the log prefix can be discarded.
    #[tracing::instrument(level = "debug", skip(self, snapshot_data))]
    pub async fn compact_to(&self, through_index: LogIndex, snapshot_data: Vec<u8>) -> crate::error::RaftResult<()> {
        let mut st = self.inner.state.lock().await;
        if st.shutdown {
            return Err(crate::error::RaftError::ShuttingDown);
        }

        if !st.log.compact_through(through_index) {
            return Ok(());
        }

        st.snapshot_bytes = snapshot_data;
        let encoded = st.to_persisted().encode()?;
        self.inner.storage.save_state_and_snapshot(encoded, st.snapshot_bytes.clone()).await?;

        tracing::debug!(through_index, "compacted log up to snapshot boundary");
        Ok(())
    }
}
