//! Leader election: starting a vote, handling `RequestVote`, and counting
//! grants towards a majority.

use crate::network::{RaftNetwork, RequestVoteRequest, RequestVoteResponse};
use crate::quorum;
use crate::storage::RaftStorage;
use crate::types::{Command, Role};

use super::Raft;

impl<C: Command, N: RaftNetwork<C>, S: RaftStorage<C>> Raft<C, N, S> {
    /// Begin a new election: bump the term, vote for self, and fan out
    /// `RequestVote` to every other peer.
    #[tracing::instrument(level = "debug", skip(self))]
    pub(crate) async fn start_election(&self) {
        let (term, last_log_index, last_log_term) = {
            let mut st = self.inner.state.lock().await;
            if st.shutdown {
                return;
            }

            st.role = Role::Candidate;
            st.current_term += 1;
            st.voted_for = Some(self.inner.id);
            st.votes_received.clear();
            st.votes_received.insert(self.inner.id);

            if !self.persist_or_halt(&mut st).await {
                return;
            }

            self.rearm_election_timer_locked(&mut st);

            tracing::debug!(term = st.current_term, "starting election");
            (st.current_term, st.log.last_log_index(), st.log.last_log_term())
        };

        for &peer in &self.inner.peers {
            let raft = self.clone();
            let args = RequestVoteRequest {
                term,
                candidate_id: self.inner.id,
                last_log_index,
                last_log_term,
            };
            tokio::spawn(async move {
                raft.send_request_vote(peer, term, args).await;
            });
        }
    }

    async fn send_request_vote(
        &self,
        peer: crate::types::ServerId,
        sent_term: crate::types::Term,
        args: RequestVoteRequest,
    ) {
        let reply = match self.inner.network.request_vote(peer, args).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(peer, %err, "request_vote transport failure; will retry next election");
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

        // Stale reply from an election we've already moved past.
        if st.role != Role::Candidate || st.current_term != sent_term {
            return;
        }

        if !reply.vote_granted {
            return;
        }

        st.votes_received.insert(peer);
        let total_peers = self.inner.peers.len() + 1;
        let became_leader = st.votes_received.len() > quorum::majority_threshold(total_peers);
        if became_leader {
            self.become_leader_locked(&mut st);
        }
        drop(st);

        // Heartbeats fire immediately upon promotion, rather than waiting
        // for the next heartbeat tick.
        if became_leader {
            self.spawn_replicate_to_all();
        }
    }

    /// Promote this peer to Leader.
    fn become_leader_locked(&self, st: &mut super::state::CoreState<C>) {
        tracing::debug!(term = st.current_term, "won election, becoming leader");
        st.role = Role::Leader;
        let next = st.log.last_log_index() + 1;
        st.next_index.clear();
        st.match_index.clear();
        for &peer in &self.inner.peers {
            st.next_index.insert(peer, next);
            st.match_index.insert(peer, 0);
        }
        self.rearm_heartbeat_timer_locked(st);
    }

    /// `RequestVote` RPC handler.
    #[tracing::instrument(level = "trace", skip(self, args))]
    pub async fn handle_request_vote(&self, args: RequestVoteRequest) -> RequestVoteResponse {
        let mut st = self.inner.state.lock().await;
        if st.shutdown {
            return RequestVoteResponse { term: st.current_term, vote_granted: false };
        }

        if args.term < st.current_term {
            return RequestVoteResponse { term: st.current_term, vote_granted: false };
        }

        let mut term_adopted = false;
        if args.term > st.current_term {
            st.step_down(args.term);
            term_adopted = true;
        }

        let can_vote = match st.voted_for {
            None => true,
            Some(c) => c == args.candidate_id,
        };
        let up_to_date = st.candidate_is_up_to_date(args.last_log_term, args.last_log_index);
        let grant = can_vote && up_to_date;

        if grant {
            st.voted_for = Some(args.candidate_id);
        }

        if (grant || term_adopted) && !self.persist_or_halt(&mut st).await {
            return RequestVoteResponse { term: st.current_term, vote_granted: false };
        }

        if grant {
            self.rearm_election_timer_locked(&mut st);
            tracing::debug!(term = st.current_term, candidate = args.candidate_id, "granted vote");
        }

        RequestVoteResponse { term: st.current_term, vote_granted: grant }
    }
}
