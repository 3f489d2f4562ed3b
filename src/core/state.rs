//! In-memory consensus state guarded by the peer's single mutex.

use std::collections::{HashMap, HashSet};

use crate::log::Log;
use crate::storage::PersistentState;
use crate::types::{Command, LogIndex, Role, ServerId, Term};

/// Everything that can change while the peer runs, all behind one lock.
pub(crate) struct CoreState<C: Command> {
    pub role: Role,
    pub current_term: Term,
    pub voted_for: Option<ServerId>,
    pub log: Log<C>,

    pub commit_index: LogIndex,
    pub last_applied: LogIndex,

    /// Leader-only. Empty/stale while not leading; repopulated on election.
    pub next_index: HashMap<ServerId, LogIndex>,
    pub match_index: HashMap<ServerId, LogIndex>,

    /// Candidate-only. Cleared whenever a new election starts.
    pub votes_received: HashSet<ServerId>,

    /// Bumped on every re-arm so a late `TimerFired` can be told apart from
    /// the timer actually currently in flight.
    pub timer_generation: u64,

    /// Cache of the last installed snapshot blob, returned by `LoadSnapshot`
    /// without a storage round trip.
    pub snapshot_bytes: Vec<u8>,

    pub shutdown: bool,
}

impl<C: Command> CoreState<C> {
    pub fn from_persisted(persisted: PersistentState<C>, snapshot_bytes: Vec<u8>) -> Self {
        let commit_index = persisted.last_included_index;
        Self {
            role: Role::Follower,
            current_term: persisted.current_term,
            voted_for: persisted.voted_for,
            log: Log::new(persisted.log),
            // Entries covered by a restored snapshot are, by construction,
            // already committed and already applied by the host that
            // produced the snapshot.
            commit_index,
            last_applied: commit_index,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            votes_received: HashSet::new(),
            timer_generation: 0,
            snapshot_bytes,
            shutdown: false,
        }
    }

    pub fn to_persisted(&self) -> PersistentState<C> {
        PersistentState {
            current_term: self.current_term,
            voted_for: self.voted_for,
            log: self.log.entries().to_vec(),
            last_included_index: self.log.last_included_index(),
            last_included_term: self.log.last_included_term(),
        }
    }

    /// Whether `(candidate_last_term, candidate_last_index)` is at least as
    /// up-to-date as our own log.
    pub fn candidate_is_up_to_date(&self, last_log_term: Term, last_log_index: LogIndex) -> bool {
        let own_term = self.log.last_log_term();
        let own_index = self.log.last_log_index();
        last_log_term > own_term || (last_log_term == own_term && last_log_index >= own_index)
    }

    /// Unconditionally adopt a higher term, reverting to Follower and
    /// clearing the vote.
    pub fn step_down(&mut self, term: Term) {
        debug_assert!(term >= self.current_term);
        self.current_term = term;
        self.voted_for = None;
        self.role = Role::Follower;
        self.next_index.clear();
        self.match_index.clear();
        self.votes_received.clear();
    }
}
