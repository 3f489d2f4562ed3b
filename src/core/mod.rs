//! The Consensus State Machine (CSM) and the public host-facing API.

mod election;
mod replication;
mod snapshot;
pub(crate) mod state;

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};
use tracing::Instrument;

use crate::config::Config;
use crate::delivery::{self, DeliveryReceiver, DeliverySender};
use crate::error::{RaftError, RaftResult};
use crate::metrics::RaftMetrics;
use crate::network::RaftNetwork;
use crate::storage::{PersistentState, RaftStorage};
use crate::timer::{self, TimerFired};
use crate::types::{Command, LogIndex, ServerId, Term};

use state::CoreState;

/// Shared, immutable-for-the-lifetime-of-the-instance fields plus the
/// mutex-guarded mutable state.
pub(crate) struct Inner<C: Command, N: RaftNetwork<C>, S: RaftStorage<C>> {
    pub id: ServerId,
    /// The other members of the (static) cluster roster, excluding `id`.
    pub peers: Vec<ServerId>,
    pub config: Config,
    pub network: N,
    pub storage: S,
    pub delivery_tx: DeliverySender<C>,
    pub commit_notify: Notify,
    pub timer_tx: mpsc::UnboundedSender<TimerFired>,
    pub state: Mutex<CoreState<C>>,
}

/// A cloneable handle to a single Raft peer.
///
/// Cloning is cheap (an `Arc` bump); every clone talks to the same
/// background driver and the same mutex-guarded state.
pub struct Raft<C: Command, N: RaftNetwork<C>, S: RaftStorage<C>> {
    pub(crate) inner: Arc<Inner<C, N, S>>,
}

impl<C: Command, N: RaftNetwork<C>, S: RaftStorage<C>> Clone for Raft<C, N, S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

/// The outcome of a `submit` call.
///
/// The conventional `(-1, -1, false)` sentinel for "not leader" is expressed
/// here as `index`/`term` being `None` rather than a magic negative number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub index: Option<LogIndex>,
    pub term: Option<Term>,
    pub is_leader: bool,
}

impl<C: Command, N: RaftNetwork<C>, S: RaftStorage<C>> Raft<C, N, S> {
    /// Construct a peer, restoring persisted state and arming the election
    /// timer. Returns the handle plus the receiving half of the delivery
    /// channel the host should drain.
    pub async fn new(
        id: ServerId,
        peers: Vec<ServerId>,
        config: Config,
        network: N,
        storage: S,
    ) -> RaftResult<(Self, DeliveryReceiver<C>)> {
        config.validate()?;

        let state_bytes = storage.read_state().await?;
        let persisted = if state_bytes.is_empty() {
            PersistentState::default()
        } else {
            PersistentState::decode(&state_bytes)?
        };
        let snapshot_bytes = storage.read_snapshot().await?;

        let (delivery_tx, delivery_rx) = delivery::channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            id,
            peers,
            config,
            network,
            storage,
            delivery_tx,
            commit_notify: Notify::new(),
            timer_tx,
            state: Mutex::new(CoreState::from_persisted(persisted, snapshot_bytes)),
        });

        let raft = Self { inner };

        // Arm the initial election timer before anything else can observe
        // this peer, so there is never a window with no timer in flight.
        {
            let mut st = raft.inner.state.lock().await;
            raft.rearm_election_timer_locked(&mut st);
        }

        tokio::spawn(Self::timer_driver_loop(raft.inner.clone(), timer_rx).in_current_span());
        tokio::spawn(Self::delivery_pump_loop(raft.inner.clone()).in_current_span());

        Ok((raft, delivery_rx))
    }

    /// `GetState`: current term and whether this peer believes itself
    /// leader. No side effects.
    pub async fn get_state(&self) -> (Term, bool) {
        let st = self.inner.state.lock().await;
        (st.current_term, st.role == crate::types::Role::Leader)
    }

    /// `Metrics`: a point-in-time snapshot for
    /// observability.
    pub async fn metrics(&self) -> RaftMetrics {
        let st = self.inner.state.lock().await;
        RaftMetrics {
            id: self.inner.id,
            term: st.current_term,
            role: st.role,
            last_log_index: st.log.last_log_index(),
            commit_index: st.commit_index,
            last_applied: st.last_applied,
        }
    }

    /// `PersistedSize`: size in bytes of the serialized persistent
    /// state blob, so the host can decide when to snapshot.
    pub async fn persisted_size(&self) -> RaftResult<usize> {
        Ok(self.inner.storage.state_size().await?)
    }

    /// `LoadSnapshot`: the last installed snapshot blob, or empty.
    pub async fn load_snapshot(&self) -> Vec<u8> {
        let st = self.inner.state.lock().await;
        st.snapshot_bytes.clone()
    }

    /// `Submit`: append a command to the leader's log if this peer is
    /// leader; otherwise a no-op.
    #[tracing::instrument(level = "debug", skip(self, command))]
    pub async fn submit(&self, command: C) -> RaftResult<SubmitOutcome> {
        let mut st = self.inner.state.lock().await;
        if st.shutdown {
            return Err(RaftError::ShuttingDown);
        }
        if st.role != crate::types::Role::Leader {
            return Ok(SubmitOutcome { index: None, term: None, is_leader: false });
        }

        let index = st.log.last_log_index() + 1;
        let term = st.current_term;
        st.log.append(vec![crate::types::LogEntry::new(
            index,
            term,
            crate::types::EntryPayload::Command(command),
        )]);

        self.persist_locked(&st).await?;
        tracing::debug!(index, term, "leader appended new entry");
        drop(st);

        self.spawn_replicate_to_all();

        Ok(SubmitOutcome { index: Some(index), term: Some(term), is_leader: true })
    }

    /// `Shutdown`: stop timers and background activity.
    pub async fn shutdown(&self) {
        let mut st = self.inner.state.lock().await;
        st.shutdown = true;
    }

    /// Writes the current persistent fields to the durable store.
    ///
    /// Called from inside the lock, per invariant 8: every observable reply
    /// that depends on `current_term`, `voted_for`, or log contents must
    /// follow a successful durable write of those fields.
    pub(crate) async fn persist_locked(&self, st: &CoreState<C>) -> RaftResult<()> {
        let bytes = st.to_persisted().encode()?;
        self.inner.storage.save_state(bytes).await?;
        Ok(())
    }

    /// Persist, halting the peer on failure. Returns whether the persist succeeded.
    pub(crate) async fn persist_or_halt(&self, st: &mut CoreState<C>) -> bool {
        if let Err(err) = self.persist_locked(st).await {
            tracing::error!(?err, "failed to persist state; halting peer");
            st.shutdown = true;
            false
        } else {
            true
        }
    }

    /// Persist state and snapshot together, halting the peer on failure.
    /// Returns whether the persist succeeded.
    pub(crate) async fn persist_snapshot_or_halt(&self, st: &mut CoreState<C>) -> bool {
        let result = async {
            let bytes = st.to_persisted().encode()?;
            self.inner.storage.save_state_and_snapshot(bytes, st.snapshot_bytes.clone()).await?;
            Ok::<(), RaftError>(())
        }
        .await;

        if let Err(err) = result {
            tracing::error!(?err, "failed to persist state and snapshot; halting peer");
            st.shutdown = true;
            false
        } else {
            true
        }
    }

    /// Re-arm the election timer with a fresh random timeout, bumping the
    /// generation so any in-flight timer from before this call is
    /// recognized as stale when it eventually fires.
    pub(crate) fn rearm_election_timer_locked(&self, st: &mut CoreState<C>) {
        st.timer_generation += 1;
        let timeout = timer::random_election_timeout(&self.inner.config);
        timer::arm(timeout, st.timer_generation, self.inner.timer_tx.clone());
    }

    /// Re-arm the heartbeat timer (leader only).
    pub(crate) fn rearm_heartbeat_timer_locked(&self, st: &mut CoreState<C>) {
        st.timer_generation += 1;
        let timeout = self.inner.config.heartbeat_interval;
        timer::arm(timeout, st.timer_generation, self.inner.timer_tx.clone());
    }

    /// The timer driver: reacts to `TimerFired` events, dropping
    /// ones whose generation is stale.
    async fn timer_driver_loop(inner: Arc<Inner<C, N, S>>, mut timer_rx: mpsc::UnboundedReceiver<TimerFired>) {
        let raft = Raft { inner };
        while let Some(fired) = timer_rx.recv().await {
            let mut st = raft.inner.state.lock().await;
            if st.shutdown {
                return;
            }
            if fired.generation != st.timer_generation {
                // Superseded by a more recent re-arm; ignore.
                continue;
            }

            if st.role == crate::types::Role::Leader {
                raft.rearm_heartbeat_timer_locked(&mut st);
                drop(st);
                raft.spawn_replicate_to_all();
            } else {
                drop(st);
                raft.start_election().await;
            }
        }
    }

    /// The delivery pump: wakes on every commit advance and drains
    /// `(last_applied, commit_index]` to the host, strictly in order.
    async fn delivery_pump_loop(inner: Arc<Inner<C, N, S>>) {
        loop {
            inner.commit_notify.notified().await;
            loop {
                let next = {
                    let mut st = inner.state.lock().await;
                    if st.shutdown {
                        return;
                    }
                    if st.last_applied >= st.commit_index {
                        break;
                    }
                    let index = st.last_applied + 1;
                    let term = st.log.term_at(index).unwrap_or(0);
                    let payload = st
                        .log
                        .slice(index)
                        .first()
                        .map(|e| e.payload.clone());
                    st.last_applied = index;
                    payload.map(|p| (index, term, p))
                };

                if let Some((index, term, payload)) = next {
                    if let crate::types::EntryPayload::Command(command) = payload {
                        let _ = inner.delivery_tx.send(delivery::Delivered::Entry { index, term, command });
                    }
                    // `Blank` boundary entries are marked applied but never
                    // delivered: they carry no host-meaningful payload.
                }
            }
        }
    }
}
