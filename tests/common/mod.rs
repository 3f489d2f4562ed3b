//! In-memory test doubles for `RaftStorage` and `RaftNetwork`, plus a small
//! in-process router so integration tests can wire up a whole cluster
//! without any real transport.
//!
//! An `RwLock`-guarded blob store, and here a router that stands in for
//! a real transport, which this crate treats as the host's concern.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use raft::{
    AppendEntriesRequest, AppendEntriesResponse, Command, Config, DeliveryReceiver, InstallSnapshotRequest,
    InstallSnapshotResponse, Raft, RaftNetwork, RaftStorage, RequestVoteRequest, RequestVoteResponse, ServerId,
    StorageResult,
};

/// An in-memory durable store. Persisted state and the snapshot blob both
/// live behind their own lock, mirroring the two-blob contract in
/// `RaftStorage`.
///
/// Cloning shares the same underlying blobs (an `Arc` bump), so a test can
/// keep a handle across a simulated peer crash/restart and hand the same
/// storage back to a freshly constructed `Raft`.
#[derive(Clone, Default)]
pub struct MemStorage {
    state: Arc<RwLock<Vec<u8>>>,
    snapshot: Arc<RwLock<Vec<u8>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<C: Command> RaftStorage<C> for MemStorage {
    async fn save_state(&self, bytes: Vec<u8>) -> StorageResult<()> {
        *self.state.write().await = bytes;
        Ok(())
    }

    async fn read_state(&self) -> StorageResult<Vec<u8>> {
        Ok(self.state.read().await.clone())
    }

    async fn save_state_and_snapshot(&self, state: Vec<u8>, snapshot: Vec<u8>) -> StorageResult<()> {
        *self.state.write().await = state;
        *self.snapshot.write().await = snapshot;
        Ok(())
    }

    async fn read_snapshot(&self) -> StorageResult<Vec<u8>> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn state_size(&self) -> StorageResult<usize> {
        Ok(self.state.read().await.len())
    }
}

struct Shared<C: Command, S: RaftStorage<C>> {
    peers: RwLock<HashMap<ServerId, Raft<C, RoutedNetwork<C, S>, S>>>,
    cut: RwLock<HashSet<(ServerId, ServerId)>>,
}

/// A network double that dispatches directly to another peer's handler
/// methods in-process, with an optional drop/partition rule applied per
/// link. Every peer holds a `RoutedNetwork` with the same shared peer
/// table, distinguished only by `id` (its own identity as the caller).
pub struct RoutedNetwork<C: Command, S: RaftStorage<C>> {
    id: ServerId,
    shared: Arc<Shared<C, S>>,
}

impl<C: Command, S: RaftStorage<C>> Clone for RoutedNetwork<C, S> {
    fn clone(&self) -> Self {
        Self { id: self.id, shared: self.shared.clone() }
    }
}

impl<C: Command, S: RaftStorage<C>> RoutedNetwork<C, S> {
    async fn is_cut(&self, target: ServerId) -> bool {
        self.shared.cut.read().await.contains(&(self.id, target))
    }
}

/// A handle for flipping link partitions on a cluster built by
/// `build_cluster`, independent of any individual peer's handle.
pub struct PartitionControl<C: Command, S: RaftStorage<C>> {
    shared: Arc<Shared<C, S>>,
}

impl<C: Command, S: RaftStorage<C>> PartitionControl<C, S> {
    /// Partition the link between `a` and `b` in both directions.
    pub async fn cut(&self, a: ServerId, b: ServerId) {
        let mut cut = self.shared.cut.write().await;
        cut.insert((a, b));
        cut.insert((b, a));
    }

    /// Heal a previously cut link.
    pub async fn heal(&self, a: ServerId, b: ServerId) {
        let mut cut = self.shared.cut.write().await;
        cut.remove(&(a, b));
        cut.remove(&(b, a));
    }
}

#[async_trait]
impl<C: Command, S: RaftStorage<C>> RaftNetwork<C> for RoutedNetwork<C, S> {
    async fn request_vote(&self, target: ServerId, args: RequestVoteRequest) -> Result<RequestVoteResponse, String> {
        if self.is_cut(target).await {
            return Err(format!("partitioned: {} -> {}", self.id, target));
        }
        let peers = self.shared.peers.read().await;
        let peer = peers.get(&target).ok_or_else(|| format!("unknown peer {target}"))?;
        Ok(peer.handle_request_vote(args).await)
    }

    async fn append_entries(
        &self,
        target: ServerId,
        args: AppendEntriesRequest<C>,
    ) -> Result<AppendEntriesResponse, String> {
        if self.is_cut(target).await {
            return Err(format!("partitioned: {} -> {}", self.id, target));
        }
        let peers = self.shared.peers.read().await;
        let peer = peers.get(&target).ok_or_else(|| format!("unknown peer {target}"))?;
        Ok(peer.handle_append_entries(args).await)
    }

    async fn install_snapshot(
        &self,
        target: ServerId,
        args: InstallSnapshotRequest,
    ) -> Result<InstallSnapshotResponse, String> {
        if self.is_cut(target).await {
            return Err(format!("partitioned: {} -> {}", self.id, target));
        }
        let peers = self.shared.peers.read().await;
        let peer = peers.get(&target).ok_or_else(|| format!("unknown peer {target}"))?;
        Ok(peer.handle_install_snapshot(args).await)
    }
}

/// Command type used throughout the integration tests: a plain string is
/// enough to exercise ordering and delivery without an application state
/// machine, which is a non-goal of the core.
pub type TestCommand = String;
pub type TestRaft = Raft<TestCommand, RoutedNetwork<TestCommand, MemStorage>, MemStorage>;

pub type TestCluster = (Vec<TestRaft>, Vec<DeliveryReceiver<TestCommand>>, PartitionControl<TestCommand, MemStorage>);

/// Spins up a full in-process cluster: one `Raft` per id in `ids`, all
/// sharing one `RoutedNetwork` peer table, each with its own `MemStorage`.
pub async fn build_cluster(ids: &[ServerId], config: Config) -> TestCluster {
    let storages: Vec<MemStorage> = ids.iter().map(|_| MemStorage::new()).collect();
    build_cluster_with_storage(ids, config, storages).await
}

/// Like `build_cluster`, but reuses the given (already-constructed)
/// storage handles instead of fresh ones — for simulating a crash/restart
/// of every peer against the same durable blobs.
pub async fn build_cluster_with_storage(ids: &[ServerId], config: Config, storages: Vec<MemStorage>) -> TestCluster {
    assert_eq!(ids.len(), storages.len());
    let shared = Arc::new(Shared { peers: RwLock::new(HashMap::new()), cut: RwLock::new(HashSet::new()) });

    let mut rafts = Vec::with_capacity(ids.len());
    let mut receivers = Vec::with_capacity(ids.len());

    for (&id, storage) in ids.iter().zip(storages) {
        let peers: Vec<ServerId> = ids.iter().copied().filter(|&p| p != id).collect();
        let network = RoutedNetwork { id, shared: shared.clone() };

        let (raft, rx) = Raft::new(id, peers, config.clone(), network, storage)
            .await
            .expect("valid config and well-formed storage always construct cleanly");

        shared.peers.write().await.insert(id, raft.clone());
        rafts.push(raft);
        receivers.push(rx);
    }

    (rafts, receivers, PartitionControl { shared })
}

/// A `Config` with much shorter timeouts than the production default, so
/// integration tests don't spend real wall-clock seconds waiting on
/// elections.
pub fn fast_config() -> Config {
    use std::time::Duration;
    Config {
        heartbeat_interval: Duration::from_millis(10),
        election_timeout_min: Duration::from_millis(40),
        election_timeout_max: Duration::from_millis(80),
    }
}

/// Polls `f` until it returns `Some`, or panics after `timeout` elapses.
pub async fn wait_for<T, F, Fut>(timeout: std::time::Duration, mut f: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(v) = f().await {
            return v;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

/// Finds the (at most one) peer among `rafts` that currently believes
/// itself leader, if any.
pub async fn find_leader(rafts: &[TestRaft]) -> Option<usize> {
    for (i, raft) in rafts.iter().enumerate() {
        let (_, is_leader) = raft.get_state().await;
        if is_leader {
            return Some(i);
        }
    }
    None
}
