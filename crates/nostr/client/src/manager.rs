//! Relay pool manager.
//!
//! Binds one active identity at a time to three pools: the identity's own
//! relays, its wallet-connect relays, and a fixed fallback set. The identity's
//! stored relay list is observed and every snapshot is applied to the matching
//! pool. Identity switches and snapshot application share one mutex, and a
//! generation counter drops snapshots that belong to an identity no longer
//! active.

use crate::config::ManagerConfig;
use crate::error::{ClientError, Result};
use crate::jobs::{JobId, JobRegistry, JobState, ProgressCallback};
use crate::message::Filter;
use crate::pool::{PoolSubscription, RelayPool, StatusMap};
use crate::relay::PublishConfirmation;
use crate::FALLBACK_RELAYS_VERSION;
use futures::StreamExt;
use futures::stream::BoxStream;
use nostr_core::{Event, RelayDescriptor};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Purpose a stored relay serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelayKind {
    User,
    Nwc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRelay {
    pub kind: RelayKind,
    pub relay: RelayDescriptor,
}

impl StoredRelay {
    pub fn user(relay: RelayDescriptor) -> Self {
        Self {
            kind: RelayKind::User,
            relay,
        }
    }

    pub fn nwc(relay: RelayDescriptor) -> Self {
        Self {
            kind: RelayKind::Nwc,
            relay,
        }
    }
}

/// Local store holding each identity's relay list.
pub trait RelayListStore: Send + Sync {
    /// Emits the identity's full relay list now and again after every change.
    fn observe_relay_list(&self, identity: &str) -> BoxStream<'static, Vec<StoredRelay>>;
}

/// Selects one of the manager's pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolPurpose {
    User,
    Wallet,
    Fallback,
}

struct Observation {
    generation: u64,
    identity: String,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    user: RelayPool,
    wallet: RelayPool,
    fallback: RelayPool,
    store: Arc<dyn RelayListStore>,
    observation: Mutex<Observation>,
    jobs: JobRegistry,
}

impl Inner {
    fn pool(&self, purpose: PoolPurpose) -> &RelayPool {
        match purpose {
            PoolPurpose::User => &self.user,
            PoolPurpose::Wallet => &self.wallet,
            PoolPurpose::Fallback => &self.fallback,
        }
    }

    async fn set_active_identity(self: &Arc<Self>, identity: &str) {
        let mut observation = self.observation.lock().await;
        if let Some(task) = observation.task.take() {
            task.abort();
        }
        observation.generation += 1;
        observation.identity = identity.to_string();

        if identity.is_empty() {
            info!("Active identity cleared, closing user and wallet pools");
            self.user.close_pool().await;
            self.wallet.close_pool().await;
            return;
        }

        info!("Active identity set to {}", identity);
        let relay_lists = self.store.observe_relay_list(identity);
        observation.task = Some(tokio::spawn(observe_relay_lists(
            Arc::downgrade(self),
            observation.generation,
            relay_lists,
        )));
    }

    async fn apply_relay_list(&self, generation: u64, snapshot: Vec<StoredRelay>) {
        let observation = self.observation.lock().await;
        if observation.generation != generation {
            debug!("Dropping relay list of a previous identity");
            return;
        }

        let (user, wallet): (Vec<StoredRelay>, Vec<StoredRelay>) = snapshot
            .into_iter()
            .partition(|stored| stored.kind == RelayKind::User);

        // An empty partition never clears a working pool.
        for (pool, relays) in [(&self.user, user), (&self.wallet, wallet)] {
            if relays.is_empty() {
                debug!("Ignoring empty relay list for pool {}", pool.name());
                continue;
            }
            pool.change_relays(relays.into_iter().map(|stored| stored.relay).collect())
                .await;
        }
        drop(observation);
    }

    async fn publish_event(&self, event: &Event) -> Result<PublishConfirmation> {
        if self.user.has_relays().await {
            self.user.publish_event(event).await
        } else {
            debug!("No user relays, publishing {} to fallback relays", event.id);
            self.fallback.publish_event(event).await
        }
    }

    async fn publish_nwc_event(&self, event: &Event) -> Result<PublishConfirmation> {
        if !self.wallet.has_relays().await {
            return Err(ClientError::Configuration("nwc relay not found".to_string()));
        }
        self.wallet.publish_event(event).await
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.observation.get_mut().task.take() {
            task.abort();
        }
    }
}

async fn observe_relay_lists(
    inner: Weak<Inner>,
    generation: u64,
    mut relay_lists: BoxStream<'static, Vec<StoredRelay>>,
) {
    while let Some(snapshot) = relay_lists.next().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply_relay_list(generation, snapshot).await;
    }
}

/// Owns the user, wallet and fallback pools.
pub struct RelayPoolManager {
    inner: Arc<Inner>,
}

impl RelayPoolManager {
    /// Create the manager and populate the fallback pool.
    pub async fn new(config: ManagerConfig, store: Arc<dyn RelayListStore>) -> Self {
        let inner = Arc::new(Inner {
            user: RelayPool::new("user", config.pool.clone()),
            wallet: RelayPool::new("wallet", config.pool.clone()),
            fallback: RelayPool::new("fallback", config.pool.clone()),
            store,
            observation: Mutex::new(Observation {
                generation: 0,
                identity: String::new(),
                task: None,
            }),
            jobs: JobRegistry::new(),
        });

        let fallback = config
            .fallback_relays
            .iter()
            .map(|url| RelayDescriptor::read_write(url.as_str()))
            .collect();
        inner.fallback.change_relays(fallback).await;
        info!("Fallback relays (v{}) initialized", FALLBACK_RELAYS_VERSION);

        Self { inner }
    }

    /// Switch the active identity. An empty id logs out.
    pub async fn set_active_identity(&self, identity: &str) {
        self.inner.set_active_identity(identity).await;
    }

    pub async fn active_identity(&self) -> String {
        self.inner.observation.lock().await.identity.clone()
    }

    /// Apply every value of `identities` as the active identity, in order.
    ///
    /// The task ends when the sender is dropped or the manager is gone.
    pub fn follow_identity(&self, mut identities: watch::Receiver<String>) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let identity = identities.borrow_and_update().clone();
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.set_active_identity(&identity).await;
                drop(inner);
                if identities.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Publish through the user pool, or the fallback pool when it is empty.
    pub async fn publish_event(&self, event: &Event) -> Result<PublishConfirmation> {
        self.inner.publish_event(event).await
    }

    /// Publish through the wallet pool only.
    pub async fn publish_nwc_event(&self, event: &Event) -> Result<PublishConfirmation> {
        self.inner.publish_nwc_event(event).await
    }

    pub async fn ensure_user_relay_pool_connected(&self) {
        self.inner.user.ensure_all_relays_connected().await;
    }

    pub async fn ensure_user_relay_connected(&self, url: &str) -> Result<()> {
        self.inner.user.ensure_relay_connected(url).await
    }

    pub async fn has_relays(&self, purpose: PoolPurpose) -> bool {
        self.inner.pool(purpose).has_relays().await
    }

    pub async fn relays(&self, purpose: PoolPurpose) -> Vec<RelayDescriptor> {
        self.inner.pool(purpose).relays().await
    }

    pub fn status(&self, purpose: PoolPurpose) -> StatusMap {
        self.inner.pool(purpose).status()
    }

    pub fn watch_status(&self, purpose: PoolPurpose) -> watch::Receiver<StatusMap> {
        self.inner.pool(purpose).watch_status()
    }

    pub async fn subscribe(&self, purpose: PoolPurpose, filters: Vec<Filter>) -> Result<PoolSubscription> {
        self.inner.pool(purpose).subscribe(filters).await
    }

    pub async fn query(&self, purpose: PoolPurpose, filters: Vec<Filter>) -> Result<Vec<Event>> {
        self.inner.pool(purpose).query(filters).await
    }

    /// Publish `event` in the background as job `id`.
    pub async fn spawn_publish(
        &self,
        id: JobId,
        event: Event,
        on_progress: ProgressCallback,
    ) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let task = async move {
            let confirmation = inner.publish_event(&event).await?;
            Ok(format!("accepted by {}", confirmation.relay_url))
        };
        self.inner.jobs.spawn(id, task, on_progress).await
    }

    pub async fn cancel_job(&self, id: JobId) -> bool {
        self.inner.jobs.cancel(id).await
    }

    pub async fn job_state(&self, id: JobId) -> Option<JobState> {
        self.inner.jobs.state(id).await
    }

    /// Release a finished job, returning its terminal state.
    pub async fn forget_job(&self, id: JobId) -> Option<JobState> {
        self.inner.jobs.forget(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct MemoryStore {
        lists: StdMutex<HashMap<String, mpsc::UnboundedSender<Vec<StoredRelay>>>>,
    }

    impl MemoryStore {
        fn emit(&self, identity: &str, relays: Vec<StoredRelay>) {
            if let Some(tx) = self.lists.lock().unwrap().get(identity) {
                let _ = tx.send(relays);
            }
        }
    }

    impl RelayListStore for MemoryStore {
        fn observe_relay_list(&self, identity: &str) -> BoxStream<'static, Vec<StoredRelay>> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.lists.lock().unwrap().insert(identity.to_string(), tx);
            stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|list| (list, rx)) }).boxed()
        }
    }

    fn relay(path: &str) -> RelayDescriptor {
        // port 9 (discard) is closed on test hosts
        RelayDescriptor::read_write(format!("ws://127.0.0.1:9/{}", path))
    }

    fn config() -> ManagerConfig {
        ManagerConfig {
            fallback_relays: vec![relay("fallback").url],
            ..Default::default()
        }
    }

    async fn manager() -> (RelayPoolManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let manager = RelayPoolManager::new(config(), store.clone()).await;
        (manager, store)
    }

    async fn wait_for_relays(manager: &RelayPoolManager, purpose: PoolPurpose, expected: &[RelayDescriptor]) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.relays(purpose).await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("pool never reached the expected relays");
    }

    #[tokio::test]
    async fn test_fallback_pool_initialized() {
        let (manager, _) = manager().await;
        assert_eq!(manager.relays(PoolPurpose::Fallback).await, vec![relay("fallback")]);
        assert!(!manager.has_relays(PoolPurpose::User).await);
        assert!(!manager.has_relays(PoolPurpose::Wallet).await);
    }

    #[tokio::test]
    async fn test_snapshot_partitioned_by_kind() {
        let (manager, store) = manager().await;
        manager.set_active_identity("alice").await;
        store.emit(
            "alice",
            vec![StoredRelay::user(relay("u1")), StoredRelay::nwc(relay("w1"))],
        );

        wait_for_relays(&manager, PoolPurpose::User, &[relay("u1")]).await;
        wait_for_relays(&manager, PoolPurpose::Wallet, &[relay("w1")]).await;
        assert_eq!(manager.active_identity().await, "alice");
    }

    #[tokio::test]
    async fn test_empty_snapshot_keeps_pool() {
        let (manager, store) = manager().await;
        manager.set_active_identity("alice").await;
        store.emit("alice", vec![StoredRelay::user(relay("u1"))]);
        wait_for_relays(&manager, PoolPurpose::User, &[relay("u1")]).await;

        store.emit("alice", vec![]);
        // snapshots apply in order, so once w1 shows up the empty one was handled
        store.emit("alice", vec![StoredRelay::nwc(relay("w1"))]);
        wait_for_relays(&manager, PoolPurpose::Wallet, &[relay("w1")]).await;

        assert_eq!(manager.relays(PoolPurpose::User).await, vec![relay("u1")]);
    }

    #[tokio::test]
    async fn test_logout_closes_user_and_wallet_pools() {
        let (manager, store) = manager().await;
        manager.set_active_identity("alice").await;
        store.emit(
            "alice",
            vec![StoredRelay::user(relay("u1")), StoredRelay::nwc(relay("w1"))],
        );
        wait_for_relays(&manager, PoolPurpose::Wallet, &[relay("w1")]).await;
        wait_for_relays(&manager, PoolPurpose::User, &[relay("u1")]).await;

        manager.set_active_identity("").await;
        assert!(!manager.has_relays(PoolPurpose::User).await);
        assert!(!manager.has_relays(PoolPurpose::Wallet).await);
        assert_eq!(manager.relays(PoolPurpose::Fallback).await, vec![relay("fallback")]);
    }

    #[tokio::test]
    async fn test_switch_ignores_previous_identity() {
        let (manager, store) = manager().await;
        manager.set_active_identity("alice").await;
        store.emit("alice", vec![StoredRelay::user(relay("alice"))]);
        wait_for_relays(&manager, PoolPurpose::User, &[relay("alice")]).await;

        manager.set_active_identity("bob").await;
        store.emit("alice", vec![StoredRelay::user(relay("stale"))]);
        store.emit("bob", vec![StoredRelay::user(relay("bob"))]);
        wait_for_relays(&manager, PoolPurpose::User, &[relay("bob")]).await;
    }

    #[tokio::test]
    async fn test_follow_identity() {
        let (manager, store) = manager().await;
        let (tx, rx) = watch::channel(String::new());
        let follower = manager.follow_identity(rx);

        tx.send("carol".to_string()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.active_identity().await != "carol" {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        store.emit("carol", vec![StoredRelay::user(relay("c"))]);
        wait_for_relays(&manager, PoolPurpose::User, &[relay("c")]).await;

        drop(tx);
        follower.await.unwrap();
    }

    #[tokio::test]
    async fn test_nwc_publish_requires_wallet_relays() {
        let (manager, _) = manager().await;
        let event = Event {
            id: "e".repeat(64),
            pubkey: "p".repeat(64),
            created_at: 1,
            kind: nostr_core::KIND_WALLET_REQUEST,
            tags: vec![],
            content: String::new(),
            sig: String::new(),
        };
        let err = manager.publish_nwc_event(&event).await.unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }
}
