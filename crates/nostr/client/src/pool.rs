//! Relay pool: one named set of relay connections serving one purpose.
//!
//! The pool owns its connections exclusively. Membership is replaced through
//! [`RelayPool::change_relays`]; urls present before and after keep their live
//! connection, urls that disappear are closed, new urls are connected in the
//! background. Publishing fans out to every write relay and succeeds on the
//! first acceptance.

use crate::config::PoolConfig;
use crate::error::{ClientError, Result};
use crate::message::{Filter, RelayMessage};
use crate::relay::{ConnectionState, PublishConfirmation, RelayConnection, validate_relay_url};
use crate::subscription::{SubscriptionTracker, generate_subscription_id};
use futures::future::join_all;
use futures::stream::{self, BoxStream, SelectAll, select_all};
use futures::StreamExt;
use nostr_core::nip65::{dedup_relays, relay_set};
use nostr_core::{Event, RelayDescriptor};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-relay status as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayStatus {
    Connecting,
    Connected,
    Disconnected,
    /// The last connect attempt or session ended with an error
    Failed,
}

impl RelayStatus {
    fn of(connection: &RelayConnection) -> Self {
        match connection.state() {
            ConnectionState::Connecting => RelayStatus::Connecting,
            ConnectionState::Connected => RelayStatus::Connected,
            ConnectionState::Disconnected if connection.has_failed() => RelayStatus::Failed,
            ConnectionState::Disconnected => RelayStatus::Disconnected,
        }
    }
}

pub type StatusMap = BTreeMap<String, RelayStatus>;

struct PoolEntry {
    relay: RelayDescriptor,
    connection: Arc<RelayConnection>,
    status_task: JoinHandle<()>,
}

impl Drop for PoolEntry {
    fn drop(&mut self) {
        self.status_task.abort();
    }
}

/// A named pool of relay connections.
pub struct RelayPool {
    name: String,
    config: PoolConfig,
    entries: RwLock<BTreeMap<String, PoolEntry>>,
    status: Arc<watch::Sender<StatusMap>>,
}

impl RelayPool {
    /// Create an empty pool.
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Self {
        let (status, _) = watch::channel(StatusMap::new());
        Self {
            name: name.into(),
            config,
            entries: RwLock::new(BTreeMap::new()),
            status: Arc::new(status),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn has_relays(&self) -> bool {
        !self.entries.read().await.is_empty()
    }

    /// Current membership, ordered by url.
    pub async fn relays(&self) -> Vec<RelayDescriptor> {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| entry.relay.clone())
            .collect()
    }

    pub fn status(&self) -> StatusMap {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusMap> {
        self.status.subscribe()
    }

    /// Replace the pool's membership with `relays`.
    ///
    /// Relays whose url fails validation are skipped. Returns false, touching
    /// nothing, when the remaining set equals the current one.
    pub async fn change_relays(&self, relays: Vec<RelayDescriptor>) -> bool {
        let relays: Vec<RelayDescriptor> = dedup_relays(relays)
            .into_iter()
            .filter(|relay| match validate_relay_url(&relay.url) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Pool {}: skipping relay {}: {}", self.name, relay.url, e);
                    false
                }
            })
            .collect();
        let mut entries = self.entries.write().await;

        let current: BTreeSet<RelayDescriptor> =
            entries.values().map(|entry| entry.relay.clone()).collect();
        if current == relay_set(&relays) {
            debug!("Pool {}: relay set unchanged", self.name);
            return false;
        }

        let removed: Vec<String> = entries
            .keys()
            .filter(|url| !relays.iter().any(|relay| &relay.url == *url))
            .cloned()
            .collect();
        let mut to_close = Vec::with_capacity(removed.len());
        for url in removed {
            if let Some(entry) = entries.remove(&url) {
                info!("Pool {}: removing relay {}", self.name, url);
                to_close.push(Arc::clone(&entry.connection));
            }
            self.status.send_modify(|status| {
                status.remove(&url);
            });
        }

        let mut to_connect = Vec::new();
        for relay in relays {
            if let Some(entry) = entries.get_mut(&relay.url) {
                entry.relay = relay;
                continue;
            }
            let connection = match RelayConnection::with_config(&relay.url, self.config.relay.clone()) {
                Ok(connection) => Arc::new(connection),
                Err(e) => {
                    warn!("Pool {}: skipping relay {}: {}", self.name, relay.url, e);
                    continue;
                }
            };
            info!("Pool {}: adding relay {}", self.name, relay.url);
            self.status.send_modify(|status| {
                status.insert(relay.url.clone(), RelayStatus::Disconnected);
            });
            let status_task = self.spawn_status_task(Arc::clone(&connection));
            to_connect.push(Arc::clone(&connection));
            entries.insert(
                relay.url.clone(),
                PoolEntry {
                    relay,
                    connection,
                    status_task,
                },
            );
        }
        let size = entries.len();
        drop(entries);

        for connection in to_close {
            connection.close().await;
        }
        for connection in to_connect {
            let pool = self.name.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.connect().await {
                    warn!("Pool {}: could not connect to {}: {}", pool, connection.url(), e);
                }
            });
        }

        info!("Pool {} now has {} relays", self.name, size);
        true
    }

    fn spawn_status_task(&self, connection: Arc<RelayConnection>) -> JoinHandle<()> {
        let status = Arc::clone(&self.status);
        let mut states = connection.watch_state();
        tokio::spawn(async move {
            loop {
                let current = RelayStatus::of(&connection);
                status.send_if_modified(|map| match map.get_mut(connection.url()) {
                    Some(slot) if *slot != current => {
                        *slot = current;
                        true
                    }
                    _ => false,
                });
                if states.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Send `event` to every write relay; succeed on the first acceptance.
    ///
    /// Fails with [`ClientError::NoRelays`] before any network call when the
    /// pool has no write relay, and with [`ClientError::PublishFailed`] when
    /// every relay rejected the event or failed.
    pub async fn publish_event(&self, event: &Event) -> Result<PublishConfirmation> {
        let targets: Vec<Arc<RelayConnection>> = self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| entry.relay.write)
            .map(|entry| Arc::clone(&entry.connection))
            .collect();
        if targets.is_empty() {
            return Err(ClientError::NoRelays);
        }

        debug!("Pool {}: publishing {} to {} relays", self.name, event.id, targets.len());
        let (tx, mut rx) = mpsc::channel(targets.len());
        for connection in targets {
            let tx = tx.clone();
            let event = event.clone();
            let confirmation_timeout = self.config.publish_timeout();
            tokio::spawn(async move {
                let outcome = match connection.connect().await {
                    Ok(()) => connection.publish_event(&event, confirmation_timeout).await,
                    Err(e) => Err(e),
                };
                let _ = tx.send((connection.url().to_string(), outcome)).await;
            });
        }
        drop(tx);

        let mut failures = Vec::new();
        while let Some((url, outcome)) = rx.recv().await {
            match outcome {
                Ok(confirmation) if confirmation.accepted => {
                    info!("Pool {}: event {} accepted by {}", self.name, event.id, url);
                    return Ok(confirmation);
                }
                Ok(confirmation) => {
                    warn!(
                        "Pool {}: event {} rejected by {}: {}",
                        self.name, event.id, url, confirmation.message
                    );
                    failures.push(format!("{}: {}", url, confirmation.message));
                }
                Err(e) => {
                    warn!("Pool {}: publishing {} to {} failed: {}", self.name, event.id, url, e);
                    failures.push(format!("{}: {}", url, e));
                }
            }
        }

        Err(ClientError::PublishFailed(failures.join("; ")))
    }

    /// Connect every relay that is not connected yet. Failures are logged.
    pub async fn ensure_all_relays_connected(&self) {
        let connections = self.connections().await;
        let results = join_all(connections.iter().map(|connection| connection.connect())).await;
        for (connection, result) in connections.iter().zip(results) {
            if let Err(e) = result {
                warn!("Pool {}: could not connect to {}: {}", self.name, connection.url(), e);
            }
        }
    }

    /// Connect one member relay if needed.
    pub async fn ensure_relay_connected(&self, url: &str) -> Result<()> {
        let connection = self
            .entries
            .read()
            .await
            .get(url)
            .map(|entry| Arc::clone(&entry.connection))
            .ok_or_else(|| {
                ClientError::Configuration(format!("relay {} is not in pool {}", url, self.name))
            })?;
        connection.connect().await
    }

    /// Disconnect and drop every relay. The pool can be repopulated afterwards.
    pub async fn close_pool(&self) {
        let entries = std::mem::take(&mut *self.entries.write().await);
        self.status.send_modify(|status| status.clear());
        if entries.is_empty() {
            return;
        }

        info!("Closing pool {} ({} relays)", self.name, entries.len());
        join_all(entries.values().map(|entry| entry.connection.close())).await;
    }

    async fn connections(&self) -> Vec<Arc<RelayConnection>> {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| Arc::clone(&entry.connection))
            .collect()
    }

    /// Open one subscription on every read relay, connecting them as needed.
    ///
    /// Each relay's frames end with a `None` marker once its socket closes.
    pub async fn subscribe(&self, filters: Vec<Filter>) -> Result<PoolSubscription> {
        let targets: Vec<Arc<RelayConnection>> = self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| entry.relay.read)
            .map(|entry| Arc::clone(&entry.connection))
            .collect();
        if targets.is_empty() {
            return Err(ClientError::NoRelays);
        }

        let id = generate_subscription_id();
        let mut relays = Vec::new();
        let mut streams = Vec::new();
        for connection in targets {
            let opened = match connection.connect().await {
                Ok(()) => connection.subscribe(&id, filters.clone()).await,
                Err(e) => Err(e),
            };
            match opened {
                Ok(frames) => {
                    let url = connection.url().to_string();
                    let ended = stream::once({
                        let url = url.clone();
                        async move { (url, None::<RelayMessage>) }
                    });
                    streams.push(
                        frames
                            .map(move |frame| (url.clone(), Some(frame)))
                            .chain(ended)
                            .boxed(),
                    );
                    relays.push(connection);
                }
                Err(e) => {
                    warn!("Pool {}: subscription {} failed on {}: {}", self.name, id, connection.url(), e)
                }
            }
        }

        if relays.is_empty() {
            return Err(ClientError::Connection(format!(
                "no relay in pool {} accepted the subscription",
                self.name
            )));
        }

        Ok(PoolSubscription {
            id,
            relays,
            frames: select_all(streams),
        })
    }

    /// Collect stored events matching `filters` from every read relay.
    ///
    /// Stops once each relay sent EOSE or CLOSED or dropped its socket, or
    /// when the query timeout elapses. Events not matching `filters` are
    /// discarded, the rest are deduplicated by id.
    pub async fn query(&self, filters: Vec<Filter>) -> Result<Vec<Event>> {
        let mut subscription = self.subscribe(filters.clone()).await?;
        let id = subscription.id.clone();
        let mut tracker = SubscriptionTracker::new(id.clone());
        for url in subscription.relay_urls() {
            tracker.add_relay(url);
        }

        let deadline = tokio::time::sleep(self.config.query_timeout());
        tokio::pin!(deadline);
        while !tracker.all_finished() {
            tokio::select! {
                frame = subscription.next() => match frame {
                    Some((url, Some(RelayMessage::Event { event, .. }))) => {
                        if filters.is_empty() || filters.iter().any(|filter| filter.matches(&event)) {
                            tracker.add_event(event);
                        } else {
                            debug!("Pool {}: {} sent {} outside query {}", self.name, url, event.id, id);
                        }
                    }
                    Some((url, Some(RelayMessage::Eose { .. } | RelayMessage::Closed { .. }))) => {
                        tracker.mark_finished(&url);
                    }
                    Some((url, None)) => {
                        debug!("Pool {}: {} dropped out of query {}", self.name, url, id);
                        tracker.remove_relay(&url);
                    }
                    Some((_, Some(_))) => {}
                    None => break,
                },
                _ = &mut deadline => {
                    debug!("Pool {}: query {} timed out", self.name, id);
                    break;
                }
            }
        }

        subscription.close().await;
        Ok(tracker.into_events())
    }
}

impl std::fmt::Debug for RelayPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayPool")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

/// A subscription spanning several relays of one pool.
pub struct PoolSubscription {
    pub id: String,
    relays: Vec<Arc<RelayConnection>>,
    frames: SelectAll<BoxStream<'static, (String, Option<RelayMessage>)>>,
}

impl PoolSubscription {
    /// Next frame from any relay, tagged with the relay url. `None` in place
    /// of a frame means that relay's socket closed.
    pub async fn next(&mut self) -> Option<(String, Option<RelayMessage>)> {
        self.frames.next().await
    }

    pub fn relay_urls(&self) -> Vec<String> {
        self.relays.iter().map(|relay| relay.url().to_string()).collect()
    }

    /// Send CLOSE to every relay still connected.
    pub async fn close(self) {
        for relay in &self.relays {
            if let Err(e) = relay.close_subscription(&self.id).await {
                debug!("Could not close {} on {}: {}", self.id, relay.url(), e);
            }
        }
    }
}
