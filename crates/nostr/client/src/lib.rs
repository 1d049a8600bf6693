//! Nostr relay client.
//!
//! This crate provides:
//! - WebSocket connections to single relays (NIP-01 wire frames)
//! - Named relay pools with hot-swappable membership and first-success publish
//! - A pool manager that follows the active identity's stored relay list
//! - Tracked background publish jobs
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::stream::{self, BoxStream, StreamExt};
//! use nostr_client::{ManagerConfig, PoolPurpose, RelayListStore, RelayPoolManager, StoredRelay};
//! use nostr_core::RelayDescriptor;
//! use std::sync::Arc;
//!
//! struct FixedStore;
//!
//! impl RelayListStore for FixedStore {
//!     fn observe_relay_list(&self, _identity: &str) -> BoxStream<'static, Vec<StoredRelay>> {
//!         let relays = vec![StoredRelay::user(RelayDescriptor::read_write("wss://nos.lol"))];
//!         stream::iter([relays]).boxed()
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = RelayPoolManager::new(ManagerConfig::default(), Arc::new(FixedStore)).await;
//!     manager.set_active_identity("npub-hex").await;
//!     manager.ensure_user_relay_pool_connected().await;
//!     println!("{:?}", manager.status(PoolPurpose::User));
//! }
//! ```

mod config;
mod error;
mod jobs;
mod manager;
mod message;
mod pool;
mod relay;
mod subscription;

pub use config::{ManagerConfig, PoolConfig, RelayConfig};
pub use error::{ClientError, Result};
pub use jobs::{JobId, JobProgress, JobRegistry, JobState, ProgressCallback, new_job_id};
pub use manager::{PoolPurpose, RelayKind, RelayListStore, RelayPoolManager, StoredRelay};
pub use message::{ClientMessage, Filter, MessageError, RelayMessage};
pub use pool::{PoolSubscription, RelayPool, RelayStatus, StatusMap};
pub use relay::{ConnectionState, PublishConfirmation, RelayConnection};
pub use subscription::{SubscriptionTracker, generate_subscription_id};

/// Bumped whenever [`FALLBACK_RELAYS`] changes.
pub const FALLBACK_RELAYS_VERSION: u32 = 1;

/// Relays used when the active identity has no relay list.
pub const FALLBACK_RELAYS: &[&str] = &[
    "wss://relay.primal.net",
    "wss://relay.damus.io",
    "wss://nos.lol",
];
