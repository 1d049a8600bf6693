//! Single relay connection.
//!
//! A [`RelayConnection`] owns one WebSocket to one relay. A background task
//! reads frames and fans every parsed frame out to subscription streams and
//! to callers waiting on an OK or COUNT answer. Transport failures move the connection back to
//! [`ConnectionState::Disconnected`]; reconnecting is left to the owner.

use crate::config::RelayConfig;
use crate::error::{ClientError, Result};
use crate::message::{ClientMessage, Filter, RelayMessage};
use futures::stream::{self, BoxStream, SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use nostr_core::Event;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A relay's answer to a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfirmation {
    pub relay_url: String,
    pub event_id: String,
    pub accepted: bool,
    /// Reason given by the relay, usually empty on acceptance
    pub message: String,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One live socket. Replaced on every successful connect.
struct Session {
    epoch: u64,
    writer: SplitSink<WsStream, Message>,
    incoming: broadcast::Sender<RelayMessage>,
    task: JoinHandle<()>,
}

/// State shared with the read task.
struct Shared {
    url: String,
    state: watch::Sender<ConnectionState>,
    failed: AtomicBool,
    session: Mutex<Option<Session>>,
    /// Latest NIP-42 challenge of the current session
    challenge: watch::Sender<Option<String>>,
}

impl Shared {
    fn dispatch(&self, text: &str, incoming: &broadcast::Sender<RelayMessage>) {
        let message = match RelayMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring malformed frame from {}: {}", self.url, e);
                return;
            }
        };

        match &message {
            RelayMessage::Notice { message: notice } => info!("Notice from {}: {}", self.url, notice),
            RelayMessage::Auth { challenge } => {
                debug!("Auth challenge from {}", self.url);
                self.challenge.send_replace(Some(challenge.clone()));
            }
            _ => {}
        }

        // No receivers is fine: nobody is subscribed right now.
        let _ = incoming.send(message);
    }

    /// Tear down the session started at `epoch`, unless a newer one replaced it.
    async fn end_session(&self, epoch: u64) {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| s.epoch == epoch) {
            session.take();
            self.challenge.send_replace(None);
            self.state.send_replace(ConnectionState::Disconnected);
            info!("Disconnected from relay: {}", self.url);
        }
    }
}

async fn read_loop(
    shared: Arc<Shared>,
    epoch: u64,
    mut reader: SplitStream<WsStream>,
    incoming: broadcast::Sender<RelayMessage>,
) {
    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Message::Text(text)) => shared.dispatch(text.as_str(), &incoming),
            Ok(Message::Close(_)) => {
                info!("Relay {} closed connection", shared.url);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error from {}: {}", shared.url, e);
                shared.failed.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
    shared.end_session(epoch).await;
}

/// Check that `url` parses and uses the ws or wss scheme.
pub(crate) fn validate_relay_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url)?;
    if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
        return Err(ClientError::InvalidUrl(format!(
            "URL must use ws:// or wss:// scheme, got: {}",
            parsed.scheme()
        )));
    }
    Ok(())
}

/// Connection to a single relay.
pub struct RelayConnection {
    shared: Arc<Shared>,
    config: RelayConfig,
    connect_lock: Mutex<()>,
    epochs: AtomicU64,
}

impl RelayConnection {
    /// Create a connection to `url` with default settings. Does not connect.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, RelayConfig::default())
    }

    pub fn with_config(url: &str, config: RelayConfig) -> Result<Self> {
        validate_relay_url(url)?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            shared: Arc::new(Shared {
                url: url.to_string(),
                state,
                failed: AtomicBool::new(false),
                session: Mutex::new(None),
                challenge: watch::channel(None).0,
            }),
            config,
            connect_lock: Mutex::new(()),
            epochs: AtomicU64::new(0),
        })
    }

    /// The url as given at construction.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether the last connection attempt or session ended with an error.
    pub fn has_failed(&self) -> bool {
        self.shared.failed.load(Ordering::SeqCst)
    }

    /// Challenge from the relay's last AUTH frame on the current session.
    pub fn auth_challenge(&self) -> Option<String> {
        self.shared.challenge.borrow().clone()
    }

    /// Open the socket. Returns immediately when already connected.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        self.shared.failed.store(false, Ordering::SeqCst);
        self.shared.state.send_replace(ConnectionState::Connecting);
        info!("Connecting to relay: {}", self.url());

        let stream = match timeout(self.config.connect_timeout(), connect_async(self.url())).await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => return Err(self.connect_failed(ClientError::WebSocket(e.to_string()))),
            Err(_) => {
                return Err(self.connect_failed(ClientError::Timeout(format!(
                    "Connection timeout after {:?}",
                    self.config.connect_timeout()
                ))));
            }
        };

        let (writer, reader) = stream.split();
        let (incoming, _) = broadcast::channel(self.config.message_buffer.max(1));
        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;

        // The read task cannot end the session before it is stored.
        let mut session = self.shared.session.lock().await;
        let task = tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            epoch,
            reader,
            incoming.clone(),
        ));
        *session = Some(Session {
            epoch,
            writer,
            incoming,
            task,
        });
        self.shared.state.send_replace(ConnectionState::Connected);
        drop(session);

        info!("Connected to relay: {}", self.url());
        Ok(())
    }

    fn connect_failed(&self, err: ClientError) -> ClientError {
        warn!("Failed to connect to {}: {}", self.url(), err);
        self.shared.failed.store(true, Ordering::SeqCst);
        self.shared.state.send_replace(ConnectionState::Disconnected);
        err
    }

    /// Send one frame.
    pub async fn send(&self, message: &ClientMessage) -> Result<()> {
        let json = message.to_json()?;
        let mut session = self.shared.session.lock().await;
        let session = session.as_mut().ok_or(ClientError::NotConnected)?;
        session.writer.send(Message::text(json)).await?;
        Ok(())
    }

    /// Send a REQ and stream back the frames for it.
    ///
    /// The stream yields the subscription's EVENT, EOSE, CLOSED and COUNT
    /// frames plus every NOTICE, and ends when the socket closes.
    pub async fn subscribe(
        &self,
        subscription_id: &str,
        filters: Vec<Filter>,
    ) -> Result<BoxStream<'static, RelayMessage>> {
        let receiver = self.incoming().await?;
        self.send(&ClientMessage::Req {
            subscription_id: subscription_id.to_string(),
            filters,
        })
        .await?;
        debug!("Opened subscription {} on {}", subscription_id, self.url());

        Ok(subscription_stream(receiver, subscription_id.to_string()))
    }

    /// Receiver for every frame of the current session.
    async fn incoming(&self) -> Result<broadcast::Receiver<RelayMessage>> {
        let session = self.shared.session.lock().await;
        Ok(session
            .as_ref()
            .ok_or(ClientError::NotConnected)?
            .incoming
            .subscribe())
    }

    pub async fn close_subscription(&self, subscription_id: &str) -> Result<()> {
        self.send(&ClientMessage::Close {
            subscription_id: subscription_id.to_string(),
        })
        .await
    }

    /// Send an event and wait for the relay's OK.
    pub async fn publish_event(
        &self,
        event: &Event,
        confirmation_timeout: Duration,
    ) -> Result<PublishConfirmation> {
        self.send_and_confirm(ClientMessage::Event(event.clone()), &event.id, confirmation_timeout)
            .await
    }

    /// Answer the relay's AUTH challenge with a signed kind-22242 event (NIP-42).
    pub async fn authenticate(
        &self,
        auth_event: &Event,
        confirmation_timeout: Duration,
    ) -> Result<PublishConfirmation> {
        self.send_and_confirm(
            ClientMessage::Auth(auth_event.clone()),
            &auth_event.id,
            confirmation_timeout,
        )
        .await
    }

    async fn send_and_confirm(
        &self,
        message: ClientMessage,
        event_id: &str,
        confirmation_timeout: Duration,
    ) -> Result<PublishConfirmation> {
        // Subscribe before sending so a fast OK is not missed.
        let receiver = self.incoming().await?;
        self.send(&message).await?;

        match timeout(confirmation_timeout, wait_for_ok(receiver, event_id)).await {
            Ok(Some((accepted, message))) => Ok(PublishConfirmation {
                relay_url: self.url().to_string(),
                event_id: event_id.to_string(),
                accepted,
                message,
            }),
            Ok(None) => Err(ClientError::Connection(format!(
                "{} disconnected before acknowledging {}",
                self.url(),
                event_id
            ))),
            Err(_) => Err(ClientError::Timeout(format!(
                "Event confirmation timeout after {:?}",
                confirmation_timeout
            ))),
        }
    }

    /// Ask the relay how many events match `filters` (NIP-45).
    pub async fn count(
        &self,
        subscription_id: &str,
        filters: Vec<Filter>,
        reply_timeout: Duration,
    ) -> Result<u64> {
        let mut frames = subscription_stream(self.incoming().await?, subscription_id.to_string());
        self.send(&ClientMessage::Count {
            subscription_id: subscription_id.to_string(),
            filters,
        })
        .await?;

        let reply = timeout(reply_timeout, async {
            while let Some(frame) = frames.next().await {
                match frame {
                    RelayMessage::Count { count, .. } => return Ok(count),
                    RelayMessage::Closed { message, .. } => {
                        return Err(ClientError::Protocol(format!(
                            "{} refused count {}: {}",
                            self.url(),
                            subscription_id,
                            message
                        )));
                    }
                    _ => {}
                }
            }
            Err(ClientError::Connection(format!(
                "{} disconnected before answering count {}",
                self.url(),
                subscription_id
            )))
        })
        .await;

        reply.unwrap_or_else(|_| {
            Err(ClientError::Timeout(format!(
                "Count reply timeout after {:?}",
                reply_timeout
            )))
        })
    }

    /// Close the socket. The connection can be reopened with [`connect`](Self::connect).
    pub async fn close(&self) {
        let session = self.shared.session.lock().await.take();
        let Some(mut session) = session else {
            return;
        };

        info!("Disconnecting from relay: {}", self.url());
        session.task.abort();
        let _ = session.writer.close().await;
        self.shared.challenge.send_replace(None);
        self.shared.state.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        if let Ok(mut session) = self.shared.session.try_lock()
            && let Some(live) = session.take()
        {
            live.task.abort();
        }
    }
}

impl std::fmt::Debug for RelayConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConnection")
            .field("url", &self.url())
            .field("state", &self.state())
            .finish()
    }
}

/// Wait for the OK answering `event_id`. `None` when the session ends first.
async fn wait_for_ok(
    mut receiver: broadcast::Receiver<RelayMessage>,
    event_id: &str,
) -> Option<(bool, String)> {
    loop {
        match receiver.recv().await {
            Ok(frame) if frame.matches_event(event_id) => match frame {
                RelayMessage::Ok {
                    accepted, message, ..
                } => return Some((accepted, message)),
                other => debug!("Frame while waiting for OK {}: {:?}", event_id, other),
            },
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!("OK wait for {} lagged, {} frames dropped", event_id, skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

fn subscription_stream(
    receiver: broadcast::Receiver<RelayMessage>,
    subscription_id: String,
) -> BoxStream<'static, RelayMessage> {
    stream::unfold((receiver, subscription_id), |(mut receiver, id)| async move {
        loop {
            match receiver.recv().await {
                Ok(message) if message.matches_subscription(&id) => {
                    return Some((message, (receiver, id)));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscription {} lagged, {} frames dropped", id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        assert!(RelayConnection::new("wss://relay.damus.io").is_ok());
        assert!(RelayConnection::new("ws://127.0.0.1:7000").is_ok());
        assert!(matches!(
            RelayConnection::new("https://relay.damus.io"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            RelayConnection::new("not a url"),
            Err(ClientError::UrlParse(_))
        ));
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let relay = RelayConnection::new("wss://relay.example").unwrap();
        assert_eq!(relay.state(), ConnectionState::Disconnected);
        assert!(!relay.has_failed());

        let err = relay
            .send(&ClientMessage::Close {
                subscription_id: "s".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));

        assert!(matches!(
            relay.subscribe("s", vec![Filter::new()]).await,
            Err(ClientError::NotConnected)
        ));

        // closing a closed connection is a no-op
        relay.close().await;
        assert_eq!(relay.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_marks_failed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let relay = RelayConnection::new(&format!("ws://127.0.0.1:{}", port)).unwrap();
        let mut states = relay.watch_state();
        assert!(relay.connect().await.is_err());
        assert!(relay.has_failed());
        assert_eq!(relay.state(), ConnectionState::Disconnected);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let relay = RelayConnection::new("wss://relay.example").unwrap();
        let event = Event {
            id: "e".repeat(64),
            pubkey: "p".repeat(64),
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: "hi".to_string(),
            sig: String::new(),
        };
        let err = relay
            .publish_event(&event, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }
}
