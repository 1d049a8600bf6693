//! In-process relay for integration tests.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use nostr_core::Event;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

struct Behavior {
    accept: bool,
    reason: String,
    stored: Vec<Event>,
    /// Close the socket instead of answering REQ
    drop_on_req: bool,
    /// Sent as an AUTH frame right after the handshake
    challenge: Option<String>,
    connections: AtomicUsize,
    published: Mutex<Vec<String>>,
}

/// A relay answering EVENT and AUTH with a fixed OK verdict, REQ with stored
/// events and COUNT with the number of stored events. Filters are ignored.
pub struct MockRelay {
    pub url: String,
    behavior: Arc<Behavior>,
    task: JoinHandle<()>,
}

impl MockRelay {
    pub async fn accepting() -> Self {
        Self::start(Behavior::new(true, "", vec![])).await
    }

    pub async fn rejecting(reason: &str) -> Self {
        Self::start(Behavior::new(false, reason, vec![])).await
    }

    pub async fn with_events(stored: Vec<Event>) -> Self {
        Self::start(Behavior::new(true, "", stored)).await
    }

    /// Closes the socket as soon as a REQ arrives.
    pub async fn dropping_on_req() -> Self {
        Self::start(Behavior {
            drop_on_req: true,
            ..Behavior::new(true, "", vec![])
        })
        .await
    }

    /// Sends `challenge` in an AUTH frame on every new connection.
    pub async fn with_challenge(challenge: &str) -> Self {
        Self::start(Behavior {
            challenge: Some(challenge.to_string()),
            ..Behavior::new(true, "", vec![])
        })
        .await
    }

    async fn start(behavior: Behavior) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let behavior = Arc::new(behavior);

        let shared = Arc::clone(&behavior);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(socket) = accept_async(stream).await else {
                    continue;
                };
                shared.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(socket, Arc::clone(&shared)));
            }
        });

        Self {
            url,
            behavior,
            task,
        }
    }

    /// WebSocket handshakes accepted so far.
    pub fn connections(&self) -> usize {
        self.behavior.connections.load(Ordering::SeqCst)
    }

    /// Ids of the events received through EVENT frames.
    pub fn published(&self) -> Vec<String> {
        self.behavior.published.lock().unwrap().clone()
    }
}

impl Behavior {
    fn new(accept: bool, reason: &str, stored: Vec<Event>) -> Self {
        Self {
            accept,
            reason: reason.to_string(),
            stored,
            drop_on_req: false,
            challenge: None,
            connections: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        }
    }
}

impl Drop for MockRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut socket: WebSocketStream<TcpStream>, behavior: Arc<Behavior>) {
    if let Some(challenge) = &behavior.challenge {
        let frame = json!(["AUTH", challenge]).to_string();
        if socket.send(Message::text(frame)).await.is_err() {
            return;
        }
    }

    while let Some(Ok(message)) = socket.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };

        let replies = match frame[0].as_str() {
            Some("EVENT") => {
                let id = frame[1]["id"].as_str().unwrap_or_default().to_string();
                behavior.published.lock().unwrap().push(id.clone());
                vec![json!(["OK", id, behavior.accept, behavior.reason])]
            }
            Some("AUTH") => {
                let id = frame[1]["id"].as_str().unwrap_or_default();
                vec![json!(["OK", id, behavior.accept, behavior.reason])]
            }
            Some("COUNT") => {
                vec![json!(["COUNT", frame[1], {"count": behavior.stored.len()}])]
            }
            Some("REQ") if behavior.drop_on_req => {
                let _ = socket.close(None).await;
                return;
            }
            Some("REQ") => {
                let subscription_id = frame[1].clone();
                let mut replies: Vec<Value> = behavior
                    .stored
                    .iter()
                    .map(|event| json!(["EVENT", subscription_id, event]))
                    .collect();
                replies.push(json!(["EOSE", subscription_id]));
                replies
            }
            _ => vec![],
        };

        for reply in replies {
            if socket.send(Message::text(reply.to_string())).await.is_err() {
                return;
            }
        }
    }
}

pub fn text_note(id: &str, content: &str) -> Event {
    Event {
        id: id.to_string(),
        pubkey: "f".repeat(64),
        created_at: 1_700_000_000,
        kind: 1,
        tags: vec![],
        content: content.to_string(),
        sig: "0".repeat(128),
    }
}
