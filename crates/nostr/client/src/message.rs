//! Relay wire frames (NIP-01).
//!
//! Every frame is a JSON array whose first element names the verb.
//! - Client to relay: EVENT, REQ, CLOSE, COUNT, AUTH
//! - Relay to client: EVENT, OK, EOSE, CLOSED, NOTICE, AUTH, COUNT

use nostr_core::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur when parsing relay frames.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// Frames sent from client to relay.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// `["EVENT", <event>]`
    Event(Event),

    /// `["REQ", <subscription_id>, <filter>...]`
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },

    /// `["CLOSE", <subscription_id>]`
    Close { subscription_id: String },

    /// `["COUNT", <subscription_id>, <filter>...]` (NIP-45)
    Count {
        subscription_id: String,
        filters: Vec<Filter>,
    },

    /// `["AUTH", <event>]` (NIP-42)
    Auth(Event),
}

impl ClientMessage {
    /// Serialize to the JSON array sent over the socket.
    pub fn to_json(&self) -> Result<String, MessageError> {
        let value = match self {
            ClientMessage::Event(event) => serde_json::json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filters,
            } => with_filters("REQ", subscription_id, filters)?,
            ClientMessage::Close { subscription_id } => {
                serde_json::json!(["CLOSE", subscription_id])
            }
            ClientMessage::Count {
                subscription_id,
                filters,
            } => with_filters("COUNT", subscription_id, filters)?,
            ClientMessage::Auth(event) => serde_json::json!(["AUTH", event]),
        };
        Ok(value.to_string())
    }
}

fn with_filters(verb: &str, subscription_id: &str, filters: &[Filter]) -> Result<Value, MessageError> {
    let mut frame = vec![
        Value::String(verb.to_string()),
        Value::String(subscription_id.to_string()),
    ];
    for filter in filters {
        frame.push(serde_json::to_value(filter)?);
    }
    Ok(Value::Array(frame))
}

/// Frames received from a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event {
        subscription_id: String,
        event: Event,
    },

    /// `["OK", <event_id>, <accepted>, <message>]`
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },

    /// `["EOSE", <subscription_id>]`
    Eose { subscription_id: String },

    /// `["CLOSED", <subscription_id>, <message>]`
    Closed {
        subscription_id: String,
        message: String,
    },

    /// `["NOTICE", <message>]`
    Notice { message: String },

    /// `["AUTH", <challenge>]`
    Auth { challenge: String },

    /// `["COUNT", <subscription_id>, {"count": <n>}]`
    Count { subscription_id: String, count: u64 },
}

impl RelayMessage {
    /// Parse a text frame.
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let frame: Vec<Value> =
            serde_json::from_str(json).map_err(|e| MessageError::InvalidFormat(e.to_string()))?;

        let verb = frame
            .first()
            .ok_or_else(|| MessageError::InvalidFormat("empty array".to_string()))?
            .as_str()
            .ok_or_else(|| MessageError::InvalidFormat("first element not a string".to_string()))?;

        match verb {
            "EVENT" => {
                let subscription_id = str_at(&frame, 1, "subscription_id")?;
                let raw = frame.get(2).ok_or(MessageError::MissingField("event"))?;
                let event: Event = serde_json::from_value(raw.clone())?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            "OK" => {
                let event_id = str_at(&frame, 1, "event_id")?;
                let accepted = frame
                    .get(2)
                    .ok_or(MessageError::MissingField("accepted"))?
                    .as_bool()
                    .ok_or_else(|| MessageError::InvalidFormat("accepted not a boolean".to_string()))?;
                Ok(RelayMessage::Ok {
                    event_id,
                    accepted,
                    message: optional_str_at(&frame, 3),
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: str_at(&frame, 1, "subscription_id")?,
            }),
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: str_at(&frame, 1, "subscription_id")?,
                message: optional_str_at(&frame, 2),
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: str_at(&frame, 1, "message")?,
            }),
            "AUTH" => Ok(RelayMessage::Auth {
                challenge: str_at(&frame, 1, "challenge")?,
            }),
            "COUNT" => {
                let subscription_id = str_at(&frame, 1, "subscription_id")?;
                let count = frame
                    .get(2)
                    .and_then(|v| v.get("count"))
                    .and_then(Value::as_u64)
                    .ok_or(MessageError::MissingField("count"))?;
                Ok(RelayMessage::Count {
                    subscription_id,
                    count,
                })
            }
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }

    /// Subscription the frame belongs to, for EVENT/EOSE/CLOSED/COUNT.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            RelayMessage::Event {
                subscription_id, ..
            }
            | RelayMessage::Eose { subscription_id }
            | RelayMessage::Closed {
                subscription_id, ..
            }
            | RelayMessage::Count {
                subscription_id, ..
            } => Some(subscription_id),
            _ => None,
        }
    }

    /// Event acknowledged by an OK frame.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            RelayMessage::Ok { event_id, .. } => Some(event_id),
            _ => None,
        }
    }

    /// Frames a subscription consumer should see: its own frames and every NOTICE.
    pub fn matches_subscription(&self, id: &str) -> bool {
        matches!(self, RelayMessage::Notice { .. }) || self.subscription_id() == Some(id)
    }

    /// Frames a publisher waiting on `id` should see: its OK and every NOTICE.
    pub fn matches_event(&self, id: &str) -> bool {
        matches!(self, RelayMessage::Notice { .. }) || self.event_id() == Some(id)
    }
}

fn str_at(frame: &[Value], index: usize, field: &'static str) -> Result<String, MessageError> {
    frame
        .get(index)
        .ok_or(MessageError::MissingField(field))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MessageError::InvalidFormat(format!("{} not a string", field)))
}

fn optional_str_at(frame: &[Value], index: usize) -> String {
    frame
        .get(index)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Filter for REQ and COUNT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Tag queries keyed `#<letter>`
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a tag query. `letter` is the tag name without `#`.
    pub fn tag(mut self, letter: impl Into<String>, values: Vec<String>) -> Self {
        self.tags.insert(format!("#{}", letter.into()), values);
        self
    }

    pub fn event_refs(self, event_ids: Vec<String>) -> Self {
        self.tag("e", event_ids)
    }

    pub fn pubkey_refs(self, pubkeys: Vec<String>) -> Self {
        self.tag("p", pubkeys)
    }

    /// Whether `event` satisfies every condition of this filter.
    pub fn matches(&self, event: &Event) -> bool {
        fn within<T: PartialEq>(allowed: &Option<Vec<T>>, value: &T) -> bool {
            allowed.as_ref().is_none_or(|list| list.contains(value))
        }

        within(&self.ids, &event.id)
            && within(&self.authors, &event.pubkey)
            && within(&self.kinds, &event.kind)
            && self.since.is_none_or(|since| event.created_at >= since)
            && self.until.is_none_or(|until| event.created_at <= until)
            && self.tags.iter().all(|(key, values)| {
                let name = key.trim_start_matches('#');
                event
                    .tag_values(name)
                    .any(|value| values.iter().any(|v| v == value))
            })
    }
}
