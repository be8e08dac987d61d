//! Messages exchanged over the [`Environment`](crate::environment::Environment) bus.
//!
//! An [`AgentMessage`] is created by a worker or the coordinator, published once, and never
//! mutated afterwards (the bus stamps `sent_from` on the copy it routes). Recipients are either
//! the broadcast marker or a non-empty set of worker ids; [`Recipients`] makes the empty set
//! unrepresentable.
//!
//! # Examples
//!
//! ```
//! use expertmesh::message::{AgentMessage, CauseBy, Recipients};
//! use expertmesh::Role;
//!
//! let msg = AgentMessage::new("hi", Role::User, CauseBy::DirectCommunication, Recipients::one("B"))
//!     .with_metadata("channel", "demo");
//! assert!(msg.send_to.contains("B"));
//! assert!(!msg.send_to.is_broadcast());
//! assert_eq!(msg.metadata["channel"], "demo");
//! ```

use crate::client_wrapper::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Reserved recipient meaning "every registered worker except the sender".
pub const BROADCAST_MARKER: &str = "<all>";

/// Well-known metadata keys.
pub const META_TOKENS: &str = "tokens";
pub const META_RESPONSE_TIME_MS: &str = "response_time_ms";
pub const META_REPLY_TO: &str = "reply_to";

/// The event type that triggered a message.
///
/// Interest matching compares these tags, so a typo in a free-form string would silently
/// drop messages; `Other` keeps the set open without making that mistake easy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CauseBy {
    UserRequirement,
    TaskAssignment,
    AgentResponse,
    Broadcast,
    DirectCommunication,
    Error,
    Other(String),
}

impl CauseBy {
    pub fn as_str(&self) -> &str {
        match self {
            CauseBy::UserRequirement => "UserRequirement",
            CauseBy::TaskAssignment => "TaskAssignment",
            CauseBy::AgentResponse => "AgentResponse",
            CauseBy::Broadcast => "Broadcast",
            CauseBy::DirectCommunication => "DirectCommunication",
            CauseBy::Error => "Error",
            CauseBy::Other(tag) => tag,
        }
    }
}

impl From<&str> for CauseBy {
    fn from(tag: &str) -> Self {
        match tag {
            "UserRequirement" => CauseBy::UserRequirement,
            "TaskAssignment" => CauseBy::TaskAssignment,
            "AgentResponse" => CauseBy::AgentResponse,
            "Broadcast" => CauseBy::Broadcast,
            "DirectCommunication" => CauseBy::DirectCommunication,
            "Error" => CauseBy::Error,
            other => CauseBy::Other(other.to_string()),
        }
    }
}

impl From<String> for CauseBy {
    fn from(tag: String) -> Self {
        CauseBy::from(tag.as_str())
    }
}

impl From<CauseBy> for String {
    fn from(cause: CauseBy) -> Self {
        cause.as_str().to_string()
    }
}

impl fmt::Display for CauseBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Broadcast,
    Direct(BTreeSet<String>),
}

/// Who a message is addressed to. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub struct Recipients(Target);

impl Recipients {
    pub fn broadcast() -> Self {
        Recipients(Target::Broadcast)
    }

    pub fn one(id: impl Into<String>) -> Self {
        let mut ids = BTreeSet::new();
        ids.insert(id.into());
        Recipients(Target::Direct(ids))
    }

    /// Address several ids at once. Returns `None` for an empty set. An id equal to
    /// [`BROADCAST_MARKER`] turns the whole set into a broadcast.
    pub fn many<I, S>(ids: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        if ids.contains(BROADCAST_MARKER) {
            return Some(Self::broadcast());
        }
        if ids.is_empty() {
            None
        } else {
            Some(Recipients(Target::Direct(ids)))
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self.0, Target::Broadcast)
    }

    /// Whether `id` is named explicitly. A broadcast names nobody.
    pub fn contains(&self, id: &str) -> bool {
        match &self.0 {
            Target::Broadcast => false,
            Target::Direct(ids) => ids.contains(id),
        }
    }

    /// Explicit recipient ids in sorted order; empty for a broadcast.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        let ids = match &self.0 {
            Target::Broadcast => None,
            Target::Direct(ids) => Some(ids.iter().map(String::as_str)),
        };
        ids.into_iter().flatten()
    }
}

impl fmt::Display for Recipients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Target::Broadcast => f.write_str(BROADCAST_MARKER),
            Target::Direct(ids) => {
                let joined: Vec<&str> = ids.iter().map(String::as_str).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

impl From<Recipients> for Vec<String> {
    fn from(recipients: Recipients) -> Self {
        match recipients.0 {
            Target::Broadcast => vec![BROADCAST_MARKER.to_string()],
            Target::Direct(ids) => ids.into_iter().collect(),
        }
    }
}

impl TryFrom<Vec<String>> for Recipients {
    type Error = String;

    fn try_from(ids: Vec<String>) -> Result<Self, Self::Error> {
        Recipients::many(ids).ok_or_else(|| "recipient set must not be empty".to_string())
    }
}

/// The unit of communication between workers and the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub cause_by: CauseBy,
    /// Overwritten by the bus at publish time.
    pub sent_from: String,
    pub send_to: Recipients,
    /// Open key/value bag. See the `META_*` constants for the keys the crate itself writes.
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    /// Create an unpublished message with a fresh id and the current time.
    pub fn new(
        content: impl Into<String>,
        role: Role,
        cause_by: CauseBy,
        send_to: Recipients,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            role,
            cause_by,
            sent_from: String::new(),
            send_to,
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a key-value metadata pair to this message (builder pattern).
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Token cost recorded by the worker that produced this message.
    pub fn tokens(&self) -> usize {
        self.metadata
            .get(META_TOKENS)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as usize
    }

    pub fn response_time(&self) -> Option<Duration> {
        self.metadata
            .get(META_RESPONSE_TIME_MS)
            .and_then(serde_json::Value::as_u64)
            .map(Duration::from_millis)
    }

    /// Id of the message this one answers.
    pub fn reply_to(&self) -> Option<&str> {
        self.metadata
            .get(META_REPLY_TO)
            .and_then(serde_json::Value::as_str)
    }

    /// First `max_chars` characters of the content, for log lines.
    pub fn preview(&self, max_chars: usize) -> String {
        preview(&self.content, max_chars)
    }
}

/// First `max_chars` characters of `text`, with `...` appended when truncated.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
