//! WebSocket subscription management.
//!
//! Tracks active `*Subscribe` subscriptions and routes notifications to their
//! receivers. After a reconnect every entry is detached from its stale node
//! id and attached again only once the node has assigned a new one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

/// Subscription id assigned by the node. Solana nodes hand out integers,
/// other nodes hex strings; both are kept in their textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    /// Read an id from a subscribe result or a notification's `subscription` field.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self(n.to_string())),
            Value::String(s) => Some(Self(s.clone())),
            _ => None,
        }
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What is needed to open the same subscription again.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
    /// Subscribe method, e.g. `"logsSubscribe"`.
    pub method: String,
    pub params: Value,
}

impl SubscriptionRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// A subscription's request and the sending half of its feed.
///
/// Dropping an entry ends the feed.
pub(crate) struct SubscriptionEntry {
    pub(crate) request: SubscriptionRequest,
    sender: mpsc::UnboundedSender<Value>,
}

impl SubscriptionEntry {
    /// The consumer dropped its receiver.
    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Shared registry of live subscriptions.
#[derive(Clone, Default)]
pub struct SubscriptionManager {
    entries: Arc<Mutex<HashMap<SubscriptionId, SubscriptionEntry>>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscription and return the receiving end of its feed.
    pub fn register(
        &self,
        id: SubscriptionId,
        request: SubscriptionRequest,
    ) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        let entry = SubscriptionEntry { request, sender: tx };
        if self.attach(id.clone(), entry).is_some() {
            tracing::warn!(subscription = %id, "node reused a live subscription id, older feed ended");
        }
        rx
    }

    /// Forward a notification payload. Subscriptions whose receiver is gone
    /// are dropped; returns whether the payload was delivered.
    pub fn dispatch(&self, id: &SubscriptionId, message: Value) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get(id) else {
            tracing::debug!(subscription = %id, "notification for unknown subscription");
            return false;
        };
        if entry.sender.send(message).is_err() {
            tracing::debug!(subscription = %id, "subscriber gone, dropping subscription");
            entries.remove(id);
            return false;
        }
        true
    }

    /// Take every live entry out of the id-keyed map.
    ///
    /// Ids are scoped to one connection, so after a reconnect none of them
    /// is valid. Entries whose receiver is gone are dropped here.
    pub(crate) fn detach_all(&self) -> Vec<SubscriptionEntry> {
        self.entries
            .lock()
            .unwrap()
            .drain()
            .map(|(_, entry)| entry)
            .filter(|entry| !entry.is_closed())
            .collect()
    }

    /// Put a detached entry back under the id the node just assigned.
    ///
    /// Returns the entry previously registered under `id`, if any. The node
    /// handing out one id twice is a protocol violation; the displaced feed
    /// is ended by dropping it.
    pub(crate) fn attach(
        &self,
        id: SubscriptionId,
        entry: SubscriptionEntry,
    ) -> Option<SubscriptionEntry> {
        self.entries.lock().unwrap().insert(id, entry)
    }

    /// Drop every subscription, ending all feeds.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
