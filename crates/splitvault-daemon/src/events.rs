//! Live notifications for `subscribe_events` connections.
//!
//! Every committed ledger event (plus a few daemon lifecycle notices) is
//! stamped with a bus-wide sequence number and fanned out over a bounded
//! broadcast channel. A subscriber that falls more than the channel capacity
//! behind loses the oldest notifications and can spot the gap in `seq`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use splitvault_types::{LedgerEvent, SplitId};
use tokio::sync::broadcast;

/// One notification as delivered to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Position on the bus, starting at 1. Zero until emitted.
    pub seq: u64,
    /// `deposit`, `schedule_reserved`, `daemon_started`, ...
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_id: Option<SplitId>,
    pub timestamp: u64,
    pub payload: Value,
}

impl Event {
    pub fn ledger(event: &LedgerEvent, timestamp: u64) -> Self {
        Self {
            seq: 0,
            event_type: event.name().to_string(),
            split_id: Some(*event.split_id()),
            timestamp,
            payload: serde_json::to_value(event).unwrap_or(Value::Null),
        }
    }

    /// A daemon notice not tied to any split.
    pub fn daemon(event_type: &str, payload: Value) -> Self {
        Self {
            seq: 0,
            event_type: event_type.to_string(),
            split_id: None,
            timestamp: now_secs(),
            payload,
        }
    }
}

/// Subscription filter; an absent list matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub event_types: Option<Vec<String>>,
    #[serde(default)]
    pub split_ids: Option<Vec<SplitId>>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        let type_ok = self
            .event_types
            .as_ref()
            .map_or(true, |types| types.iter().any(|t| *t == event.event_type));
        let split_ok = match (&self.split_ids, &event.split_id) {
            (None, _) => true,
            (Some(wanted), Some(id)) => wanted.contains(id),
            (Some(_), None) => false,
        };
        type_ok && split_ok
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    last_seq: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            last_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stamp `event` with the next sequence number and broadcast it.
    /// Returns the assigned number; having no subscribers is not an error.
    pub fn emit(&self, mut event: Event) -> u64 {
        event.seq = self.last_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let seq = event.seq;
        let _ = self.sender.send(event);
        seq
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of notifications emitted since startup.
    pub fn sequence(&self) -> u64 {
        self.last_seq.load(Ordering::SeqCst)
    }
}

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
