// Daemon event bus (spec.md §4.13), grounded on the teacher's
// `MCPServerHandle` shutdown-channel idiom — a broadcast channel every
// subsystem can publish to and every interested listener (HTTP SSE,
// logging, tests) can subscribe to independently.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::types::{ConnectorStatus, ValidatedInstanceId, ValidatedSourceId};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SyncStarted { source_id: ValidatedSourceId },
    SyncProgress { source_id: ValidatedSourceId, processed: usize, total: usize },
    SyncCompleted { source_id: ValidatedSourceId, added: usize, updated: usize, deleted: usize, errors: usize },
    InstanceTransitioned { instance_id: ValidatedInstanceId, from: ConnectorStatus, to: ConnectorStatus },
    InstanceHealthChanged { instance_id: ValidatedInstanceId, healthy: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub at: DateTime<Utc>,
    pub event: Event,
}

/// Cloneable handle around a broadcast sender; publishing never blocks and
/// never fails the caller when there are no subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        let envelope = Envelope { at: Utc::now(), event };
        // A send error only means there are currently no subscribers.
        let _ = self.sender.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
