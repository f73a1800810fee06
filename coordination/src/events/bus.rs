//! Broadcast bus for decision and session events
//!
//! Publishing never fails for lack of subscribers. A slow subscriber that
//! falls more than [`CHANNEL_CAPACITY`] events behind skips the missed ones.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::CoordinationEvent;

pub const CHANNEL_CAPACITY: usize = 256;

pub type SharedEventBus = Arc<EventBus>;

pub struct EventBus {
    sender: broadcast::Sender<CoordinationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    pub fn publish(&self, event: CoordinationEvent) {
        let event_type = event.event_type();
        let receivers = self.sender.send(event).unwrap_or(0);
        debug!(event_type, receivers, "Event published");
    }

    /// Every event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinationEvent> {
        self.sender.subscribe()
    }

    /// Only events accepted by `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver {
            receiver: self.subscribe(),
            filter,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Which events a filtered subscriber sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Everything published about one coordination session
    Session(String),
    /// Events whose [`CoordinationEvent::event_type`] is listed
    Kinds(Vec<&'static str>),
}

impl EventFilter {
    pub fn matches(&self, event: &CoordinationEvent) -> bool {
        match self {
            EventFilter::Session(id) => event.session_id() == Some(id.as_str()),
            EventFilter::Kinds(kinds) => kinds.contains(&event.event_type()),
        }
    }
}

pub struct FilteredReceiver {
    receiver: broadcast::Receiver<CoordinationEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Next matching event, or `None` once the bus is gone
    pub async fn recv(&mut self) -> Option<CoordinationEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, filter = ?self.filter, "Filtered subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
