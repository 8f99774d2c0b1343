//! Event sinks the user service publishes into.

use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::{PublishError, UserEvent};

/// Destination for domain events. Delivery is attempted at most once;
/// callers log failures and carry on.
#[cfg_attr(test, mockall::automock)]
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: UserEvent) -> Result<(), PublishError>;

    /// Publish in order, stopping at the first failure.
    fn publish_batch(&self, events: Vec<UserEvent>) -> Result<(), PublishError> {
        for event in events {
            self.publish(event)?;
        }
        Ok(())
    }
}

/// Collects events in memory. Unbounded, so only suitable for tests and
/// local tooling.
#[derive(Debug, Default)]
pub struct InMemoryEventPublisher {
    events: Mutex<Vec<UserEvent>>,
}

impl InMemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UserEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventPublisher for InMemoryEventPublisher {
    fn publish(&self, event: UserEvent) -> Result<(), PublishError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }

    fn publish_batch(&self, events: Vec<UserEvent>) -> Result<(), PublishError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(events);
        Ok(())
    }
}

/// Bounded queue publisher. A full queue rejects the event instead of
/// growing, which pushes back on producers through a logged failure.
#[derive(Debug, Clone)]
pub struct ChannelEventPublisher {
    sender: mpsc::Sender<UserEvent>,
}

impl ChannelEventPublisher {
    /// Create a publisher and the receiver that drains it.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<UserEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn remaining_capacity(&self) -> usize {
        self.sender.capacity()
    }
}

impl EventPublisher for ChannelEventPublisher {
    fn publish(&self, event: UserEvent) -> Result<(), PublishError> {
        let event_type = event.event_type;
        match self.sender.try_send(event) {
            Ok(()) => {
                debug!(%event_type, "event queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%event_type, "event queue full, dropping event");
                Err(PublishError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PublishError::Closed),
        }
    }
}
