//! Explicit message channels between intake, the coordinator and outcome listeners.
//!
//! Each component is handed the producer it publishes to; there is no process-wide event list.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{trace, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event channel closed")]
    Closed,
}

/// Cloneable sending half of an event channel.
#[derive(Debug)]
pub struct EventProducer<E> {
    sender: mpsc::Sender<E>,
}

impl<E> Clone for EventProducer<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Create a bounded channel of `buffer_size` events.
pub fn channel<E>(buffer_size: usize) -> (EventProducer<E>, mpsc::Receiver<E>) {
    let (sender, receiver) = mpsc::channel(buffer_size.max(1));
    (EventProducer { sender }, receiver)
}

impl<E: Send + std::fmt::Debug> EventProducer<E> {
    /// Deliver `event`, waiting for buffer space.
    ///
    /// # Errors
    /// Returns `EventError::Closed` once the receiver is gone.
    pub async fn publish(&self, event: E) -> Result<(), EventError> {
        self.sender.send(event).await.map_err(|_| EventError::Closed)
    }

    /// Deliver `event` without waiting. A full or closed channel drops it with a warning.
    pub fn publish_nowait(&self, event: E) {
        match self.sender.try_send(event) {
            Ok(()) => trace!("event published"),
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(?event, "event channel closed, dropping event");
            }
        }
    }
}
