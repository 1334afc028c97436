//! Session event notification.

use super::command::CommandId;
use crate::measurement::Measurement;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const EVENT_CAPACITY: usize = 256;

/// Something that happened on an instrument session.
#[derive(Debug, Clone)]
pub enum SpectroEvent {
    /// The listener took ownership of the link.
    Connected {
        /// Instrument id.
        instrument: String,
    },
    /// A command was written to the link.
    CommandSent {
        /// Instrument id.
        instrument: String,
        /// Job id.
        id: CommandId,
        /// Command name.
        command: String,
    },
    /// A reply was read and decoded.
    ReplyReceived {
        /// Instrument id.
        instrument: String,
        /// Job id.
        id: CommandId,
        /// Command name.
        command: String,
        /// Time between write and decoded reply.
        elapsed: Duration,
    },
    /// A recoverable failure; the command is sent again.
    Retrying {
        /// Instrument id.
        instrument: String,
        /// Job id.
        id: CommandId,
        /// Command name.
        command: String,
        /// Retry number, starting at 1.
        attempt: u32,
        /// The failure that triggered the retry.
        reason: String,
    },
    /// A job ended with an error.
    CommandFailed {
        /// Instrument id.
        instrument: String,
        /// Job id.
        id: CommandId,
        /// Command name.
        command: String,
        /// Error message.
        error: String,
    },
    /// A measurement was decoded.
    MeasurementCompleted {
        /// Instrument id.
        instrument: String,
        /// The measurement.
        measurement: Arc<Measurement>,
    },
    /// The listener stopped.
    Disconnected {
        /// Instrument id.
        instrument: String,
        /// Why, if not an orderly shutdown.
        reason: Option<String>,
    },
}

impl SpectroEvent {
    /// Instrument id the event belongs to.
    pub fn instrument(&self) -> &str {
        match self {
            SpectroEvent::Connected { instrument }
            | SpectroEvent::CommandSent { instrument, .. }
            | SpectroEvent::ReplyReceived { instrument, .. }
            | SpectroEvent::Retrying { instrument, .. }
            | SpectroEvent::CommandFailed { instrument, .. }
            | SpectroEvent::MeasurementCompleted { instrument, .. }
            | SpectroEvent::Disconnected { instrument, .. } => instrument,
        }
    }

    /// Job id, for command-level events.
    pub fn command_id(&self) -> Option<CommandId> {
        match self {
            SpectroEvent::CommandSent { id, .. }
            | SpectroEvent::ReplyReceived { id, .. }
            | SpectroEvent::Retrying { id, .. }
            | SpectroEvent::CommandFailed { id, .. } => Some(*id),
            _ => None,
        }
    }
}

/// Fan-out of [`SpectroEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SpectroEvent>,
}

impl EventBus {
    /// Create a bus buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn publish(&self, event: SpectroEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SpectroEvent> {
        self.tx.subscribe()
    }

    /// Current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}
