//! # Event Bus System
//!
//! Broadcast channel for stream lifecycle notifications, built on
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **[`StreamEvent`]**: what happened to a playback session
//! - **[`EventBus`]**: cloneable publisher, one receiver per `subscribe()`
//! - **[`EventStream`]**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐   subscribe   ┌────────────┐
//! │ SampleBridge ├────────────>│ EventBus  ├──────────────>│ Subscriber │
//! └──────────────┘             └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, StreamEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut subscriber = bus.subscribe();
//!
//! bus.emit(StreamEvent::Looped).ok();
//! assert_eq!(subscriber.recv().await.unwrap(), StreamEvent::Looped);
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

// ============================================================================
// Event Types
// ============================================================================

/// Lifecycle notifications of a sample bridge session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum StreamEvent {
    /// The consumer started the session.
    Started {
        /// Reported start position in seconds.
        start_position: f64,
    },
    /// The stream ran dry and was rewound to the start.
    Looped,
    /// The stream ran dry and the session stopped serving samples.
    Ended,
    /// The consumer closed the session.
    Completed,
    /// A sample request failed.
    Failed {
        /// Human-readable error message.
        message: String,
    },
}

impl StreamEvent {
    /// Human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            StreamEvent::Started { .. } => "Stream started",
            StreamEvent::Looped => "Stream looped",
            StreamEvent::Ended => "Stream ended",
            StreamEvent::Completed => "Stream completed",
            StreamEvent::Failed { .. } => "Stream failed",
        }
    }

    /// Severity of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            StreamEvent::Failed { .. } => EventSeverity::Error,
            StreamEvent::Ended => EventSeverity::Warning,
            StreamEvent::Looped => EventSeverity::Debug,
            StreamEvent::Started { .. } | StreamEvent::Completed => EventSeverity::Info,
        }
    }
}

/// Event severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Diagnostic information.
    Debug,
    /// Normal lifecycle information.
    Info,
    /// Something noteworthy that did not fail.
    Warning,
    /// A failure.
    Error,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Sends never block. Subscribers that fall behind by more than the buffer
/// capacity receive `RecvError::Lagged`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StreamEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: StreamEvent) -> Result<usize, SendError<StreamEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&StreamEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with optional filtering.
pub struct EventStream {
    receiver: Receiver<StreamEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<StreamEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only yield events matching `predicate`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StreamEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &StreamEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next matching event.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events, `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<StreamEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Receives the next matching event without waiting.
    ///
    /// Returns `None` if nothing is available.
    pub fn try_recv(&mut self) -> Option<Result<StreamEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
