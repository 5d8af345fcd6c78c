//! # Event Bus System
//!
//! Typed notifications for hosts and between core modules, carried over a
//! `tokio::sync::broadcast` channel.
//!
//! ## Overview
//!
//! - [`CoreEvent`] groups three domains: background tasks, library content
//!   and federation nodes
//! - [`EventBus`] is the cloneable sender side
//! - [`EventStream`] wraps a receiver with an optional predicate
//!
//! Emitting never blocks. With no subscriber attached `emit` returns an
//! error, which publishers ignore with `.ok()`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, TaskEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut tasks = bus.stream().filter(|e| matches!(e, CoreEvent::Task(_)));
//!
//! bus.emit(CoreEvent::Task(TaskEvent::Completed {
//!     task_id: "t-1".to_string(),
//! }))
//! .ok();
//!
//! let event = tasks.recv().await.unwrap();
//! assert_eq!(event.description(), "Task completed");
//! # }
//! ```
//!
//! ## Slow subscribers
//!
//! A subscriber that falls more than the buffer size behind receives
//! `RecvError::Lagged(n)` and then continues with newer events. `Closed`
//! means every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Task(TaskEvent),
    Library(LibraryEvent),
    Node(NodeEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Task(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
            CoreEvent::Node(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Task(TaskEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Task(TaskEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Node(NodeEvent::Disabled { .. }) => EventSeverity::Warning,
            CoreEvent::Task(TaskEvent::Progress { .. }) => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Background task lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum TaskEvent {
    Started {
        task_id: String,
        task_type: String,
    },
    /// Progress in percent, `0.0..=100.0`
    Progress {
        task_id: String,
        progress: f64,
    },
    Completed {
        task_id: String,
    },
    Failed {
        task_id: String,
        message: String,
    },
    Cancelled {
        task_id: String,
    },
}

impl TaskEvent {
    fn description(&self) -> &str {
        match self {
            TaskEvent::Started { .. } => "Task started",
            TaskEvent::Progress { .. } => "Task progress",
            TaskEvent::Completed { .. } => "Task completed",
            TaskEvent::Failed { .. } => "Task failed",
            TaskEvent::Cancelled { .. } => "Task cancelled",
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Started { task_id, .. }
            | TaskEvent::Progress { task_id, .. }
            | TaskEvent::Completed { task_id }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::Cancelled { task_id } => task_id,
        }
    }
}

/// Catalog and library content changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    LibraryCreated {
        library_id: String,
        name: String,
    },
    LibraryDeleted {
        library_id: String,
    },
    MovieAdded {
        movie_id: i64,
        title: String,
    },
    MovieUpdated {
        movie_id: i64,
    },
    MovieDeleted {
        movie_id: i64,
    },
    ShowAdded {
        show_id: i64,
        name: String,
    },
    ShowUpdated {
        show_id: i64,
    },
    ShowDeleted {
        show_id: i64,
    },
    PersonDeleted {
        person_id: i64,
    },
    FileAdded {
        file_id: String,
        file_path: String,
    },
    FileRemoved {
        file_id: String,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::LibraryCreated { .. } => "Library created",
            LibraryEvent::LibraryDeleted { .. } => "Library deleted",
            LibraryEvent::MovieAdded { .. } => "Movie added to catalog",
            LibraryEvent::MovieUpdated { .. } => "Movie metadata updated",
            LibraryEvent::MovieDeleted { .. } => "Movie removed from catalog",
            LibraryEvent::ShowAdded { .. } => "Show added to catalog",
            LibraryEvent::ShowUpdated { .. } => "Show metadata updated",
            LibraryEvent::ShowDeleted { .. } => "Show removed from catalog",
            LibraryEvent::PersonDeleted { .. } => "Person removed from catalog",
            LibraryEvent::FileAdded { .. } => "File record added",
            LibraryEvent::FileRemoved { .. } => "File record removed",
        }
    }
}

/// Federation peer changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum NodeEvent {
    /// A peer was added through an outgoing connect
    Registered {
        node_id: String,
        name: String,
    },
    /// A peer registered itself with this node
    IncomingRegistered {
        node_id: String,
        name: String,
    },
    Enabled {
        node_id: String,
    },
    Disabled {
        node_id: String,
    },
    Removed {
        node_id: String,
    },
    CatalogFetched {
        node_id: String,
        added: u64,
        removed: u64,
        unchanged: u64,
    },
}

impl NodeEvent {
    fn description(&self) -> &str {
        match self {
            NodeEvent::Registered { .. } => "Node registered",
            NodeEvent::IncomingRegistered { .. } => "Incoming node registered",
            NodeEvent::Enabled { .. } => "Node enabled",
            NodeEvent::Disabled { .. } => "Node disabled",
            NodeEvent::Removed { .. } => "Node removed",
            NodeEvent::CatalogFetched { .. } => "Remote catalog fetched",
        }
    }
}

/// Sender side of the event channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event, returning the number of receivers reached.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Subscribes and wraps the receiver in an [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

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

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver with an optional predicate; non-matching events are skipped.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive; `None` when nothing matching is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        use broadcast::error::TryRecvError;

        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
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
