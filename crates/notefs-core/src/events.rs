//! Note change events and the bus that distributes them.
//!
//! Every mutation made through the protocol server is announced as a
//! [`NoteEvent`]: an identifier plus one of four actions. The wire form,
//! read from the `event` file, is one line per event:
//!
//! ```text
//! 20240102T030405 n
//! ```
//!
//! The [`EventBus`] gives each subscriber its own bounded queue. Emission
//! never blocks: when a subscriber's queue is full the event is dropped for
//! that subscriber only, and the others still receive it in order.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{Error, Result};

/// What happened to a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteAction {
    /// Created through the `new` endpoint; no file exists yet.
    New,
    /// Title or keywords changed; front matter must be rewritten.
    Update,
    /// File name may no longer match the metadata.
    Rename,
    /// Removed from the index.
    Delete,
}

impl NoteAction {
    /// Single-letter wire code.
    pub fn code(self) -> char {
        match self {
            Self::New => 'n',
            Self::Update => 'u',
            Self::Rename => 'r',
            Self::Delete => 'd',
        }
    }

    /// Action for a wire code.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'n' => Some(Self::New),
            'u' => Some(Self::Update),
            'r' => Some(Self::Rename),
            'd' => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for NoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEvent {
    pub identifier: String,
    pub action: NoteAction,
    /// Path of the note at the time of the event. Set for deletions, which
    /// are announced before the record leaves the index.
    pub path: Option<PathBuf>,
}

impl NoteEvent {
    pub fn new(identifier: impl Into<String>, action: NoteAction) -> Self {
        Self {
            identifier: identifier.into(),
            action,
            path: None,
        }
    }

    /// Deletion event carrying the note's last known path.
    pub fn deleted(identifier: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            action: NoteAction::Delete,
            path,
        }
    }

    /// Newline-terminated wire line.
    pub fn wire_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for NoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.identifier, self.action)
    }
}

impl FromStr for NoteEvent {
    type Err = Error;

    /// Parse a wire line (`<id> <n|u|r|d>`); the path is never on the wire.
    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let (Some(identifier), Some(code), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::InvalidNote(format!("malformed event line: {:?}", line)));
        };
        let mut chars = code.chars();
        let action = match (chars.next(), chars.next()) {
            (Some(c), None) => NoteAction::from_code(c),
            _ => None,
        }
        .ok_or_else(|| Error::InvalidNote(format!("unknown event action: {:?}", code)))?;
        Ok(Self::new(identifier, action))
    }
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<NoteEvent>,
}

/// Receiving end of one subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<NoteEvent>,
}

impl Subscription {
    /// Subscriber number, unique per bus.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. Returns `None` once the bus is gone.
    ///
    /// Cancel safe: dropping the future loses no event.
    pub async fn recv(&mut self) -> Option<NoteEvent> {
        self.rx.recv().await
    }

    /// Next queued event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<NoteEvent> {
        self.rx.try_recv().ok()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Fan-out of note events to any number of subscribers.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a bus whose subscribers each queue up to `capacity` events.
    ///
    /// Recommended: 64 for production, 2-8 for tests exercising saturation.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Offer an event to every subscriber without blocking.
    ///
    /// Returns how many subscribers accepted it. Closed subscriptions are
    /// pruned; full ones miss this event.
    pub fn emit(&self, event: NoteEvent) -> usize {
        let mut subscribers = self.lock();
        let mut delivered = 0;
        subscribers.retain(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(
                    subsystem = "events",
                    subscriber = sub.id,
                    note_id = %event.identifier,
                    action = %event.action,
                    "Subscriber queue full, event dropped"
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        tracing::trace!(
            subsystem = "events",
            note_id = %event.identifier,
            action = %event.action,
            subscriber_count = subscribers.len(),
            delivered,
            "EventBus emit"
        );
        delivered
    }

    /// Open a new subscription with its own queue.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().push(Subscriber { id, tx });
        Subscription { id, rx }
    }

    /// Close a subscription by id. Its queued events are discarded.
    pub fn unsubscribe(&self, id: u64) {
        self.lock().retain(|sub| sub.id != id);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|sub| !sub.tx.is_closed()).count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_QUEUE_CAPACITY)
    }
}
