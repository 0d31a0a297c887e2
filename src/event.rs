//! Server events and the event queue.
//!
//! The server appends an [`Event`] for every notable status change (sessions
//! opening and closing, rejected requests, listener state). The operator
//! drains them with [`Server::pick_event`](crate::Server::pick_event) and
//! [`Server::clear_events`](crate::Server::clear_events).
//!
//! The queue is not deduplicated: the same condition occurring twice yields
//! two events. Clearing removes every queued event at once.
//!
//! # Example
//!
//! ```
//! use s7_datablock::{Event, EventKind, EventMask, EventQueue};
//!
//! let queue = EventQueue::new(EventMask::default());
//! queue.push(Event::new(EventKind::ServerStarted));
//! queue.push(Event::new(EventKind::ServerStarted));
//!
//! assert_eq!(queue.pick().unwrap().kind, EventKind::ServerStarted);
//! assert_eq!(queue.len(), 2);
//!
//! queue.clear();
//! assert!(queue.pick().is_none());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::memory::AreaId;

/// Maximum number of events kept before new ones are dropped.
pub const MAX_QUEUED_EVENTS: usize = 1500;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The listener is up.
    ServerStarted,
    /// The server was stopped.
    ServerStopped,
    /// The listener failed while accepting.
    ListenerError,
    /// A client opened a session.
    ClientAdded,
    /// A client session ended.
    ClientDisconnected,
    /// A request was rejected; the session stays open.
    RequestRejected,
    /// A client read a byte range.
    DataRead,
    /// A client wrote a byte range.
    DataWrite,
}

impl EventKind {
    fn mask(self) -> EventMask {
        match self {
            EventKind::ServerStarted | EventKind::ServerStopped | EventKind::ListenerError => {
                EventMask::SERVER
            }
            EventKind::ClientAdded | EventKind::ClientDisconnected => EventMask::SESSION,
            EventKind::RequestRejected => EventMask::REJECTED,
            EventKind::DataRead => EventMask::DATA_READ,
            EventKind::DataWrite => EventMask::DATA_WRITE,
        }
    }
}

bitflags! {
    /// Selects which event kinds are queued.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u32 {
        /// Server start, stop and listener errors.
        const SERVER = 0b0000_0001;
        /// Sessions opening and closing.
        const SESSION = 0b0000_0010;
        /// Rejected requests.
        const REJECTED = 0b0000_0100;
        /// Successful reads.
        const DATA_READ = 0b0000_1000;
        /// Successful writes.
        const DATA_WRITE = 0b0001_0000;
    }
}

impl Default for EventMask {
    /// Everything except per-request data traffic.
    fn default() -> Self {
        EventMask::SERVER | EventMask::SESSION | EventMask::REJECTED
    }
}

/// Byte range an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRange {
    /// Area addressed.
    pub area: AreaId,
    /// First byte.
    pub offset: u32,
    /// Number of bytes.
    pub length: u16,
}

/// A status notification produced by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Client involved, if any.
    pub remote: Option<SocketAddr>,
    /// Range involved, if any.
    pub range: Option<EventRange>,
    /// Free-form detail (error text, rack/slot, ...).
    pub detail: Option<String>,
    /// When the event was queued.
    pub time: SystemTime,
}

impl Event {
    /// Creates an event of the given kind stamped with the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            remote: None,
            range: None,
            detail: None,
            time: SystemTime::now(),
        }
    }

    /// Attaches the client address.
    pub fn with_remote(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Attaches the addressed range.
    pub fn with_range(mut self, area: AreaId, offset: u32, length: u16) -> Self {
        self.range = Some(EventRange {
            area,
            offset,
            length,
        });
        self
    }

    /// Attaches a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(remote) = self.remote {
            write!(f, "[{}] ", remote)?;
        }
        let text = match self.kind {
            EventKind::ServerStarted => "Server started",
            EventKind::ServerStopped => "Server stopped",
            EventKind::ListenerError => "Listener error",
            EventKind::ClientAdded => "Client added",
            EventKind::ClientDisconnected => "Client disconnected",
            EventKind::RequestRejected => "Request rejected",
            EventKind::DataRead => "Read",
            EventKind::DataWrite => "Write",
        };
        f.write_str(text)?;
        if let Some(range) = self.range {
            write!(f, " {} offset {} length {}", range.area, range.offset, range.length)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// Bounded FIFO of server events.
#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    mask: Mutex<EventMask>,
}

impl EventQueue {
    /// Creates an empty queue keeping the kinds selected by `mask`.
    pub fn new(mask: EventMask) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            mask: Mutex::new(mask),
        }
    }

    /// Appends an event unless it is masked out or the queue is full.
    ///
    /// Returns whether the event was queued.
    pub fn push(&self, event: Event) -> bool {
        if !self.mask.lock().contains(event.kind.mask()) {
            return false;
        }
        let mut events = self.events.lock();
        if events.len() >= MAX_QUEUED_EVENTS {
            return false;
        }
        events.push_back(event);
        true
    }

    /// Returns the oldest event without removing it.
    pub fn pick(&self) -> Option<Event> {
        self.events.lock().front().cloned()
    }

    /// Removes every queued event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Returns a copy of every queued event, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Replaces the event mask. Already queued events are kept.
    pub fn set_mask(&self, mask: EventMask) {
        *self.mask.lock() = mask;
    }

    /// Returns the current event mask.
    pub fn mask(&self) -> EventMask {
        *self.mask.lock()
    }
}
