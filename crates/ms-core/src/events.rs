//! Catalog and job notifications.
//!
//! The engine publishes an [`EventPayload`] whenever a record is added,
//! soft-removed or enriched, and at every job transition. [`EventBus`] fans
//! each one out over a `tokio::sync::broadcast` channel and keeps a short,
//! sequence-numbered backlog so a consumer that reconnects can ask for
//! everything it missed with [`EventBus::since`].
//!
//! Publishing is fire-and-forget: it never blocks and never fails, even with
//! no subscribers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ids::{JobId, LibraryPathId, MediaId};
use crate::job::JobType;

/// Events kept for [`EventBus::since`].
const BACKLOG_LEN: usize = 100;

/// Which stream an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Records added, removed or updated, and scan summaries.
    Catalog,
    /// Job queue transitions.
    Jobs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    JobQueued {
        job_id: JobId,
        job_type: JobType,
    },
    JobStarted {
        job_id: JobId,
    },
    JobCompleted {
        job_id: JobId,
    },
    JobFailed {
        job_id: JobId,
        error: String,
    },
    MediaAdded {
        media_id: MediaId,
        library_path_id: LibraryPathId,
        relative_path: String,
    },
    MediaRemoved {
        media_id: MediaId,
        library_path_id: LibraryPathId,
        relative_path: String,
    },
    MediaUpdated {
        media_id: MediaId,
    },
    LibraryScanComplete {
        library_path_id: LibraryPathId,
        files_found: u64,
        added: u64,
        removed: u64,
        errors: u64,
    },
}

impl EventPayload {
    pub fn topic(&self) -> Topic {
        match self {
            Self::JobQueued { .. }
            | Self::JobStarted { .. }
            | Self::JobCompleted { .. }
            | Self::JobFailed { .. } => Topic::Jobs,
            Self::MediaAdded { .. }
            | Self::MediaRemoved { .. }
            | Self::MediaUpdated { .. }
            | Self::LibraryScanComplete { .. } => Topic::Catalog,
        }
    }
}

/// A published event. `seq` increases by one per publish on a given bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub topic: Topic,
    pub payload: EventPayload,
}

pub struct EventBus {
    tx: broadcast::Sender<Event>,
    next_seq: AtomicU64,
    backlog: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// `capacity` sizes the broadcast channel; slow receivers past it see
    /// `RecvError::Lagged` and can recover through [`EventBus::since`].
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_seq: AtomicU64::new(1),
            backlog: RwLock::new(VecDeque::with_capacity(BACKLOG_LEN)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish `payload` and return its sequence number.
    pub fn publish(&self, payload: EventPayload) -> u64 {
        // The backlog lock also orders sequence assignment, so the backlog
        // stays sorted by `seq`.
        let mut backlog = self.backlog.write();
        let event = Event {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            at: Utc::now(),
            topic: payload.topic(),
            payload,
        };
        if backlog.len() == BACKLOG_LEN {
            backlog.pop_front();
        }
        backlog.push_back(event.clone());
        drop(backlog);

        let seq = event.seq;
        if self.tx.send(event).is_err() {
            tracing::trace!(seq, "event published with no subscribers");
        }
        seq
    }

    /// Backlogged events with a sequence number greater than `after`,
    /// oldest first. `since(0)` returns the whole backlog.
    pub fn since(&self, after: u64) -> Vec<Event> {
        self.backlog
            .read()
            .iter()
            .filter(|e| e.seq > after)
            .cloned()
            .collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
