// Snapshot Model and Capture Coordination
//
// A snapshot is a compact representation of application state at a log
// position, plus the unapplied entries needed to reach the committed
// tail. Capture admission is serialized: at most one capture is in
// flight at a time, and overlapping requests are refused rather than
// queued so callers can retry at the next opportunity.

use crate::log::ReplicatedLogEntry;
use crate::types::{EntryMeta, LogIndex, NodeId, ServerConfiguration, Term, TermInfo, NO_INDEX};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::mpsc;
use tracing::debug;

/// Application state carried by a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotState {
    /// No application state
    Empty,

    /// Opaque application blob
    Blob {
        data: Bytes,
        /// Set when the blob was written in a legacy format and must be
        /// re-persisted in the current one.
        needs_migration: bool,
    },
}

impl SnapshotState {
    pub fn blob(data: impl Into<Bytes>) -> Self {
        SnapshotState::Blob {
            data: data.into(),
            needs_migration: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SnapshotState::Empty)
    }

    pub fn needs_migration(&self) -> bool {
        matches!(
            self,
            SnapshotState::Blob {
                needs_migration: true,
                ..
            }
        )
    }
}

/// State at a log position, plus unapplied entries up to the committed tail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: SnapshotState,

    /// Entries past last_applied_index that the snapshot still carries
    pub unapplied_entries: Vec<ReplicatedLogEntry>,

    /// Position of the last entry covered by the snapshot
    pub last_index: LogIndex,
    pub last_term: Term,

    /// Position of the last entry applied to the application state
    pub last_applied_index: LogIndex,
    pub last_applied_term: Term,

    pub term_info: TermInfo,

    /// Cluster membership at capture time, if any was known
    pub server_config: Option<ServerConfiguration>,

    /// Votes granted to this node in the current term, preserved for the
    /// election engine; recovery carries them through untouched.
    pub election_votes: Option<BTreeSet<NodeId>>,
}

impl Snapshot {
    /// An empty snapshot holding only consensus metadata. Used to reset
    /// persisted state after recovering data the journal should no
    /// longer carry.
    pub fn empty(term_info: TermInfo, server_config: Option<ServerConfiguration>) -> Self {
        Self {
            state: SnapshotState::Empty,
            unapplied_entries: Vec::new(),
            last_index: NO_INDEX,
            last_term: 0,
            last_applied_index: NO_INDEX,
            last_applied_term: 0,
            term_info,
            server_config,
            election_votes: None,
        }
    }

    /// A copy of this snapshot with all replicated data scrubbed out,
    /// preserving only term information and cluster membership. Offered
    /// state is scrubbed when persisted data is not authoritative.
    pub fn scrubbed(&self) -> Self {
        Self::empty(self.term_info.clone(), self.server_config.clone())
    }
}

/// Request to install a snapshot into the running actor
#[derive(Debug, Clone, PartialEq)]
pub struct ApplySnapshot {
    pub snapshot: Snapshot,
}

impl ApplySnapshot {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

/// Snapshot capture subsystem consulted during recovery and normal
/// operation. Capture refusal is load shedding, not an error.
pub trait SnapshotManager: Send + Sync {
    /// Whether a capture is currently in flight
    fn is_capturing(&self) -> bool;

    /// Request a capture anchored at the given log position. Returns
    /// acceptance; a refused capture may be retried later.
    fn capture(&self, last_meta: EntryMeta, replicated_to_all_index: i64) -> bool;

    /// Enqueue installation of a snapshot
    fn apply(&self, request: ApplySnapshot);
}

/// Work accepted by the capture coordinator, completed asynchronously by
/// the owning actor.
#[derive(Debug)]
pub enum SnapshotRequest {
    Capture {
        last_meta: EntryMeta,
        replicated_to_all_index: i64,
    },
    Apply(ApplySnapshot),
}

/// Channel-backed snapshot manager. Admission is decided synchronously
/// under a lock; accepted work is forwarded to the owning actor's task
/// and completes off-thread.
pub struct CaptureCoordinator {
    in_flight: Mutex<Option<EntryMeta>>,
    request_tx: mpsc::UnboundedSender<SnapshotRequest>,
}

impl CaptureCoordinator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SnapshotRequest>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            in_flight: Mutex::new(None),
            request_tx,
        };
        (coordinator, request_rx)
    }

    /// Clear the in-flight marker once the capture work has finished
    pub fn capture_complete(&self) {
        *self.in_flight.lock() = None;
    }
}

impl SnapshotManager for CaptureCoordinator {
    fn is_capturing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    fn capture(&self, last_meta: EntryMeta, replicated_to_all_index: i64) -> bool {
        let mut in_flight = self.in_flight.lock();
        if in_flight.is_some() {
            debug!(
                index = last_meta.index,
                "capture refused, another capture is in flight"
            );
            return false;
        }

        if self
            .request_tx
            .send(SnapshotRequest::Capture {
                last_meta,
                replicated_to_all_index,
            })
            .is_err()
        {
            debug!("capture refused, snapshot worker is gone");
            return false;
        }

        *in_flight = Some(last_meta);
        true
    }

    fn apply(&self, request: ApplySnapshot) {
        let _ = self.request_tx.send(SnapshotRequest::Apply(request));
    }
}
