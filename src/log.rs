// Replicated Log
//
// Append-only, truncatable log of consensus entries, anchored at the
// position covered by the latest snapshot. Entries are dense in index:
// the first entry in memory is always snapshot_index + 1.

use crate::error::{RaftError, Result};
use crate::snapshot::Snapshot;
use crate::types::{EntryMeta, LogIndex, Payload, Term};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Entry in the replicated log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedLogEntry {
    /// Index of this entry in the log
    pub index: LogIndex,

    /// Term when the entry was received by the leader
    pub term: Term,

    /// Command data
    pub payload: Payload,
}

impl ReplicatedLogEntry {
    pub fn new(index: LogIndex, term: Term, payload: Payload) -> Self {
        Self { index, term, payload }
    }

    pub fn meta(&self) -> EntryMeta {
        EntryMeta::new(self.index, self.term)
    }

    /// Entry size in bytes (payload only)
    pub fn size(&self) -> u64 {
        self.payload.size()
    }
}

/// In-memory replicated log anchored at a snapshot position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicatedLog {
    /// Entries past the snapshot anchor, dense in index
    entries: VecDeque<ReplicatedLogEntry>,

    /// Index of the last entry covered by a snapshot (NO_INDEX if none)
    snapshot_index: LogIndex,

    /// Term of the last entry covered by a snapshot
    snapshot_term: Term,

    /// Total payload bytes held in memory
    data_size: u64,
}

impl ReplicatedLog {
    /// Create a new empty log with no snapshot anchor
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a log seeded from a recovery snapshot: anchored at the
    /// snapshot's last position and pre-populated with its unapplied
    /// entries.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut log = Self {
            entries: VecDeque::with_capacity(snapshot.unapplied_entries.len()),
            snapshot_index: snapshot.last_index,
            snapshot_term: snapshot.last_term,
            data_size: 0,
        };
        for entry in &snapshot.unapplied_entries {
            log.data_size += entry.size();
            log.entries.push_back(entry.clone());
        }
        log
    }

    /// Index of the last entry, falling back to the snapshot anchor
    pub fn last_index(&self) -> LogIndex {
        self.entries
            .back()
            .map(|entry| entry.index)
            .unwrap_or(self.snapshot_index)
    }

    /// Term of the last entry, falling back to the snapshot anchor
    pub fn last_term(&self) -> Term {
        self.entries
            .back()
            .map(|entry| entry.term)
            .unwrap_or(self.snapshot_term)
    }

    /// Position of the log tail
    pub fn last_meta(&self) -> EntryMeta {
        EntryMeta::new(self.last_index(), self.last_term())
    }

    pub fn snapshot_index(&self) -> LogIndex {
        self.snapshot_index
    }

    pub fn snapshot_term(&self) -> Term {
        self.snapshot_term
    }

    /// Number of entries held in memory
    pub fn size(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total payload bytes held in memory
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Get a log entry by index. Returns None for positions at or before
    /// the snapshot anchor and past the tail.
    pub fn get(&self, index: LogIndex) -> Option<&ReplicatedLogEntry> {
        if index <= self.snapshot_index {
            return None;
        }
        let offset = (index - self.snapshot_index - 1) as usize;
        self.entries.get(offset)
    }

    /// Append a new entry. The entry must be contiguous with the tail.
    pub fn append(&mut self, entry: ReplicatedLogEntry) -> Result<()> {
        let expected = self.last_index() + 1;
        if entry.index != expected {
            return Err(RaftError::OutOfOrderAppend {
                expected,
                got: entry.index,
            });
        }

        self.data_size += entry.size();
        self.entries.push_back(entry);
        Ok(())
    }

    /// Drop all entries with index >= from_index, returning the number
    /// removed. A no-op past the tail; fails before the snapshot anchor.
    pub fn remove_from(&mut self, from_index: LogIndex) -> Result<u64> {
        if from_index <= self.snapshot_index {
            return Err(RaftError::RemoveBeforeSnapshot {
                index: from_index,
                snapshot_index: self.snapshot_index,
            });
        }
        if from_index > self.last_index() {
            return Ok(0);
        }

        let keep = (from_index - self.snapshot_index - 1) as usize;
        let removed = self.entries.len() - keep;
        for entry in self.entries.drain(keep..) {
            self.data_size -= entry.size();
        }
        Ok(removed as u64)
    }
}
