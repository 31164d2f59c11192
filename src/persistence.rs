// Persistence Provider
//
// Seam between the recovery engine and the journal/snapshot store. All
// I/O is delegated here; the engine itself never touches files. The
// in-memory implementation backs the test suites and embedded use.

use crate::error::Result;
use crate::snapshot::Snapshot;
use parking_lot::Mutex;

pub trait PersistenceProvider: Send + Sync {
    /// Whether persisted state is authoritative. False when persistence
    /// is configured off; replayed data then signals stale storage.
    fn is_recovery_applicable(&self) -> bool;

    /// Enqueue a snapshot save. Completion is asynchronous.
    fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Drop journal entries up to and including the given sequence number
    fn delete_messages(&self, up_to_sequence: u64) -> Result<()>;

    /// Highest sequence number the journal has handed out
    fn last_sequence_number(&self) -> u64;
}

#[derive(Debug, Default)]
struct JournalState {
    last_sequence: u64,
    deleted_up_to: u64,
    saved_snapshots: Vec<Snapshot>,
}

/// Journal bookkeeping held in memory
pub struct InMemoryPersistence {
    recovery_applicable: bool,
    state: Mutex<JournalState>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::with_recovery_applicable(true)
    }

    pub fn with_recovery_applicable(recovery_applicable: bool) -> Self {
        Self {
            recovery_applicable,
            state: Mutex::new(JournalState::default()),
        }
    }

    /// Record that the runtime persisted another journal entry
    pub fn advance_sequence(&self, count: u64) {
        self.state.lock().last_sequence += count;
    }

    /// Snapshots saved through this provider, oldest first
    pub fn saved_snapshots(&self) -> Vec<Snapshot> {
        self.state.lock().saved_snapshots.clone()
    }

    /// Highest sequence number covered by a delete request
    pub fn deleted_up_to(&self) -> u64 {
        self.state.lock().deleted_up_to
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistenceProvider for InMemoryPersistence {
    fn is_recovery_applicable(&self) -> bool {
        self.recovery_applicable
    }

    fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.state.lock().saved_snapshots.push(snapshot);
        Ok(())
    }

    fn delete_messages(&self, up_to_sequence: u64) -> Result<()> {
        let mut state = self.state.lock();
        state.deleted_up_to = state.deleted_up_to.max(up_to_sequence);
        Ok(())
    }

    fn last_sequence_number(&self) -> u64 {
        self.state.lock().last_sequence
    }
}
