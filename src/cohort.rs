// Recovery Cohort
//
// The application-side consumer of replayed state. Recovery hands the
// cohort batches of payloads and, when a snapshot was offered, the
// snapshot's application state. Any fault raised here aborts recovery.

use crate::error::Result;
use crate::snapshot::{Snapshot, SnapshotState};
use crate::types::Payload;

pub trait RecoveryCohort {
    /// Begin a batch of at most max_batch_size replayed payloads
    fn start_log_recovery_batch(&mut self, max_batch_size: u32) -> Result<()>;

    /// Add one replayed payload to the current batch
    fn append_recovered_log_entry(&mut self, payload: &Payload) -> Result<()>;

    /// Apply the current batch to the application state
    fn apply_current_log_recovery_batch(&mut self) -> Result<()>;

    /// Install the application state carried by a recovery snapshot
    fn apply_recovery_snapshot(&mut self, state: &SnapshotState) -> Result<()>;

    /// Operator-supplied snapshot to restore from, consulted only when
    /// the journal and snapshot store turned out to be empty
    fn get_restore_from_snapshot(&mut self) -> Option<Snapshot>;
}
