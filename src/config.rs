// Recovery Configuration

use crate::error::{RaftError, Result};

/// Tunables consulted by the recovery engine
#[derive(Debug, Clone)]
pub struct ConfigParams {
    /// Maximum number of replayed entries handed to the cohort per batch
    pub journal_recovery_log_batch_size: u32,

    /// Interval between opportunistic mid-recovery snapshots, in seconds.
    /// Zero disables mid-recovery snapshotting.
    pub recovery_snapshot_interval_seconds: u32,
}

impl Default for ConfigParams {
    fn default() -> Self {
        Self {
            journal_recovery_log_batch_size: 1000,
            recovery_snapshot_interval_seconds: 0,
        }
    }
}

impl ConfigParams {
    pub fn validate(&self) -> Result<()> {
        if self.journal_recovery_log_batch_size == 0 {
            return Err(RaftError::Configuration(
                "journal recovery log batch size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
