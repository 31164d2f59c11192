// Recovery Manager
//
// Reconstructs consensus and application state from the persisted
// recovery stream after a restart. Events are consumed one at a time on
// the actor's dispatch thread, in the order the persistence runtime
// produced them:
//
//   [SnapshotOffer?, (entry | apply | delete | config | term)*, RecoveryCompleted]
//
// Replayed entries are handed to the application cohort in bounded
// batches. Long replays opportunistically capture a snapshot when the
// configured interval has elapsed and the capture subsystem is idle.
// Completion reconciles persisted state: stale or migrated journal
// content is cleaned up, and an operator-supplied restore snapshot is
// honored only when nothing was recovered.

use crate::cohort::RecoveryCohort;
use crate::context::RaftContext;
use crate::error::Result;
use crate::log::{ReplicatedLog, ReplicatedLogEntry};
use crate::persistence::PersistenceProvider;
use crate::snapshot::{ApplySnapshot, Snapshot, SnapshotManager};
use crate::timer::Stopwatch;
use crate::types::{LogIndex, Payload, ServerConfiguration, TermInfo, NO_REPLICATED_INDEX};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

/// One event from the persisted recovery stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecoveryEvent {
    /// Snapshot covering a prefix of the log; at most one, always first
    SnapshotOffer(Snapshot),

    /// A journaled log entry
    LogEntry(ReplicatedLogEntry),

    /// Entries up to to_index were committed and must be applied
    ApplyJournalEntries { to_index: LogIndex },

    /// Entries from from_index onwards were truncated
    DeleteEntries { from_index: LogIndex },

    /// Bare membership update outside a log entry
    ServerConfig(ServerConfiguration),

    /// Election term change
    UpdateElectionTerm(TermInfo),

    /// End of the stream
    RecoveryCompleted,

    /// Unrecognized journal record, ignored
    Unknown,
}

/// Single-use recovery state machine. Borrows the actor context and the
/// application cohort for one run and is discarded once `offer` returns
/// true.
pub struct RecoveryManager<'a, C: RecoveryCohort> {
    context: &'a mut RaftContext,
    cohort: &'a mut C,
    current_batch_count: u32,
    data_recovered_with_persistence_disabled: bool,
    any_data_recovered: bool,
    has_migrated_data_recovered: bool,
    total_timer: Stopwatch,
    snapshot_timer: Stopwatch,
}

impl<'a, C: RecoveryCohort> RecoveryManager<'a, C> {
    pub fn new(context: &'a mut RaftContext, cohort: &'a mut C) -> Self {
        Self {
            context,
            cohort,
            current_batch_count: 0,
            data_recovered_with_persistence_disabled: false,
            any_data_recovered: false,
            has_migrated_data_recovered: false,
            total_timer: Stopwatch::new(),
            snapshot_timer: Stopwatch::new(),
        }
    }

    /// Consume one recovery event. Returns true exactly once, when the
    /// stream ends with `RecoveryCompleted`.
    pub fn offer(
        &mut self,
        event: RecoveryEvent,
        provider: &dyn PersistenceProvider,
    ) -> Result<bool> {
        // Latched before classification: any event other than completion
        // counts as recovered data, including stray membership records.
        if !matches!(event, RecoveryEvent::RecoveryCompleted) {
            self.any_data_recovered = true;
        }

        match event {
            RecoveryEvent::SnapshotOffer(snapshot) => {
                self.on_snapshot_offer(snapshot, provider)?;
            }
            RecoveryEvent::LogEntry(entry) => {
                self.on_recovered_entry(entry, provider)?;
            }
            RecoveryEvent::ApplyJournalEntries { to_index } => {
                self.on_apply_journal_entries(to_index, provider)?;
            }
            RecoveryEvent::DeleteEntries { from_index } => {
                self.on_delete_entries(from_index, provider)?;
            }
            RecoveryEvent::ServerConfig(config) => {
                debug!(node = %self.context.id(), "received cluster configuration: {:?}", config);
                if config.migrated {
                    self.has_migrated_data_recovered = true;
                }
                self.context.update_peer_ids(&config);
            }
            RecoveryEvent::UpdateElectionTerm(term_info) => {
                debug!(
                    node = %self.context.id(),
                    term = term_info.term,
                    voted_for = ?term_info.voted_for,
                    "recovered election term"
                );
                self.context.set_term_info(term_info);
            }
            RecoveryEvent::RecoveryCompleted => {
                self.on_recovery_completed(provider)?;
                return Ok(true);
            }
            RecoveryEvent::Unknown => {
                trace!(node = %self.context.id(), "ignoring unrecognized recovery event");
            }
        }

        Ok(false)
    }

    fn on_snapshot_offer(
        &mut self,
        snapshot: Snapshot,
        provider: &dyn PersistenceProvider,
    ) -> Result<()> {
        debug!(
            node = %self.context.id(),
            last_index = snapshot.last_index,
            last_applied = snapshot.last_applied_index,
            "received recovery snapshot"
        );

        self.start_timers();

        for entry in &snapshot.unapplied_entries {
            if entry.payload.is_migrated_format() {
                self.has_migrated_data_recovered = true;
            }
        }

        let snapshot = if provider.is_recovery_applicable() {
            snapshot
        } else {
            // Persisted data is not authoritative; keep only the term
            // information and membership the snapshot carries.
            debug!(node = %self.context.id(), "persistence disabled, scrubbing offered snapshot");
            snapshot.scrubbed()
        };

        self.context
            .set_replicated_log(ReplicatedLog::from_snapshot(&snapshot));
        self.context.set_last_applied(snapshot.last_applied_index);
        self.context.set_commit_index(snapshot.last_applied_index);
        self.context.set_term_info(snapshot.term_info.clone());

        if snapshot.state.needs_migration() {
            self.has_migrated_data_recovered = true;
        }
        if !snapshot.state.is_empty() {
            self.cohort.apply_recovery_snapshot(&snapshot.state)?;
        }
        if let Some(config) = &snapshot.server_config {
            self.context.update_peer_ids(config);
        }

        Ok(())
    }

    fn on_recovered_entry(
        &mut self,
        entry: ReplicatedLogEntry,
        provider: &dyn PersistenceProvider,
    ) -> Result<()> {
        trace!(
            node = %self.context.id(),
            index = entry.index,
            term = entry.term,
            "received journal entry"
        );

        // Membership changes take effect at their log position no matter
        // what the persistence mode is.
        if let Payload::ServerConfiguration(config) = &entry.payload {
            self.context.update_peer_ids(config);
        }
        if entry.payload.is_migrated_format() {
            self.has_migrated_data_recovered = true;
        }

        if provider.is_recovery_applicable() {
            self.context.replicated_log_mut().append(entry)?;
        } else if !entry.payload.is_persistent() {
            self.data_recovered_with_persistence_disabled = true;
        }

        Ok(())
    }

    fn on_apply_journal_entries(
        &mut self,
        to_index: LogIndex,
        provider: &dyn PersistenceProvider,
    ) -> Result<()> {
        if !provider.is_recovery_applicable() {
            self.data_recovered_with_persistence_disabled = true;
            return Ok(());
        }

        let mut last_applied = self.context.last_applied();
        debug!(
            node = %self.context.id(),
            from = last_applied + 1,
            to = to_index,
            "applying recovered journal entries"
        );

        for index in (last_applied + 1)..=to_index {
            let Some(entry) = self.context.replicated_log().get(index).cloned() else {
                // An old apply record can reference entries a later
                // snapshot already covers; stop here rather than crash.
                error!(
                    node = %self.context.id(),
                    index,
                    to_index,
                    "journal recovery missing entry, halting apply"
                );
                break;
            };

            last_applied = index;
            self.batch_recovered_entry(&entry)?;

            if self.should_take_recovery_snapshot()
                && !self.context.snapshot_manager().is_capturing()
            {
                if self.current_batch_count > 0 {
                    self.cohort.apply_current_log_recovery_batch()?;
                    self.current_batch_count = 0;
                }
                self.context.set_last_applied(last_applied);
                self.context.set_commit_index(last_applied);

                let accepted = self
                    .context
                    .snapshot_manager()
                    .capture(entry.meta(), NO_REPLICATED_INDEX);
                if accepted {
                    // Intervals are measured from the last capture. A
                    // refusal leaves the timer elapsed so the next entry
                    // tries again promptly.
                    self.snapshot_timer.restart();
                }
            }
        }

        self.context.set_last_applied(last_applied);
        self.context.set_commit_index(last_applied);
        Ok(())
    }

    fn on_delete_entries(
        &mut self,
        from_index: LogIndex,
        provider: &dyn PersistenceProvider,
    ) -> Result<()> {
        if provider.is_recovery_applicable() {
            let removed = self.context.replicated_log_mut().remove_from(from_index)?;
            debug!(
                node = %self.context.id(),
                from_index,
                removed,
                "truncated recovered log"
            );
        } else {
            self.data_recovered_with_persistence_disabled = true;
        }
        Ok(())
    }

    fn batch_recovered_entry(&mut self, entry: &ReplicatedLogEntry) -> Result<()> {
        // Membership is consensus state, already applied to the context
        // when the entry was received; the cohort never sees it.
        if matches!(entry.payload, Payload::ServerConfiguration(_)) {
            return Ok(());
        }

        let batch_size = self.context.config().journal_recovery_log_batch_size;
        if self.current_batch_count == 0 {
            self.start_timers();
            self.cohort.start_log_recovery_batch(batch_size)?;
        }

        self.cohort.append_recovered_log_entry(&entry.payload)?;

        self.current_batch_count += 1;
        if self.current_batch_count == batch_size {
            self.cohort.apply_current_log_recovery_batch()?;
            self.current_batch_count = 0;
        }

        Ok(())
    }

    fn on_recovery_completed(&mut self, provider: &dyn PersistenceProvider) -> Result<()> {
        if self.current_batch_count > 0 {
            self.cohort.apply_current_log_recovery_batch()?;
            self.current_batch_count = 0;
        }

        self.total_timer.stop();
        self.snapshot_timer.stop();

        let log = self.context.replicated_log();
        info!(
            node = %self.context.id(),
            elapsed = ?self.total_timer.elapsed(),
            last_index = log.last_index(),
            last_term = log.last_term(),
            snapshot_index = log.snapshot_index(),
            snapshot_term = log.snapshot_term(),
            journal_size = log.size(),
            "recovery completed, switching to follower"
        );

        if self.data_recovered_with_persistence_disabled
            || (self.has_migrated_data_recovered && !provider.is_recovery_applicable())
        {
            // The journal holds data the current persistence mode should
            // no longer carry; reset it to an empty snapshot.
            info!(node = %self.context.id(), "resetting persisted state");
            let snapshot = Snapshot::empty(
                self.context.term_info().clone(),
                self.context.peer_server_info(true),
            );
            provider.save_snapshot(snapshot)?;
            provider.delete_messages(provider.last_sequence_number())?;
        } else if self.has_migrated_data_recovered {
            info!(
                node = %self.context.id(),
                "migrated payloads recovered, capturing snapshot in the current format"
            );
            let accepted = self
                .context
                .snapshot_manager()
                .capture(self.context.replicated_log().last_meta(), NO_REPLICATED_INDEX);
            if !accepted {
                debug!(node = %self.context.id(), "post-recovery capture refused");
            }
        } else if let Some(restore) = self.cohort.get_restore_from_snapshot() {
            if self.any_data_recovered {
                warn!(
                    node = %self.context.id(),
                    "ignoring restore snapshot, the journal was not empty"
                );
            } else {
                info!(
                    node = %self.context.id(),
                    last_index = restore.last_index,
                    "restoring from operator-supplied snapshot"
                );
                self.context
                    .snapshot_manager()
                    .apply(ApplySnapshot::new(restore));
            }
        }

        Ok(())
    }

    fn start_timers(&mut self) {
        self.total_timer.start();
        if self.context.config().recovery_snapshot_interval_seconds > 0 {
            self.snapshot_timer.start();
        }
    }

    fn should_take_recovery_snapshot(&self) -> bool {
        let interval = self.context.config().recovery_snapshot_interval_seconds;
        self.snapshot_timer.is_running()
            && self.snapshot_timer.elapsed().as_secs() >= u64::from(interval)
    }
}
