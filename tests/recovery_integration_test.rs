// Recovery Integration Test
//
// Drives full recovery streams through real collaborators: an applying
// cohort, the in-memory journal provider and the channel-backed capture
// coordinator.

use bytes::Bytes;
use std::sync::Arc;

use rusty_raft::cohort::RecoveryCohort;
use rusty_raft::config::ConfigParams;
use rusty_raft::context::RaftContext;
use rusty_raft::error::Result;
use rusty_raft::log::ReplicatedLogEntry;
use rusty_raft::persistence::{InMemoryPersistence, PersistenceProvider};
use rusty_raft::recovery::{RecoveryEvent, RecoveryManager};
use rusty_raft::snapshot::{
    CaptureCoordinator, Snapshot, SnapshotManager, SnapshotRequest, SnapshotState,
};
use rusty_raft::types::{Payload, ServerConfiguration, TermInfo};

/// Cohort that really applies replayed payloads to an in-memory state
#[derive(Default)]
struct ApplyingCohort {
    snapshot_state: Option<Bytes>,
    staged: Vec<Bytes>,
    applied: Vec<Bytes>,
    restore: Option<Snapshot>,
}

impl RecoveryCohort for ApplyingCohort {
    fn start_log_recovery_batch(&mut self, max_batch_size: u32) -> Result<()> {
        self.staged = Vec::with_capacity(max_batch_size as usize);
        Ok(())
    }

    fn append_recovered_log_entry(&mut self, payload: &Payload) -> Result<()> {
        if let Payload::ApplicationData { data, .. } = payload {
            self.staged.push(data.clone());
        }
        Ok(())
    }

    fn apply_current_log_recovery_batch(&mut self) -> Result<()> {
        self.applied.append(&mut self.staged);
        Ok(())
    }

    fn apply_recovery_snapshot(&mut self, state: &SnapshotState) -> Result<()> {
        if let SnapshotState::Blob { data, .. } = state {
            self.snapshot_state = Some(data.clone());
        }
        Ok(())
    }

    fn get_restore_from_snapshot(&mut self) -> Option<Snapshot> {
        self.restore.take()
    }
}

struct RecoveryHarness {
    context: RaftContext,
    cohort: ApplyingCohort,
    provider: InMemoryPersistence,
    coordinator: Arc<CaptureCoordinator>,
    requests: tokio::sync::mpsc::UnboundedReceiver<SnapshotRequest>,
}

impl RecoveryHarness {
    fn new(config: ConfigParams, recovery_applicable: bool) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let (coordinator, requests) = CaptureCoordinator::new();
        let coordinator = Arc::new(coordinator);
        let context = RaftContext::new(
            "node-1".to_string(),
            Arc::new(config),
            coordinator.clone(),
        );

        Self {
            context,
            cohort: ApplyingCohort::default(),
            provider: InMemoryPersistence::with_recovery_applicable(recovery_applicable),
            coordinator,
            requests,
        }
    }

    fn replay(&mut self, events: Vec<RecoveryEvent>) -> bool {
        let mut recovery = RecoveryManager::new(&mut self.context, &mut self.cohort);
        let mut done = false;
        for event in events {
            done = recovery.offer(event, &self.provider).unwrap();
        }
        done
    }
}

fn app_entry(index: u64, term: u64, data: &'static [u8]) -> ReplicatedLogEntry {
    ReplicatedLogEntry::new(
        index,
        term,
        Payload::ApplicationData {
            data: Bytes::from_static(data),
            persistent: true,
            migrated: false,
        },
    )
}

#[test]
fn test_full_stream_rebuilds_state() {
    let config = ConfigParams {
        journal_recovery_log_batch_size: 2,
        ..Default::default()
    };
    let mut harness = RecoveryHarness::new(config, true);

    let snapshot = Snapshot {
        state: SnapshotState::blob(Bytes::from_static(b"base")),
        unapplied_entries: vec![app_entry(4, 2, b"d4")],
        last_index: 3,
        last_term: 2,
        last_applied_index: 3,
        last_applied_term: 2,
        term_info: TermInfo::new(2, Some("node-2".to_string())),
        server_config: Some(ServerConfiguration::new(
            ["node-1".to_string(), "node-2".to_string()],
            ["node-3".to_string()],
        )),
        election_votes: None,
    };

    let membership = ServerConfiguration::new(
        ["node-1".to_string(), "node-2".to_string(), "node-4".to_string()],
        [],
    );

    let done = harness.replay(vec![
        RecoveryEvent::SnapshotOffer(snapshot),
        RecoveryEvent::LogEntry(app_entry(5, 2, b"d5")),
        RecoveryEvent::LogEntry(ReplicatedLogEntry::new(
            6,
            3,
            Payload::ServerConfiguration(membership),
        )),
        RecoveryEvent::LogEntry(app_entry(7, 3, b"d7")),
        RecoveryEvent::ApplyJournalEntries { to_index: 7 },
        RecoveryEvent::UpdateElectionTerm(TermInfo::new(3, None)),
        RecoveryEvent::RecoveryCompleted,
    ]);
    assert!(done);

    // Consensus state
    let log = harness.context.replicated_log();
    assert_eq!(log.snapshot_index(), 3);
    assert_eq!(log.last_index(), 7);
    assert_eq!(log.size(), 4);
    assert_eq!(harness.context.last_applied(), 7);
    assert_eq!(harness.context.commit_index(), 7);
    assert_eq!(harness.context.term_info().term, 3);

    // Membership reflects the configuration entry at index 6
    let peers: Vec<_> = harness.context.peer_ids().cloned().collect();
    assert_eq!(peers, vec!["node-2".to_string(), "node-4".to_string()]);

    // Application state: snapshot blob plus every applied data payload,
    // in log order, with the membership entry filtered out
    assert_eq!(harness.cohort.snapshot_state.as_deref(), Some(&b"base"[..]));
    assert_eq!(
        harness.cohort.applied,
        vec![
            Bytes::from_static(b"d4"),
            Bytes::from_static(b"d5"),
            Bytes::from_static(b"d7"),
        ]
    );
    assert!(harness.cohort.staged.is_empty());

    // Nothing asked the snapshot subsystem for work
    assert!(harness.requests.try_recv().is_err());
    assert!(harness.provider.saved_snapshots().is_empty());
}

#[tokio::test]
async fn test_migrated_payloads_request_capture() {
    let mut harness = RecoveryHarness::new(ConfigParams::default(), true);

    let migrated = ReplicatedLogEntry::new(
        1,
        1,
        Payload::ApplicationData {
            data: Bytes::from_static(b"legacy"),
            persistent: true,
            migrated: true,
        },
    );
    harness.replay(vec![
        RecoveryEvent::LogEntry(migrated),
        RecoveryEvent::RecoveryCompleted,
    ]);

    assert!(harness.coordinator.is_capturing());
    match harness.requests.recv().await.unwrap() {
        SnapshotRequest::Capture { last_meta, .. } => {
            assert_eq!(last_meta.index, 1);
            assert_eq!(last_meta.term, 1);
        }
        other => panic!("unexpected request: {:?}", other),
    }
}

#[test]
fn test_disabled_persistence_cleans_the_journal() {
    let mut harness = RecoveryHarness::new(ConfigParams::default(), false);
    harness.provider.advance_sequence(11);

    let volatile = ReplicatedLogEntry::new(
        1,
        1,
        Payload::ApplicationData {
            data: Bytes::from_static(b"x"),
            persistent: false,
            migrated: false,
        },
    );
    harness.replay(vec![
        RecoveryEvent::LogEntry(volatile),
        RecoveryEvent::RecoveryCompleted,
    ]);

    let saved = harness.provider.saved_snapshots();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].state.is_empty());
    assert!(saved[0].unapplied_entries.is_empty());
    assert_eq!(harness.provider.deleted_up_to(), 11);
    assert!(harness.cohort.applied.is_empty());
}

#[tokio::test]
async fn test_operator_restore_on_cold_start() {
    let mut harness = RecoveryHarness::new(ConfigParams::default(), true);

    let restore = Snapshot {
        state: SnapshotState::blob(Bytes::from_static(b"backup")),
        unapplied_entries: Vec::new(),
        last_index: 9,
        last_term: 2,
        last_applied_index: 9,
        last_applied_term: 2,
        term_info: TermInfo::new(2, None),
        server_config: None,
        election_votes: None,
    };
    harness.cohort.restore = Some(restore.clone());

    harness.replay(vec![RecoveryEvent::RecoveryCompleted]);

    match harness.requests.recv().await.unwrap() {
        SnapshotRequest::Apply(request) => assert_eq!(request.snapshot, restore),
        other => panic!("unexpected request: {:?}", other),
    }
    assert!(harness.provider.saved_snapshots().is_empty());
}
