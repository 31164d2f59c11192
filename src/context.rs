// Raft Actor Context
//
// Shared consensus state for one actor: the replicated log, election
// term, commit bookkeeping and cluster membership. Recovery mutates it
// exclusively from the actor's dispatch thread; afterwards it is handed
// to the normal operating role.

use crate::config::ConfigParams;
use crate::log::ReplicatedLog;
use crate::snapshot::SnapshotManager;
use crate::types::{LogIndex, NodeId, ServerConfiguration, TermInfo};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Peer membership entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: NodeId,
    pub voting: bool,
}

/// Per-actor consensus state
pub struct RaftContext {
    id: NodeId,
    replicated_log: ReplicatedLog,
    term_info: TermInfo,
    last_applied: LogIndex,
    commit_index: LogIndex,
    peers: BTreeMap<NodeId, PeerInfo>,
    voting_member: bool,
    config: Arc<ConfigParams>,
    snapshot_manager: Arc<dyn SnapshotManager>,
}

impl RaftContext {
    pub fn new(
        id: NodeId,
        config: Arc<ConfigParams>,
        snapshot_manager: Arc<dyn SnapshotManager>,
    ) -> Self {
        Self {
            id,
            replicated_log: ReplicatedLog::new(),
            term_info: TermInfo::default(),
            last_applied: 0,
            commit_index: 0,
            peers: BTreeMap::new(),
            voting_member: true,
            config,
            snapshot_manager,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn config(&self) -> &ConfigParams {
        &self.config
    }

    pub fn snapshot_manager(&self) -> &dyn SnapshotManager {
        self.snapshot_manager.as_ref()
    }

    pub fn replicated_log(&self) -> &ReplicatedLog {
        &self.replicated_log
    }

    pub fn replicated_log_mut(&mut self) -> &mut ReplicatedLog {
        &mut self.replicated_log
    }

    pub fn set_replicated_log(&mut self, log: ReplicatedLog) {
        self.replicated_log = log;
    }

    pub fn term_info(&self) -> &TermInfo {
        &self.term_info
    }

    pub fn set_term_info(&mut self, term_info: TermInfo) {
        self.term_info = term_info;
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    pub fn set_last_applied(&mut self, index: LogIndex) {
        self.last_applied = index;
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn set_commit_index(&mut self, index: LogIndex) {
        self.commit_index = index;
    }

    pub fn is_voting_member(&self) -> bool {
        self.voting_member
    }

    /// Replace the peer set from a server configuration. The local node
    /// is tracked through its voting flag, not the peer map.
    pub fn update_peer_ids(&mut self, server_config: &ServerConfiguration) {
        self.peers = server_config
            .all_ids()
            .filter(|id| **id != self.id)
            .map(|id| {
                (
                    id.clone(),
                    PeerInfo {
                        id: id.clone(),
                        voting: server_config.is_voting(id),
                    },
                )
            })
            .collect();
        self.voting_member = server_config.is_voting(&self.id);
    }

    pub fn peer_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.peers.keys()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Current membership as a server configuration, or None when no
    /// peers are known.
    pub fn peer_server_info(&self, include_self: bool) -> Option<ServerConfiguration> {
        if self.peers.is_empty() {
            return None;
        }

        let mut voting = Vec::new();
        let mut non_voting = Vec::new();
        for peer in self.peers.values() {
            if peer.voting {
                voting.push(peer.id.clone());
            } else {
                non_voting.push(peer.id.clone());
            }
        }
        if include_self {
            if self.voting_member {
                voting.push(self.id.clone());
            } else {
                non_voting.push(self.id.clone());
            }
        }
        Some(ServerConfiguration::new(voting, non_voting))
    }
}
