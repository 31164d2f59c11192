// Core Raft Types
//
// Fundamental types shared across the recovery engine:
// - Term and log index aliases
// - Election term information
// - The payload taxonomy carried by replicated log entries
// - Cluster server configuration (voting / non-voting membership)

use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Node identifier within the cluster
pub type NodeId = String;

/// Raft term number (logical clock)
pub type Term = u64;

/// Log index type
pub type LogIndex = u64;

/// Sentinel for "no log entry": real entries start at index 1.
pub const NO_INDEX: LogIndex = 0;

/// Sentinel passed to snapshot capture when the replicated-to-all index
/// is unknown.
pub const NO_REPLICATED_INDEX: i64 = -1;

/// Election term information persisted alongside the journal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermInfo {
    /// Current election term
    pub term: Term,

    /// Candidate this node voted for in the current term, if any
    pub voted_for: Option<NodeId>,
}

impl TermInfo {
    pub fn new(term: Term, voted_for: Option<NodeId>) -> Self {
        Self { term, voted_for }
    }
}

/// The (index, term) pair identifying a position in the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub index: LogIndex,
    pub term: Term,
}

impl EntryMeta {
    pub fn new(index: LogIndex, term: Term) -> Self {
        Self { index, term }
    }
}

/// Cluster membership carried in the log and in snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfiguration {
    /// Voting members
    pub voting: BTreeSet<NodeId>,

    /// Non-voting members
    pub non_voting: BTreeSet<NodeId>,

    /// Set when this configuration was read back from a legacy
    /// serialization format and must be re-persisted.
    #[serde(skip)]
    pub migrated: bool,
}

impl ServerConfiguration {
    pub fn new(
        voting: impl IntoIterator<Item = NodeId>,
        non_voting: impl IntoIterator<Item = NodeId>,
    ) -> Self {
        Self {
            voting: voting.into_iter().collect(),
            non_voting: non_voting.into_iter().collect(),
            migrated: false,
        }
    }

    pub fn with_migrated(mut self, migrated: bool) -> Self {
        self.migrated = migrated;
        self
    }

    /// All member IDs, voting and non-voting
    pub fn all_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.voting.iter().chain(self.non_voting.iter())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.voting.contains(id) || self.non_voting.contains(id)
    }

    pub fn is_voting(&self, id: &str) -> bool {
        self.voting.contains(id)
    }

    /// Approximate in-memory size of the configuration in bytes
    pub fn size(&self) -> u64 {
        self.all_ids().map(|id| id.len() as u64).sum()
    }
}

/// Payload carried by a replicated log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Opaque application command bytes
    ApplicationData {
        data: Bytes,
        /// Whether this payload is meant to be durable. Non-persistent
        /// payloads showing up during recovery mean the journal predates
        /// a persistence-mode change.
        persistent: bool,
        /// Whether this payload was read back from a legacy serialization
        /// format and must be re-persisted.
        migrated: bool,
    },

    /// Cluster membership change
    ServerConfiguration(ServerConfiguration),

    /// Leader no-op, appended on leadership change
    NoOp,
}

impl Payload {
    /// Convenience constructor for durable application data
    pub fn application(data: impl Into<Bytes>) -> Self {
        Payload::ApplicationData {
            data: data.into(),
            persistent: true,
            migrated: false,
        }
    }

    pub fn is_persistent(&self) -> bool {
        match self {
            Payload::ApplicationData { persistent, .. } => *persistent,
            Payload::ServerConfiguration(_) => true,
            Payload::NoOp => true,
        }
    }

    pub fn is_migrated_format(&self) -> bool {
        match self {
            Payload::ApplicationData { migrated, .. } => *migrated,
            Payload::ServerConfiguration(config) => config.migrated,
            Payload::NoOp => false,
        }
    }

    /// Payload size in bytes, used for log accounting
    pub fn size(&self) -> u64 {
        match self {
            Payload::ApplicationData { data, .. } => data.len() as u64,
            Payload::ServerConfiguration(config) => config.size(),
            Payload::NoOp => 0,
        }
    }

    /// Encode the payload for journal storage
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    /// Decode a payload previously written with [`Payload::encode`]
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (payload, _) = bincode::serde::decode_from_slice(data, bincode::config::standard())?;
        Ok(payload)
    }
}
