//! Replication keeps a primary store and its mirror consistent through one
//! of two strategies.
//!
//! The [`ReplicaSet`] either applies every accepted write to both stores
//! before acknowledging it (synchronous dual-write), or writes to the
//! primary alone while a [`SnapshotReplicator`] copies the whole primary
//! state onto the mirror on a fixed schedule.

mod replica_set;
mod snapshot;

pub use replica_set::ReplicaSet;
pub use snapshot::{ReplicatorStatus, SnapshotReplicator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReplicationMode {
    /// Every write lands on both stores before it is acknowledged.
    SyncDualWrite,

    /// Writes land on the primary only; the mirror catches up on each
    /// snapshot cycle.
    AsyncSnapshot,
}

impl From<ReplicationMode> for clap::builder::OsStr {
    fn from(value: ReplicationMode) -> Self {
        match value {
            ReplicationMode::SyncDualWrite => "sync-dual-write".into(),
            ReplicationMode::AsyncSnapshot => "async-snapshot".into(),
        }
    }
}
