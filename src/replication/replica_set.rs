use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::store::{Ack, ReadQuery, Row, StoreHandle, WriteOperation};
use crate::{Error, ReplicationMode, Result};

/// Owns the primary and mirror store locations and applies the configured
/// replication strategy to every write and read.
///
/// The set holds no open connections of its own. Each operation opens a
/// fresh [`StoreHandle`] and releases it before returning, so a `ReplicaSet`
/// can be shared freely across concurrent tasks.
#[derive(Debug, Clone)]
pub struct ReplicaSet {
    primary: PathBuf,
    mirror: PathBuf,
    mode: ReplicationMode,
}

impl ReplicaSet {
    /// Provision both stores, creating empty files where missing, and return
    /// the set. This is the only point where store files are created; the
    /// per-operation path refuses to, so a store that disappears at runtime
    /// reads as unreachable rather than silently empty.
    pub fn open(
        primary: impl Into<PathBuf>,
        mirror: impl Into<PathBuf>,
        mode: ReplicationMode,
    ) -> Result<Self> {
        let primary = primary.into();
        let mirror = mirror.into();
        StoreHandle::create(&primary)?.close()?;
        StoreHandle::create(&mirror)?.close()?;
        Ok(Self {
            primary,
            mirror,
            mode,
        })
    }

    pub fn mode(&self) -> ReplicationMode {
        self.mode
    }

    pub fn primary_location(&self) -> &Path {
        &self.primary
    }

    pub fn mirror_location(&self) -> &Path {
        &self.mirror
    }

    /// Apply a write operation per the configured mode.
    ///
    /// The primary is always written first and a primary failure aborts the
    /// whole operation, so the mirror can trail the primary but never lead
    /// it. In dual-write mode a mirror failure after the primary has
    /// committed is surfaced as [`Error::MirrorWriteFailed`] rather than
    /// swallowed: the caller learns the stores have diverged even though the
    /// primary holds the mutation. The two executions are sequential, never
    /// parallel, and span no cross-store transaction.
    pub fn write(&self, op: &WriteOperation) -> Result<Ack> {
        let ack =
            Self::apply(&self.primary, op).map_err(|e| Error::PrimaryWriteFailed(Box::new(e)))?;

        if self.mode == ReplicationMode::SyncDualWrite {
            if let Err(e) = Self::apply(&self.mirror, op) {
                warn!(
                    mirror = %self.mirror.display(),
                    error = %e,
                    "mirror write failed after primary commit"
                );
                return Err(Error::MirrorWriteFailed(Box::new(e)));
            }
        }
        Ok(ack)
    }

    /// Serve a read, falling back to the mirror when the primary cannot be
    /// reached.
    ///
    /// The fallback is a single attempt with no backoff. It only covers
    /// connectivity failures: a query that fails on a reachable store is the
    /// caller's problem and propagates as-is.
    pub fn read(&self, query: &ReadQuery) -> Result<Vec<Row>> {
        match StoreHandle::open(&self.primary) {
            Ok(handle) => {
                let rows = handle.query(query)?;
                handle.close()?;
                Ok(rows)
            }
            Err(e) => {
                debug!(error = %e, "primary unreachable, retrying read against mirror");
                let handle = StoreHandle::open(&self.mirror).map_err(|_| Error::ReadUnavailable)?;
                let rows = handle.query(query)?;
                handle.close()?;
                Ok(rows)
            }
        }
    }

    /// Copy the primary's current state over the mirror immediately.
    ///
    /// This is the out-of-band reconciliation path for the divergence that a
    /// [`Error::MirrorWriteFailed`] reports; the scheduled
    /// [`SnapshotReplicator`](crate::SnapshotReplicator) performs the same
    /// copy on a timer.
    pub fn reconcile(&self) -> Result<()> {
        super::snapshot::snapshot(&self.primary, &self.mirror)
    }

    fn apply(location: &Path, op: &WriteOperation) -> Result<Ack> {
        let handle = StoreHandle::open(location)?;
        let ack = handle.execute(op)?;
        handle.close()?;
        Ok(ack)
    }
}
