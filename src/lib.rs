//! A two-node replicated storage front: a primary store and its mirror kept
//! consistent by synchronous dual-write or scheduled snapshot replication,
//! reads served with failover between them, and an advisory registry that
//! redirects traffic between endpoints.

use std::time::Duration;

pub mod client;
pub mod error;
pub mod registry;
pub mod replication;
pub mod server;
pub mod store;

pub use error::Error;
pub use registry::{RegistryEntry, RegistryServer, ServiceRegistry};
pub use replication::{ReplicaSet, ReplicationMode, ReplicatorStatus, SnapshotReplicator};
pub use server::StoreServer;
pub use store::{Ack, ReadQuery, Row, StoreHandle, Value, WriteOperation};

pub type Result<T> = std::result::Result<T, Error>;

/// Default period between snapshot cycles in asynchronous replication mode.
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(5);
