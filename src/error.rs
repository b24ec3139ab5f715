use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to open store at {location}: {source}")]
    Connection {
        location: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("write statement failed: {0}")]
    WriteFailed(#[source] rusqlite::Error),

    #[error("query failed: {0}")]
    QueryFailed(#[source] rusqlite::Error),

    #[error("closing store handle failed: {0}")]
    CloseFailed(#[source] rusqlite::Error),

    #[error("primary write failed, mirror untouched: {0}")]
    PrimaryWriteFailed(#[source] Box<Error>),

    #[error("mirror write failed after primary commit, stores have diverged: {0}")]
    MirrorWriteFailed(#[source] Box<Error>),

    #[error("read unavailable, primary and mirror are both unreachable")]
    ReadUnavailable,

    #[error("snapshot of primary onto mirror failed: {0}")]
    SnapshotFailed(#[source] rusqlite::Error),

    #[error("no active endpoint in the registry")]
    NoActiveEndpoint,

    #[error("unknown endpoint id: {0}")]
    UnknownEndpoint(u32),

    #[error("duplicate endpoint id: {0}")]
    DuplicateEndpointId(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to serialize: {0}")]
    Encoding(#[from] bincode::Error),
}
