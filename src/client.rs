use clap::Subcommand;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::registry::RegistryEntry;
use crate::store::{Ack, ReadQuery, Row, WriteOperation};
use crate::Error;

/// Upper bound on a single frame body; a peer announcing more than this is
/// broken or hostile.
const MAX_FRAME_BYTES: u64 = 32 * 1024 * 1024;

/// Actions that can be performed by the client.
///
/// These are the operator-facing forms of the wire requests below; the
/// binary translates them into [`Request`]/[`RegistryRequest`] frames.
#[derive(Debug, Subcommand)]
pub enum Action {
    /// Apply a write statement through the replica set.
    Exec {
        statement: String,

        /// Positional parameters; integers, reals and `null` are typed,
        /// anything else is passed as text.
        params: Vec<String>,
    },

    /// Run a read query, failing over to the mirror if the primary is
    /// unreachable.
    Query {
        statement: String,
        params: Vec<String>,
    },

    /// Copy the primary's state over the mirror immediately, outside the
    /// snapshot schedule.
    Sync,

    /// Ask the registry which endpoint is currently taking traffic.
    #[clap(name = "get-server")]
    GetServer,

    /// Flip one registry entry's active flag.
    #[clap(name = "set-server")]
    SetServer {
        id: u32,

        #[clap(action = clap::ArgAction::Set)]
        active: bool,
    },
}

/// Requests understood by the store front server.
#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    Execute(WriteOperation),
    Query(ReadQuery),

    /// Reconcile the mirror with the primary right now, typically after a
    /// surfaced divergence.
    Sync,
}

/// Responses from the store front server.
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ack(Ack),
    Rows(Vec<Row>),
    Synced,
    Error(WireError),
}

/// Requests understood by the registry server.
#[derive(Debug, Serialize, Deserialize)]
pub enum RegistryRequest {
    GetServer,
    UpdateServer { id: u32, active: bool },
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RegistryResponse {
    Server { endpoint: String },
    Entries(Vec<RegistryEntry>),
    Error(WireError),
}

/// The error taxonomy in a form that survives the trip over the wire, so
/// remote callers can match on the same failure classes a local caller
/// would. In particular a mirror divergence stays distinguishable from an
/// outright rejected write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum WireError {
    #[error("unable to reach store: {0}")]
    Connection(String),

    #[error("primary write failed, mirror untouched: {0}")]
    PrimaryWriteFailed(String),

    #[error("mirror write failed after primary commit, stores have diverged: {0}")]
    MirrorWriteFailed(String),

    #[error("read unavailable, primary and mirror are both unreachable")]
    ReadUnavailable,

    #[error("write statement failed: {0}")]
    WriteFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("no active endpoint in the registry")]
    NoActiveEndpoint,

    #[error("unknown endpoint id: {0}")]
    UnknownEndpoint(u32),

    #[error("{0}")]
    Internal(String),
}

impl From<&Error> for WireError {
    fn from(e: &Error) -> Self {
        match e {
            Error::Connection { .. } => WireError::Connection(e.to_string()),
            Error::PrimaryWriteFailed(source) => WireError::PrimaryWriteFailed(source.to_string()),
            Error::MirrorWriteFailed(source) => WireError::MirrorWriteFailed(source.to_string()),
            Error::ReadUnavailable => WireError::ReadUnavailable,
            Error::WriteFailed(source) => WireError::WriteFailed(source.to_string()),
            Error::QueryFailed(source) => WireError::QueryFailed(source.to_string()),
            Error::NoActiveEndpoint => WireError::NoActiveEndpoint,
            Error::UnknownEndpoint(id) => WireError::UnknownEndpoint(*id),
            other => WireError::Internal(other.to_string()),
        }
    }
}

/// Send one length-prefixed bincode frame.
pub async fn write_frame<T, S>(stream: &mut S, payload: &T) -> anyhow::Result<()>
where
    T: Serialize,
    S: AsyncWrite + Unpin,
{
    let data = bincode::serialize(payload)?;
    stream.write_u64(data.len() as u64).await?;
    stream.write_all(&data).await?;
    stream.flush().await?;
    Ok(())
}

/// Receive one length-prefixed bincode frame. The sender provides the size
/// first so the body can be read exactly.
pub async fn read_frame<T, S>(stream: &mut S) -> anyhow::Result<T>
where
    T: DeserializeOwned,
    S: AsyncRead + Unpin,
{
    let size = stream.read_u64().await?;
    anyhow::ensure!(size <= MAX_FRAME_BYTES, "frame of {size} bytes refused");
    let mut buf = vec![0; size as usize];
    stream.read_exact(&mut buf).await?;
    Ok(bincode::deserialize(&buf)?)
}

/// Apply a write operation through the store front behind `stream`.
pub async fn execute(stream: &mut TcpStream, op: WriteOperation) -> anyhow::Result<Ack> {
    write_frame(stream, &Request::Execute(op)).await?;
    match read_frame(stream).await? {
        Response::Ack(ack) => Ok(ack),
        Response::Error(e) => Err(e.into()),
        other => anyhow::bail!("unexpected response: {other:?}"),
    }
}

/// Run a read query through the store front behind `stream`.
pub async fn query(stream: &mut TcpStream, query: ReadQuery) -> anyhow::Result<Vec<Row>> {
    write_frame(stream, &Request::Query(query)).await?;
    match read_frame(stream).await? {
        Response::Rows(rows) => Ok(rows),
        Response::Error(e) => Err(e.into()),
        other => anyhow::bail!("unexpected response: {other:?}"),
    }
}

/// Ask the store front to reconcile its mirror with its primary now.
pub async fn sync(stream: &mut TcpStream) -> anyhow::Result<()> {
    write_frame(stream, &Request::Sync).await?;
    match read_frame(stream).await? {
        Response::Synced => Ok(()),
        Response::Error(e) => Err(e.into()),
        other => anyhow::bail!("unexpected response: {other:?}"),
    }
}

/// Ask the registry which endpoint should take traffic.
pub async fn get_server(stream: &mut TcpStream) -> anyhow::Result<String> {
    write_frame(stream, &RegistryRequest::GetServer).await?;
    match read_frame(stream).await? {
        RegistryResponse::Server { endpoint } => Ok(endpoint),
        RegistryResponse::Error(e) => Err(e.into()),
        other => anyhow::bail!("unexpected response: {other:?}"),
    }
}

/// Toggle one registry entry's active flag; returns the full updated entry
/// list.
pub async fn update_server(
    stream: &mut TcpStream,
    id: u32,
    active: bool,
) -> anyhow::Result<Vec<RegistryEntry>> {
    write_frame(stream, &RegistryRequest::UpdateServer { id, active }).await?;
    match read_frame(stream).await? {
        RegistryResponse::Entries(entries) => Ok(entries),
        RegistryResponse::Error(e) => Err(e.into()),
        other => anyhow::bail!("unexpected response: {other:?}"),
    }
}
