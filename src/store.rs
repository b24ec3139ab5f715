use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, ToSql};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How long a handle waits on another writer's lock before reporting failure.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A single positional parameter within a statement, or a single column value
/// within a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Interpret a command-line literal: integers and reals parse to their
    /// typed forms, `null` (any case) to SQL NULL, anything else stays text.
    pub fn parse_literal(raw: &str) -> Value {
        if raw.eq_ignore_ascii_case("null") {
            return Value::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Integer(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Value::Real(f);
        }
        Value::Text(raw.to_string())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(t) => write!(f, "{t}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// An opaque unit of mutation: a statement template and its positional
/// parameters. The replication layer attaches no meaning to the statement
/// itself; it is applied verbatim to one or both stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOperation {
    pub statement: String,
    pub params: Vec<Value>,
}

impl WriteOperation {
    pub fn new(statement: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            statement: statement.into(),
            params,
        }
    }
}

/// Same shape as [`WriteOperation`], but expected to produce rows and leave
/// store state untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadQuery {
    pub statement: String,
    pub params: Vec<Value>,
}

impl ReadQuery {
    pub fn new(statement: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            statement: statement.into(),
            params,
        }
    }
}

/// Acknowledgement of an applied write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub rows_affected: u64,
}

/// One result row: column name and value pairs in select order, immutable
/// once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// The value under `column`, or [`None`] when the row has no such column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &(String, Value)> {
        self.columns.iter()
    }
}

/// A connection to one physical backing store.
///
/// Handles follow a scoped acquisition discipline: one is opened per
/// operation and released before the operation returns. Dropping a handle
/// closes the underlying connection on error paths; [`StoreHandle::close`]
/// does the same on the happy path while surfacing any error the store
/// reports on shutdown.
pub struct StoreHandle {
    location: PathBuf,
    conn: Connection,
}

impl StoreHandle {
    /// Open a handle to an existing store. Failing to open means the
    /// location does not currently name a reachable store, which doubles as
    /// the liveness probe for failover decisions.
    pub fn open(location: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_flags(location.into(), OpenFlags::SQLITE_OPEN_READ_WRITE)
    }

    /// Create the store file if it does not yet exist, then open it. Only
    /// used when provisioning stores at startup, never on the per-operation
    /// path.
    pub fn create(location: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_flags(
            location.into(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
    }

    fn open_with_flags(location: PathBuf, flags: OpenFlags) -> Result<Self> {
        let conn = Connection::open_with_flags(&location, flags).map_err(|source| {
            Error::Connection {
                location: location.clone(),
                source,
            }
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|source| Error::Connection {
                location: location.clone(),
                source,
            })?;
        Ok(Self { location, conn })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Apply one write operation. Durability is whatever the backing store
    /// provides for a single statement; atomicity across stores is the
    /// replica set's concern, not the handle's.
    pub fn execute(&self, op: &WriteOperation) -> Result<Ack> {
        let rows_affected = self
            .conn
            .execute(&op.statement, params_from_iter(op.params.iter()))
            .map_err(Error::WriteFailed)? as u64;
        Ok(Ack { rows_affected })
    }

    /// Run a read-only query and collect its rows.
    pub fn query(&self, query: &ReadQuery) -> Result<Vec<Row>> {
        let mut stmt = self
            .conn
            .prepare(&query.statement)
            .map_err(Error::QueryFailed)?;
        let names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        let mut rows = stmt
            .query(params_from_iter(query.params.iter()))
            .map_err(Error::QueryFailed)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(Error::QueryFailed)? {
            let mut columns = Vec::with_capacity(names.len());
            for (idx, name) in names.iter().enumerate() {
                let value = row.get_ref(idx).map_err(Error::QueryFailed)?;
                columns.push((name.clone(), Value::from(value)));
            }
            out.push(Row { columns });
        }
        Ok(out)
    }

    /// Release the handle, surfacing any error raised on close.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, source)| Error::CloseFailed(source))
    }
}
