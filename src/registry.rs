//! Advisory endpoint bookkeeping.
//!
//! The registry answers "which endpoint should take traffic" for a small,
//! statically provisioned set of candidates. It performs no health probing
//! of its own: flags change only through [`ServiceRegistry::set_active`],
//! driven by an operator or an external health check. The entry list lives
//! in process memory and resets on restart.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::client::{read_frame, write_frame, RegistryRequest, RegistryResponse, WireError};
use crate::{Error, Result};

/// One candidate service endpoint. `endpoint` is an opaque URI; the
/// registry never dials it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: u32,
    pub endpoint: String,
    pub active: bool,
}

/// The single owner of the entry list. All reads and toggles go through
/// this handle; the list itself is never handed out for direct mutation.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    entries: Arc<RwLock<Vec<RegistryEntry>>>,
}

impl ServiceRegistry {
    /// Provision the registry from static configuration. Entry ids must be
    /// unique; provisioning order is what [`ServiceRegistry::get_active`]
    /// resolution follows.
    pub fn new(entries: Vec<RegistryEntry>) -> Result<Self> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|other| other.id == entry.id) {
                return Err(Error::DuplicateEndpointId(entry.id));
            }
        }
        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Provision from a plain endpoint list: ids are assigned from 1 in
    /// order and every entry starts active.
    pub fn from_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = endpoints
            .into_iter()
            .enumerate()
            .map(|(i, endpoint)| RegistryEntry {
                id: i as u32 + 1,
                endpoint: endpoint.into(),
                active: true,
            })
            .collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// The endpoint of the first entry in provisioning order whose flag is
    /// set. More than one entry may be active at once; resolution stays
    /// deterministic by always taking the first match.
    pub fn get_active(&self) -> Result<String> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .find(|entry| entry.active)
            .map(|entry| entry.endpoint.clone())
            .ok_or(Error::NoActiveEndpoint)
    }

    /// Flip exactly the named entry's flag and return the updated list.
    /// Other entries are left alone, so several can be active at once.
    pub fn set_active(&self, id: u32, active: bool) -> Result<Vec<RegistryEntry>> {
        let mut entries = self.entries.write().unwrap();
        match entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.active = active;
                Ok(entries.clone())
            }
            None => Err(Error::UnknownEndpoint(id)),
        }
    }

    /// Snapshot of the current entry list.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.entries.read().unwrap().clone()
    }
}

/// Serves the registry contract over the wire protocol in [`crate::client`],
/// one task per connection.
#[derive(Clone)]
pub struct RegistryServer {
    pub registry: ServiceRegistry,
    pub addr: SocketAddr,
}

impl RegistryServer {
    pub fn new(registry: ServiceRegistry, addr: SocketAddr) -> Self {
        Self { registry, addr }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("registry listening on {}", self.addr);
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("registry connection established: {peer}");
            let registry = self.registry.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, registry).await {
                    warn!(error = %e, "registry connection failed");
                }
            });
        }
    }
}

async fn handle_connection(mut stream: TcpStream, registry: ServiceRegistry) -> anyhow::Result<()> {
    let request: RegistryRequest = read_frame(&mut stream).await?;
    let response = match request {
        RegistryRequest::GetServer => match registry.get_active() {
            Ok(endpoint) => RegistryResponse::Server { endpoint },
            Err(e) => RegistryResponse::Error(WireError::from(&e)),
        },
        RegistryRequest::UpdateServer { id, active } => match registry.set_active(id, active) {
            Ok(entries) => {
                info!(id, active, "endpoint flag updated");
                RegistryResponse::Entries(entries)
            }
            Err(e) => RegistryResponse::Error(WireError::from(&e)),
        },
    };
    write_frame(&mut stream, &response).await
}
