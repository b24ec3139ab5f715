use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::client::{read_frame, write_frame, Request, Response, WireError};
use crate::ReplicaSet;

/// Fronts a [`ReplicaSet`] on a TCP listener, one task per connection.
///
/// The server has no awareness of what the statements it relays mean;
/// translating incoming requests into operations is the routing layer's
/// concern.
#[derive(Clone)]
pub struct StoreServer {
    pub replica: Arc<ReplicaSet>,
    pub addr: SocketAddr,
}

impl StoreServer {
    pub fn new(replica: ReplicaSet, addr: SocketAddr) -> Self {
        Self {
            replica: Arc::new(replica),
            addr,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("store front listening on {}", self.addr);
        info!(
            "duostore-server version: {}, mode: {:?}",
            env!("CARGO_PKG_VERSION"),
            self.replica.mode(),
        );
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("connection established: {peer}");
            let replica = self.replica.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, replica).await {
                    warn!(error = %e, "connection handling failed");
                }
            });
        }
    }
}

/// One request per connection. Store operations block on I/O, so they run
/// off the accept loop's executor threads.
async fn handle_connection(mut stream: TcpStream, replica: Arc<ReplicaSet>) -> anyhow::Result<()> {
    let request: Request = read_frame(&mut stream).await?;
    let response = match request {
        Request::Execute(op) => {
            let replica = replica.clone();
            match tokio::task::spawn_blocking(move || replica.write(&op)).await? {
                Ok(ack) => Response::Ack(ack),
                Err(e) => Response::Error(WireError::from(&e)),
            }
        }
        Request::Query(query) => {
            let replica = replica.clone();
            match tokio::task::spawn_blocking(move || replica.read(&query)).await? {
                Ok(rows) => Response::Rows(rows),
                Err(e) => Response::Error(WireError::from(&e)),
            }
        }
        Request::Sync => {
            let replica = replica.clone();
            match tokio::task::spawn_blocking(move || replica.reconcile()).await? {
                Ok(()) => Response::Synced,
                Err(e) => Response::Error(WireError::from(&e)),
            }
        }
    };
    write_frame(&mut stream, &response).await
}
