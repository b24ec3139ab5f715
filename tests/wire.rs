use std::time::Duration;

use duostore::client::{self, WireError};
use duostore::{
    ReadQuery, RegistryServer, ReplicaSet, ReplicationMode, ServiceRegistry, StoreServer, Value,
    WriteOperation,
};
use tempfile::TempDir;
use tokio::net::TcpStream;

const STORE_ADDR: &str = "127.0.0.1:6400";
const REGISTRY_ADDR: &str = "127.0.0.1:6401";

async fn connect(addr: &str) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

// The store front and registry serve one request per connection, so every
// call below dials a fresh stream the way the CLI does.
#[tokio::test]
async fn end_to_end_over_the_wire() {
    let dir = TempDir::new().unwrap();
    let primary = dir.path().join("primary.db");
    let mirror = dir.path().join("mirror.db");

    let replica = ReplicaSet::open(&primary, &mirror, ReplicationMode::SyncDualWrite).unwrap();
    let store = StoreServer::new(replica, STORE_ADDR.parse().unwrap());
    tokio::spawn(async move { store.run().await.unwrap() });

    let registry = ServiceRegistry::from_endpoints([STORE_ADDR, "127.0.0.1:6499"]);
    let registry_server = RegistryServer::new(registry, REGISTRY_ADDR.parse().unwrap());
    tokio::spawn(async move { registry_server.run().await.unwrap() });

    // Let the servers start up.
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Discover the active store front through the registry, as a routing
    // client would.
    let endpoint = client::get_server(&mut connect(REGISTRY_ADDR).await)
        .await
        .unwrap();
    assert_eq!(endpoint, STORE_ADDR);

    client::execute(
        &mut connect(&endpoint).await,
        WriteOperation::new("CREATE TABLE orders (id INTEGER, total REAL)", vec![]),
    )
    .await
    .unwrap();
    let ack = client::execute(
        &mut connect(&endpoint).await,
        WriteOperation::new(
            "INSERT INTO orders (id, total) VALUES (?1, ?2)",
            vec![Value::Integer(1), Value::Real(99.5)],
        ),
    )
    .await
    .unwrap();
    assert_eq!(ack.rows_affected, 1);

    let rows = client::query(
        &mut connect(&endpoint).await,
        ReadQuery::new("SELECT id, total FROM orders", vec![]),
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Integer(1)));

    // A mirror divergence must arrive typed, not as an opaque failure.
    std::fs::remove_file(&mirror).unwrap();
    let err = client::execute(
        &mut connect(&endpoint).await,
        WriteOperation::new(
            "INSERT INTO orders (id, total) VALUES (?1, ?2)",
            vec![Value::Integer(2), Value::Real(10.0)],
        ),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<WireError>(),
        Some(WireError::MirrorWriteFailed(_))
    ));

    // On-demand reconciliation brings the mirror back in step.
    client::sync(&mut connect(&endpoint).await).await.unwrap();
    let rows = client::query(
        &mut connect(&endpoint).await,
        ReadQuery::new("SELECT id FROM orders ORDER BY id", vec![]),
    )
    .await
    .unwrap();
    assert_eq!(rows.len(), 2);

    // Redirect traffic away from the store front and watch resolution move.
    let entries = client::update_server(&mut connect(REGISTRY_ADDR).await, 1, false)
        .await
        .unwrap();
    assert!(!entries[0].active);
    let endpoint = client::get_server(&mut connect(REGISTRY_ADDR).await)
        .await
        .unwrap();
    assert_eq!(endpoint, "127.0.0.1:6499");

    // Unknown ids come back as the registry's typed error.
    let err = client::update_server(&mut connect(REGISTRY_ADDR).await, 99, true)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<WireError>(),
        Some(WireError::UnknownEndpoint(99))
    ));
}
