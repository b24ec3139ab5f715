use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use duostore::{ReplicaSet, ReplicationMode, SnapshotReplicator, StoreServer};
use tokio::signal::ctrl_c;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    #[clap(long, default_value = "127.0.0.1:4001")]
    addr: SocketAddr,

    /// Location of the authoritative store.
    #[clap(long, default_value = "duostore_primary.db")]
    primary: PathBuf,

    /// Location of the mirror kept in step with the primary.
    #[clap(long, default_value = "duostore_mirror.db")]
    mirror: PathBuf,

    #[clap(long, default_value = ReplicationMode::SyncDualWrite)]
    mode: ReplicationMode,

    /// Seconds between snapshot cycles in async-snapshot mode.
    #[clap(long, default_value_t = duostore::DEFAULT_SNAPSHOT_INTERVAL.as_secs())]
    snapshot_interval: u64,

    #[clap(long, default_value = "info", env = "DUOSTORE_LOG")]
    log_level: tracing_subscriber::filter::LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();
    tracing_subscriber::fmt()
        .with_max_level(app.log_level)
        .init();

    let replica = ReplicaSet::open(&app.primary, &app.mirror, app.mode)?;
    if app.mode == ReplicationMode::AsyncSnapshot {
        let replicator = SnapshotReplicator::new(
            &app.primary,
            &app.mirror,
            Duration::from_secs(app.snapshot_interval),
        );
        info!(
            interval_secs = app.snapshot_interval,
            "starting snapshot replicator"
        );
        tokio::spawn(replicator.run());
    }

    let server = StoreServer::new(replica, app.addr);
    tokio::spawn(async move { server.run().await.unwrap() });

    match ctrl_c().await {
        Ok(_) => info!("received shutdown signal"),
        Err(e) => error!("error receiving ctrl-c: {e}"),
    };

    Ok(())
}
