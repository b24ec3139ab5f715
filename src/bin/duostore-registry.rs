use std::net::SocketAddr;

use clap::Parser;
use duostore::{RegistryServer, ServiceRegistry};
use tokio::signal::ctrl_c;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    #[clap(long, default_value = "127.0.0.1:4000")]
    addr: SocketAddr,

    /// Candidate service endpoints in priority order. Ids are assigned from
    /// 1 and every endpoint starts active.
    #[clap(long, value_delimiter = ',', default_value = "127.0.0.1:4001")]
    endpoints: Vec<String>,

    #[clap(long, default_value = "info", env = "DUOSTORE_LOG")]
    log_level: tracing_subscriber::filter::LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();
    tracing_subscriber::fmt()
        .with_max_level(app.log_level)
        .init();

    let registry = ServiceRegistry::from_endpoints(app.endpoints);
    let server = RegistryServer::new(registry, app.addr);
    tokio::spawn(async move { server.run().await.unwrap() });

    match ctrl_c().await {
        Ok(_) => info!("received shutdown signal"),
        Err(e) => error!("error receiving ctrl-c: {e}"),
    };

    Ok(())
}
