use clap::Parser;
use duostore::client::{self, Action};
use duostore::{ReadQuery, Value, WriteOperation};
use tokio::net::TcpStream;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    /// Store front address. Resolved through the registry when not given.
    #[clap(long, global = true)]
    server: Option<String>,

    /// Registry address, consulted for server discovery and by the registry
    /// subcommands.
    #[clap(long, global = true, default_value = "127.0.0.1:4000")]
    registry: String,

    #[clap(subcommand)]
    subcmd: Action,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let App {
        server,
        registry,
        subcmd,
    } = App::parse();

    match subcmd {
        Action::Exec { statement, params } => {
            let addr = resolve_server(server, &registry).await?;
            let mut stream = TcpStream::connect(addr).await?;
            let op = WriteOperation::new(statement, parse_params(&params));
            let ack = client::execute(&mut stream, op).await?;
            println!("ok, {} row(s) affected", ack.rows_affected);
        }
        Action::Query { statement, params } => {
            let addr = resolve_server(server, &registry).await?;
            let mut stream = TcpStream::connect(addr).await?;
            let query = ReadQuery::new(statement, parse_params(&params));
            for row in client::query(&mut stream, query).await? {
                let rendered: Vec<String> = row
                    .columns()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect();
                println!("{}", rendered.join(" "));
            }
        }
        Action::Sync => {
            let addr = resolve_server(server, &registry).await?;
            let mut stream = TcpStream::connect(addr).await?;
            client::sync(&mut stream).await?;
            println!("mirror synchronized");
        }
        Action::GetServer => {
            let mut stream = TcpStream::connect(&registry).await?;
            println!("{}", client::get_server(&mut stream).await?);
        }
        Action::SetServer { id, active } => {
            let mut stream = TcpStream::connect(&registry).await?;
            for entry in client::update_server(&mut stream, id, active).await? {
                println!("{} {} active={}", entry.id, entry.endpoint, entry.active);
            }
        }
    }

    Ok(())
}

fn parse_params(raw: &[String]) -> Vec<Value> {
    raw.iter().map(|p| Value::parse_literal(p)).collect()
}

/// Prefer an explicit --server; otherwise ask the registry which endpoint
/// is taking traffic.
async fn resolve_server(server: Option<String>, registry: &str) -> anyhow::Result<String> {
    match server {
        Some(addr) => Ok(addr),
        None => {
            let mut stream = TcpStream::connect(registry).await?;
            client::get_server(&mut stream).await
        }
    }
}
