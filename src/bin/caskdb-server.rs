use std::{env::current_dir, net::SocketAddr};

use caskdb::{run_server, Options, ServerResult, SyncStrategy};
use clap::{Parser, ValueEnum};
use tokio::sync::oneshot;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ADDR: &str = "127.0.0.1:4001";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, default_value = DEFAULT_ADDR)]
    addr: SocketAddr,

    #[arg(short, long)]
    sync: Option<SyncMode>,
}

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum)]
enum SyncMode {
    None,
    Flush,
    Fsync,
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    init_tracing();

    let cli = Cli::parse();
    let current_dir = current_dir()?;

    let mut options = Options::default();
    if let Some(sync) = cli.sync {
        options.sync(match sync {
            SyncMode::None => SyncStrategy::None,
            SyncMode::Flush => SyncStrategy::Flush,
            SyncMode::Fsync => SyncStrategy::Fsync,
        });
    }

    info!("caskdb {}", env!("CARGO_PKG_VERSION"));
    info!("working directory: {:?}", current_dir);
    info!("listening on {}", cli.addr);

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            let _ = tx.send(());
        }
    });

    run_server(cli.addr, current_dir, options, rx).await
}

#[cfg(debug_assertions)]
fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();
}

#[cfg(not(debug_assertions))]
fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();
}
