use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::oneshot,
};
use tracing::{debug, error};

use crate::net::{
    GetResponse, ListResponse, NetError, NetReadExt, NetWriteExt, RemoveResponse, Request,
    SetResponse,
};
use crate::storage::{Options, Storage, StorageError};

/// The `ServerError` type for the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// An IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A codec error.
    #[error("Codec error: {0}")]
    Codec(#[from] NetError),

    /// Mutex poisoned error.
    #[error("A mutex was poisoned: {0}")]
    MutexPoisoned(String),
}

impl<T> From<PoisonError<MutexGuard<'_, T>>> for ServerError {
    fn from(err: PoisonError<MutexGuard<'_, T>>) -> Self {
        ServerError::MutexPoisoned(err.to_string())
    }
}

/// The `ServerResult` type for the server.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Runs the caskdb server at the given address over a store in the given
/// directory, until the stop signal fires.
pub async fn run_server(
    addr: SocketAddr,
    dir: PathBuf,
    options: Options,
    rx: oneshot::Receiver<()>,
) -> ServerResult<()> {
    let listener = TcpListener::bind(addr).await?;
    let storage = options.open(dir)?;
    listen(listener, storage, rx).await
}

async fn listen<S: Storage + Send + 'static>(
    listener: TcpListener,
    storage: S,
    rx: oneshot::Receiver<()>,
) -> ServerResult<()> {
    let storage = Arc::new(Mutex::new(storage));
    select! {
        _ = async {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(s) => s,
                    Err(e) => {
                        error!("error accepting connection: {}", e);
                        continue;
                    }
                };
                let storage = storage.clone();
                tokio::spawn(async move {
                    match serve(storage, stream).await {
                        Ok(addr) => debug!("{}: connection closed", addr),
                        Err(e) => error!("error serving connection: {}", e),
                    }
                });
            }
        } => {},
        _ = rx => {},
    };
    Ok(())
}

async fn serve<S: Storage>(
    storage: Arc<Mutex<S>>,
    stream: TcpStream,
) -> ServerResult<SocketAddr> {
    let peer_addr = stream.peer_addr()?;
    let (mut reader, mut writer) = stream.into_split();
    debug!("{}: connection established", peer_addr);
    loop {
        let request = if let Some(r) = reader.read::<Request>().await? {
            r
        } else {
            return Ok(peer_addr);
        };
        match request {
            Request::Get { key } => {
                debug!("{}: get {:?}", peer_addr, String::from_utf8_lossy(&key));
                let response = match storage.lock()?.get(&key) {
                    Ok(value) => GetResponse::Ok(value),
                    Err(e) => GetResponse::Err(e.to_string()),
                };
                writer.write(response).await?;
            }
            Request::Set { key, value } => {
                debug!("{}: set {:?}", peer_addr, String::from_utf8_lossy(&key));
                let response = match storage.lock()?.set(&key, &value) {
                    Ok(()) => SetResponse::Ok(()),
                    Err(e) => SetResponse::Err(e.to_string()),
                };
                writer.write(response).await?;
            }
            Request::Remove { key } => {
                debug!("{}: remove {:?}", peer_addr, String::from_utf8_lossy(&key));
                let response = match storage.lock()?.remove(&key) {
                    Ok(()) => RemoveResponse::Ok(()),
                    Err(e) => RemoveResponse::Err(e.to_string()),
                };
                writer.write(response).await?;
            }
            Request::List => {
                debug!("{}: list", peer_addr);
                let response = match storage.lock() {
                    Ok(storage) => ListResponse::Ok(storage.list_keys()),
                    Err(e) => ListResponse::Err(e.to_string()),
                };
                writer.write(response).await?;
            }
        }
    }
}
