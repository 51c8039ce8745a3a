use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{
    tcp::{OwnedReadHalf, OwnedWriteHalf},
    TcpStream,
};

use crate::net::{
    GetResponse, ListResponse, NetError, NetReadExt, NetWriteExt, RemoveResponse, Request,
    SetResponse,
};

/// The `ClientError` type for `Client`.
#[derive(Error, Debug)]
pub enum ClientError {
    /// An IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A codec error.
    #[error("Codec error: {0}")]
    Codec(#[from] NetError),

    /// A server error.
    #[error("Server error: {0}")]
    Server(String),

    /// The server closed the connection mid-request.
    #[error("Connection closed by the server")]
    Disconnected,
}

/// The `ClientResult` type for `Client`.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// A client for the caskdb server, holding one connection.
pub struct Client {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl Client {
    /// Connects to the caskdb server at the given address.
    pub async fn connect(addr: SocketAddr) -> ClientResult<Client> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Client { reader, writer })
    }

    /// Gets the value of a given key.
    pub async fn get(&mut self, key: Vec<u8>) -> ClientResult<Option<Vec<u8>>> {
        self.writer.write(Request::Get { key }).await?;
        match self.reader.read::<GetResponse>().await? {
            Some(GetResponse::Ok(value)) => Ok(value),
            Some(GetResponse::Err(e)) => Err(ClientError::Server(e)),
            None => Err(ClientError::Disconnected),
        }
    }

    /// Sets the value of a key.
    pub async fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> ClientResult<()> {
        self.writer.write(Request::Set { key, value }).await?;
        match self.reader.read::<SetResponse>().await? {
            Some(SetResponse::Ok(())) => Ok(()),
            Some(SetResponse::Err(e)) => Err(ClientError::Server(e)),
            None => Err(ClientError::Disconnected),
        }
    }

    /// Removes a given key.
    pub async fn remove(&mut self, key: Vec<u8>) -> ClientResult<()> {
        self.writer.write(Request::Remove { key }).await?;
        match self.reader.read::<RemoveResponse>().await? {
            Some(RemoveResponse::Ok(())) => Ok(()),
            Some(RemoveResponse::Err(e)) => Err(ClientError::Server(e)),
            None => Err(ClientError::Disconnected),
        }
    }

    /// Lists all keys.
    pub async fn list(&mut self) -> ClientResult<Vec<Vec<u8>>> {
        self.writer.write(Request::List).await?;
        match self.reader.read::<ListResponse>().await? {
            Some(ListResponse::Ok(keys)) => Ok(keys),
            Some(ListResponse::Err(e)) => Err(ClientError::Server(e)),
            None => Err(ClientError::Disconnected),
        }
    }
}
