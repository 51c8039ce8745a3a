use futures::sink::SinkExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// The `NetError` type.
#[derive(Error, Debug)]
pub enum NetError {
    /// An IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A bincode error.
    #[error("Serde error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// The `NetResult` type.
pub type NetResult<T> = std::result::Result<T, NetError>;

#[derive(Debug, Serialize, Deserialize)]
pub enum Request {
    Get { key: Vec<u8> },
    Set { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
    List,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum GetResponse {
    Ok(Option<Vec<u8>>),
    Err(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum SetResponse {
    Ok(()),
    Err(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum RemoveResponse {
    Ok(()),
    Err(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum ListResponse {
    Ok(Vec<Vec<u8>>),
    Err(String),
}

/// Helper trait for reading our defined request/response types from a tcp stream.
pub trait NetReadExt {
    /// Reads one length-delimited, bincode-encoded message, or `None` when
    /// the peer has closed the stream.
    async fn read<E: DeserializeOwned>(&mut self) -> NetResult<Option<E>>;
}

/// Helper trait for writing our defined request/response types to a tcp stream.
pub trait NetWriteExt {
    /// Writes one message as a length-delimited, bincode-encoded frame.
    async fn write<E: Serialize>(&mut self, message: E) -> NetResult<()>;
}

impl NetReadExt for OwnedReadHalf {
    async fn read<E: DeserializeOwned>(&mut self) -> NetResult<Option<E>> {
        let mut reader = FramedRead::new(self, LengthDelimitedCodec::new());
        if let Some(ser) = reader.next().await {
            Ok(Some(bincode::deserialize(&ser?)?))
        } else {
            Ok(None)
        }
    }
}

impl NetWriteExt for OwnedWriteHalf {
    async fn write<E: Serialize>(&mut self, message: E) -> NetResult<()> {
        let mut writer = FramedWrite::new(self, LengthDelimitedCodec::new());
        let ser = bincode::serialize(&message)?;
        writer.send(ser.into()).await?;
        writer.flush().await?;
        Ok(())
    }
}
