mod bitcask;

use std::{io, path::PathBuf, time::SystemTimeError};

use thiserror::Error;

pub use bitcask::{Bitcask, Options, SyncStrategy};

/// The interface a storage engine exposes to the server and the CLI.
///
/// Keys and values are raw bytes; the engine imposes no encoding on either.
pub trait Storage {
    /// Gets the value of a given key.
    ///
    /// Returns `None` if the given key does not exist.
    fn get(&mut self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Sets the value of a key.
    ///
    /// If the key already exists, the previous value will be overwritten.
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Removes a given key.
    ///
    /// Returns `StorageError::KeyNotFound` if the key does not exist.
    fn remove(&mut self, key: &[u8]) -> StorageResult<()>;

    /// Returns `true` if the key is live.
    fn contains(&self, key: &[u8]) -> bool;

    /// Number of live keys.
    fn len(&self) -> usize;

    /// Returns `true` if the store holds no live keys.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lists all live keys, in no particular order.
    fn list_keys(&self) -> Vec<Vec<u8>>;
}

/// The `StorageError` type for `Storage`.
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO error.
    #[error("An IO error occurred: {0}")]
    Io(#[from] io::Error),

    /// SystemTime error.
    #[error("A system time error occurred: {0}")]
    SystemTime(#[from] SystemTimeError),

    /// Key not found error.
    #[error("Key not found")]
    KeyNotFound,

    /// Another live process holds the directory's write lock.
    #[error("Bitcask is locked by process {0}")]
    Locked(u32),

    /// Key exceeds what the 16-bit length field can represent.
    #[error("Key of {0} bytes exceeds the maximum key size")]
    InvalidKey(usize),

    /// Value violates the size or content rules of the data file format.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// CRC or structural mismatch detected in a data file.
    #[error("Data corruption in {} at offset {offset}: {reason}", file.display())]
    Corruption {
        /// The data file in which the mismatch was found.
        file: PathBuf,
        /// Byte offset of the entry that failed validation.
        offset: u64,
        /// What failed to validate.
        reason: String,
    },

    /// Unexpected error.
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// The `Result` type for `Storage`.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
