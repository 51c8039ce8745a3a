#![deny(missing_docs)]
//! An embedded Bitcask key/value store with a small TCP front-end.

mod client;
mod net;
mod server;
mod storage;

pub use client::{Client, ClientError, ClientResult};
pub use net::{NetError, NetResult};
pub use server::{run_server, ServerError, ServerResult};
pub use storage::{Bitcask, Options, Storage, StorageError, StorageResult, SyncStrategy};
