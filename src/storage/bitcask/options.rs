use std::path::Path;

use crate::storage::StorageResult;

use super::Bitcask;

const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Configuration for a [`Bitcask`] instance.
///
/// ```rust
/// # use caskdb::{Options, SyncStrategy};
/// let temp_dir = tempfile::TempDir::new().unwrap();
/// let store = Options::default()
///     .sync(SyncStrategy::Fsync)
///     .max_file_size(64 * 1024)
///     .to_owned()
///     .open(temp_dir.path())
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    pub(super) sync: SyncStrategy,
    pub(super) max_file_size: u64,
    pub(super) verify_reads: bool,
}

/// Controls how far each write is pushed towards the disk before `set`
/// returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Writes stay in the user-space buffer; the operating system decides
    /// when they reach disk. Reads of the active file still observe them.
    None,
    /// Flush user-space buffers to the operating system after every write.
    Flush,
    /// Flush and `fsync` after every write.
    Fsync,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sync: SyncStrategy::Flush,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            verify_reads: false,
        }
    }
}

impl Options {
    /// Opens a `Bitcask` instance at the given path with these options.
    pub fn open<P: AsRef<Path>>(self, path: P) -> StorageResult<Bitcask> {
        Bitcask::open_with(path.as_ref(), self)
    }

    /// Set the synchronization strategy. Default `SyncStrategy::Flush`.
    pub fn sync(&mut self, sync: SyncStrategy) -> &mut Self {
        self.sync = sync;
        self
    }

    /// Set the size at which the active data file rolls over to a new id.
    /// Default 2 GiB.
    pub fn max_file_size(&mut self, max_file_size: u64) -> &mut Self {
        self.max_file_size = max_file_size;
        self
    }

    /// Verify the stored checksum on every read instead of trusting the
    /// load-time validation. Default `false`.
    pub fn verify_reads(&mut self, verify_reads: bool) -> &mut Self {
        self.verify_reads = verify_reads;
        self
    }
}
