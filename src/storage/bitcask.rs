mod codec;
mod files;
mod lock;
mod options;

use std::{
    collections::{hash_map::Entry, HashMap},
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{debug, info, warn};

use self::{codec::HintRecord, lock::LockFile};
use super::{Storage, StorageError, StorageResult};

pub use self::options::{Options, SyncStrategy};

/// `Bitcask` stores key/value pairs durably on disk using the Bitcask
/// append-only log format.
///
/// The implementation follows the [Bitcask Paper] and keeps the on-disk
/// layout byte-for-byte compatible with Basho's Erlang implementation: data
/// files hold CRC-guarded entries, each data file is paired with a hint file
/// summarising it, and a complete in-memory key directory maps every live key
/// to the location of its most recent value. Reads cost one seek and one
/// sequential read; writes are sequential appends.
///
/// A directory can only be opened for writing by one process at a time,
/// enforced through a PID lock file.
///
/// Example:
///
/// ```rust
/// # use caskdb::{Bitcask, Storage};
/// let temp_dir = tempfile::TempDir::new().unwrap();
/// let mut store = Bitcask::open(temp_dir.path()).unwrap();
/// store.set(b"key", b"value").unwrap();
/// assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
/// ```
///
/// [Bitcask Paper]: https://riak.com/assets/bitcask-intro.pdf
pub struct Bitcask {
    path: PathBuf,
    options: Options,
    keydir: HashMap<Vec<u8>, Slot>,
    readers: HashMap<u64, BufReader<File>>,
    active: ActiveFile,
    write_lock: LockFile,
    sealed: bool,
}

// Location of the latest live entry for one key. Handles are looked up in the
// reader table by id so slots never own a file descriptor.
#[derive(Debug, Clone, Copy)]
struct Slot {
    file_id: u64,
    position: u64,
    size: u32,
    timestamp: u32,
}

struct ActiveFile {
    file_id: u64,
    data: BufWriter<File>,
    hint: BufWriter<File>,
    hint_digest: crc::Digest<'static, u32>,
    position: u64,
    dirty: bool,
}

impl ActiveFile {
    fn create(dir: &Path, file_id: u64) -> io::Result<ActiveFile> {
        Ok(ActiveFile {
            file_id,
            data: BufWriter::new(files::open_appender(&files::data_path(dir, file_id))?),
            hint: BufWriter::new(files::open_appender(&files::hint_path(dir, file_id))?),
            hint_digest: codec::CASK_CRC.digest(),
            position: 0,
            dirty: false,
        })
    }

    // Appends a full data entry plus its hint record. The hint file is left
    // to the writer's buffer; a torn hint is rebuilt from the data file on
    // the next open.
    fn append(
        &mut self,
        key: &[u8],
        entry: &[u8],
        timestamp: u32,
        tombstone: bool,
    ) -> io::Result<Slot> {
        let position = self.position;
        self.data.write_all(entry)?;
        self.position += entry.len() as u64;

        let record = codec::encode_hint_record(&HintRecord {
            timestamp,
            key_size: key.len() as u16,
            entry_size: entry.len() as u32,
            position,
            tombstone,
        })?;
        self.hint.write_all(&record)?;
        self.hint.write_all(key)?;
        self.hint_digest.update(&record);
        self.hint_digest.update(key);

        Ok(Slot {
            file_id: self.file_id,
            position,
            size: entry.len() as u32,
            timestamp,
        })
    }

    /// Flushes the data file and seals the hint file with its trailer record.
    /// After this the pair must never be appended to again.
    fn seal(&mut self) -> io::Result<()> {
        self.data.flush()?;
        let digest = std::mem::replace(&mut self.hint_digest, codec::CASK_CRC.digest());
        let trailer = codec::encode_hint_trailer(digest.finalize())?;
        self.hint.write_all(&trailer)?;
        self.hint.flush()?;
        Ok(())
    }
}

impl Bitcask {
    /// Opens a store at the given path with default options.
    ///
    /// If the path does not exist, it will be created.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Bitcask> {
        Options::default().open(path.into())
    }

    pub(super) fn open_with(path: &Path, options: Options) -> StorageResult<Bitcask> {
        fs::create_dir_all(path)?;

        let file_ids = files::sorted_file_ids(path)?;
        let active_file_id = files::next_file_id(&file_ids);
        let write_lock = LockFile::acquire(
            path,
            lock::WRITE_LOCK_FILE,
            &files::data_name(active_file_id),
        )?;

        let mut keydir = HashMap::new();
        let mut readers = HashMap::new();
        for file_id in file_ids {
            let mut reader = files::open_reader(&files::data_path(path, file_id))?;
            load_file(path, file_id, &mut reader, &mut keydir)?;
            readers.insert(file_id, reader);
        }

        let active = ActiveFile::create(path, active_file_id)?;
        readers.insert(
            active_file_id,
            files::open_reader(&files::data_path(path, active_file_id))?,
        );
        debug!(active_file_id, keys = keydir.len(), "opened bitcask directory");

        Ok(Bitcask {
            path: path.to_path_buf(),
            options,
            keydir,
            readers,
            active,
            write_lock,
            sealed: false,
        })
    }

    /// Rewrites every live entry into a fresh data file and deletes the files
    /// it replaces, reclaiming the space held by overwritten and deleted
    /// entries.
    ///
    /// Entries are copied raw, so checksums and timestamps survive the move.
    /// Concurrent mergers are excluded through `bitcask.merge.lock`.
    pub fn merge(&mut self) -> StorageResult<()> {
        let merge_file_id = self.active.file_id + 1;
        let mut merge_lock = LockFile::acquire(
            &self.path,
            lock::MERGE_LOCK_FILE,
            &files::data_name(merge_file_id),
        )?;

        self.active.data.flush()?;
        self.active.dirty = false;

        let mut merged = ActiveFile::create(&self.path, merge_file_id)?;
        let snapshot: Vec<(Vec<u8>, Slot)> = self
            .keydir
            .iter()
            .map(|(key, slot)| (key.clone(), *slot))
            .collect();
        for (key, slot) in snapshot {
            let entry = self.read_entry(&slot)?;
            let merged_slot = merged.append(&key, &entry, slot.timestamp, false)?;
            self.keydir.insert(key, merged_slot);
        }
        merged.seal()?;
        self.readers.insert(
            merge_file_id,
            files::open_reader(&files::data_path(&self.path, merge_file_id))?,
        );

        let active_file_id = merge_file_id + 1;
        self.active = ActiveFile::create(&self.path, active_file_id)?;
        self.readers.insert(
            active_file_id,
            files::open_reader(&files::data_path(&self.path, active_file_id))?,
        );
        self.write_lock.update(&files::data_name(active_file_id))?;

        // Nothing in the keydir points below the merge file any more.
        for file_id in files::sorted_file_ids(&self.path)? {
            if file_id >= merge_file_id {
                continue;
            }
            self.readers.remove(&file_id);
            fs::remove_file(files::data_path(&self.path, file_id))?;
            if let Err(e) = fs::remove_file(files::hint_path(&self.path, file_id)) {
                if e.kind() != io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }

        info!(merge_file_id, keys = self.keydir.len(), "merged data files");
        merge_lock.release()?;
        Ok(())
    }

    /// Seals the active hint file, flushes every handle, and releases the
    /// write lock.
    ///
    /// Dropping the store performs the same teardown; calling `close` makes
    /// its errors observable.
    pub fn close(mut self) -> StorageResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> StorageResult<()> {
        if self.sealed {
            return Ok(());
        }
        self.sealed = true;
        self.active.seal()?;
        if self.options.sync == SyncStrategy::Fsync {
            self.active.data.get_ref().sync_all()?;
            self.active.hint.get_ref().sync_all()?;
        }
        self.write_lock.release()?;
        Ok(())
    }

    fn append_entry(
        &mut self,
        key: &[u8],
        entry: &[u8],
        timestamp: u32,
        tombstone: bool,
    ) -> StorageResult<Slot> {
        let slot = self.active.append(key, entry, timestamp, tombstone)?;
        match self.options.sync {
            SyncStrategy::None => self.active.dirty = true,
            SyncStrategy::Flush => self.active.data.flush()?,
            SyncStrategy::Fsync => {
                self.active.data.flush()?;
                self.active.data.get_ref().sync_all()?;
            }
        }
        debug!(
            position = slot.position,
            len = slot.size,
            file_id = slot.file_id,
            tombstone,
            "appended entry"
        );
        Ok(slot)
    }

    fn roll_over_if_needed(&mut self) -> StorageResult<()> {
        if self.active.position < self.options.max_file_size {
            return Ok(());
        }
        let file_id = self.active.file_id + 1;
        self.active.seal()?;
        self.active = ActiveFile::create(&self.path, file_id)?;
        self.readers.insert(
            file_id,
            files::open_reader(&files::data_path(&self.path, file_id))?,
        );
        self.write_lock.update(&files::data_name(file_id))?;
        info!(file_id, "rolled over to a new active data file");
        Ok(())
    }

    // Reads the full on-disk entry a slot points to.
    fn read_entry(&mut self, slot: &Slot) -> StorageResult<Vec<u8>> {
        if slot.file_id == self.active.file_id && self.active.dirty {
            self.active.data.flush()?;
            self.active.dirty = false;
        }
        let reader = match self.readers.entry(slot.file_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(files::open_reader(&files::data_path(
                &self.path,
                slot.file_id,
            ))?),
        };
        reader.seek(SeekFrom::Start(slot.position))?;
        let mut buf = vec![0u8; slot.size as usize];
        reader.read_exact(&mut buf)?;

        if self.options.verify_reads {
            let header = codec::decode_data_header(&buf)?;
            let computed = codec::CASK_CRC.checksum(&buf[4..]);
            if computed != header.crc {
                return Err(corruption(
                    files::data_path(&self.path, slot.file_id),
                    slot.position,
                    header.crc,
                    computed,
                ));
            }
        }
        Ok(buf)
    }

    fn read_value(&mut self, slot: &Slot) -> StorageResult<Vec<u8>> {
        let buf = self.read_entry(slot)?;
        let header = codec::decode_data_header(&buf)?;
        Ok(buf[codec::DATA_HEADER_SIZE + header.key_size as usize..].to_vec())
    }
}

impl Storage for Bitcask {
    /// Gets the value of a given key.
    ///
    /// Returns `None` if the given key does not exist.
    fn get(&mut self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let slot = match self.keydir.get(key) {
            Some(slot) => *slot,
            None => return Ok(None),
        };
        self.read_value(&slot).map(Some)
    }

    /// Sets the value of a key.
    ///
    /// If the key already exists, the previous value will be overwritten.
    /// The overwritten entry stays in its data file as garbage until the next
    /// merge; the keydir update alone shadows it.
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        if key.len() > u16::MAX as usize {
            return Err(StorageError::InvalidKey(key.len()));
        }
        if value.len() > u32::MAX as usize {
            return Err(StorageError::InvalidValue(format!(
                "value of {} bytes exceeds the maximum value size",
                value.len()
            )));
        }
        if value.starts_with(codec::TOMBSTONE_PREFIX) {
            return Err(StorageError::InvalidValue(
                "value cannot start with the tombstone marker".to_string(),
            ));
        }

        let timestamp = timestamp_now()?;
        let entry = codec::encode_data_entry(timestamp, key, value)?;
        let slot = self.append_entry(key, &entry, timestamp, false)?;
        self.keydir.insert(key.to_vec(), slot);
        self.roll_over_if_needed()
    }

    /// Removes a given key by appending a tombstone entry.
    ///
    /// Returns `StorageError::KeyNotFound` if the key does not exist.
    fn remove(&mut self, key: &[u8]) -> StorageResult<()> {
        if !self.keydir.contains_key(key) {
            return Err(StorageError::KeyNotFound);
        }
        let timestamp = timestamp_now()?;
        let entry = codec::encode_data_entry(timestamp, key, codec::TOMBSTONE_PREFIX)?;
        self.append_entry(key, &entry, timestamp, true)?;
        self.keydir.remove(key);
        self.roll_over_if_needed()
    }

    fn contains(&self, key: &[u8]) -> bool {
        self.keydir.contains_key(key)
    }

    fn len(&self) -> usize {
        self.keydir.len()
    }

    fn list_keys(&self) -> Vec<Vec<u8>> {
        self.keydir.keys().cloned().collect()
    }
}

impl Drop for Bitcask {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "error closing bitcask directory");
        }
    }
}

fn timestamp_now() -> StorageResult<u32> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as u32)
}

fn corruption(file: PathBuf, offset: u64, stored: u32, computed: u32) -> StorageError {
    StorageError::Corruption {
        file,
        offset,
        reason: format!(
            "stored checksum {:#010x} does not match computed checksum {:#010x}",
            stored, computed
        ),
    }
}

// Populates the keydir from one immutable data file, preferring its hint file
// and falling back to a full scan when the hint is missing, torn, or fails
// its trailer CRC.
fn load_file(
    dir: &Path,
    file_id: u64,
    reader: &mut BufReader<File>,
    keydir: &mut HashMap<Vec<u8>, Slot>,
) -> StorageResult<()> {
    let hint_path = files::hint_path(dir, file_id);
    match fs::read(&hint_path) {
        Ok(bytes) => {
            if let Some(records) = parse_hint_file(&bytes) {
                apply_hint_records(file_id, records, keydir);
                return Ok(());
            }
            warn!(
                hint = %hint_path.display(),
                "discarding unusable hint file, scanning data file"
            );
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    scan_data_file(dir, file_id, reader, keydir)
}

// Validates and decodes a whole hint file. Returns None when the trailer CRC
// does not cover the body or any record is structurally short, in which case
// nothing is applied and the caller scans the data file instead.
fn parse_hint_file(bytes: &[u8]) -> Option<Vec<(Vec<u8>, HintRecord)>> {
    if bytes.len() < codec::HINT_RECORD_SIZE {
        return None;
    }
    let (body, trailer) = bytes.split_at(bytes.len() - codec::HINT_RECORD_SIZE);
    let trailer = codec::decode_hint_record(trailer).ok()?;
    if trailer.position != codec::HINT_TRAILER_POSITION
        || trailer.entry_size != codec::CASK_CRC.checksum(body)
    {
        return None;
    }

    let mut records = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        if rest.len() < codec::HINT_RECORD_SIZE {
            return None;
        }
        let record = codec::decode_hint_record(rest).ok()?;
        rest = &rest[codec::HINT_RECORD_SIZE..];
        if rest.len() < record.key_size as usize {
            return None;
        }
        let (key, remainder) = rest.split_at(record.key_size as usize);
        records.push((key.to_vec(), record));
        rest = remainder;
    }
    Some(records)
}

fn apply_hint_records(
    file_id: u64,
    records: Vec<(Vec<u8>, HintRecord)>,
    keydir: &mut HashMap<Vec<u8>, Slot>,
) {
    for (key, record) in records {
        if record.tombstone {
            keydir.remove(&key);
        } else {
            keydir.insert(
                key,
                Slot {
                    file_id,
                    position: record.position,
                    size: record.entry_size,
                    timestamp: record.timestamp,
                },
            );
        }
    }
}

// Linearly validates a data file, populating the keydir and rebuilding the
// paired hint file. Every entry's CRC is checked; a mismatch or a file that
// ends inside an entry aborts the open with `Corruption`.
fn scan_data_file(
    dir: &Path,
    file_id: u64,
    reader: &mut BufReader<File>,
    keydir: &mut HashMap<Vec<u8>, Slot>,
) -> StorageResult<()> {
    let data_path = files::data_path(dir, file_id);
    let file_size = reader.get_ref().metadata()?.len();
    reader.seek(SeekFrom::Start(0))?;

    let mut hint_body = Vec::new();
    let mut position = 0u64;
    while position < file_size {
        let mut header_buf = [0u8; codec::DATA_HEADER_SIZE];
        read_or_torn(reader, &mut header_buf, &data_path, position)?;
        let header = codec::decode_data_header(&header_buf)?;

        let mut key = vec![0u8; header.key_size as usize];
        read_or_torn(reader, &mut key, &data_path, position)?;
        let mut value = vec![0u8; header.value_size as usize];
        read_or_torn(reader, &mut value, &data_path, position)?;

        let mut digest = codec::CASK_CRC.digest();
        digest.update(&header_buf[4..]);
        digest.update(&key);
        digest.update(&value);
        let computed = digest.finalize();
        if computed != header.crc {
            return Err(corruption(data_path, position, header.crc, computed));
        }

        let entry_size = header.entry_size();
        let tombstone = value.starts_with(codec::TOMBSTONE_PREFIX);
        let record = codec::encode_hint_record(&HintRecord {
            timestamp: header.timestamp,
            key_size: header.key_size,
            entry_size: entry_size as u32,
            position,
            tombstone,
        })?;
        hint_body.extend_from_slice(&record);
        hint_body.extend_from_slice(&key);

        if tombstone {
            keydir.remove(&key);
        } else {
            keydir.insert(
                key,
                Slot {
                    file_id,
                    position,
                    size: entry_size as u32,
                    timestamp: header.timestamp,
                },
            );
        }
        position += entry_size;
    }

    write_hint_file(&files::hint_path(dir, file_id), &hint_body)?;
    debug!(file_id, "rebuilt hint file from data file");
    Ok(())
}

// A short read inside an entry means the tail was torn by an interrupted
// write.
fn read_or_torn(
    reader: &mut impl Read,
    buf: &mut [u8],
    file: &Path,
    offset: u64,
) -> StorageResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StorageError::Corruption {
                file: file.to_path_buf(),
                offset,
                reason: "file ends inside an entry".to_string(),
            }
        } else {
            e.into()
        }
    })
}

// The hint file only becomes visible under its final name once fully written
// and synced, so a crash mid-rebuild cannot leave a truncated hint behind.
fn write_hint_file(path: &Path, body: &[u8]) -> StorageResult<()> {
    let tmp_path = path.with_extension("hint.tmp");
    let mut file = File::create(&tmp_path)?;
    file.write_all(body)?;
    file.write_all(&codec::encode_hint_trailer(codec::CASK_CRC.checksum(body))?)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
