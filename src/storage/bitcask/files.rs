use std::{
    fs::{self, File},
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use crate::storage::{StorageError, StorageResult};

pub(super) const DATA_FILE_SUFFIX: &str = ".bitcask.data";
pub(super) const HINT_FILE_SUFFIX: &str = ".bitcask.hint";

/// Basename of the data file with the given id, e.g. `1.bitcask.data`.
pub(super) fn data_name(file_id: u64) -> String {
    format!("{}{}", file_id, DATA_FILE_SUFFIX)
}

pub(super) fn data_path(dir: &Path, file_id: u64) -> PathBuf {
    dir.join(data_name(file_id))
}

pub(super) fn hint_path(dir: &Path, file_id: u64) -> PathBuf {
    dir.join(format!("{}{}", file_id, HINT_FILE_SUFFIX))
}

/// Ids of every data file in the directory, ascending. Files that merely share
/// the suffix but carry a non-numeric id are rejected rather than skipped,
/// since silently ignoring them could shadow live data.
pub(super) fn sorted_file_ids(dir: &Path) -> StorageResult<Vec<u64>> {
    let mut file_ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name,
            None => continue,
        };
        let stem = match name.strip_suffix(DATA_FILE_SUFFIX) {
            Some(stem) => stem,
            None => continue,
        };
        let file_id = stem.parse::<u64>().map_err(|_| {
            StorageError::Unexpected(format!("could not parse file {}", path.display()))
        })?;
        file_ids.push(file_id);
    }
    file_ids.sort_unstable();
    Ok(file_ids)
}

/// The id the next active file gets: one past the highest existing id, or 1
/// for an empty directory.
pub(super) fn next_file_id(file_ids: &[u64]) -> u64 {
    file_ids.last().copied().unwrap_or(0) + 1
}

pub(super) fn open_reader(path: &Path) -> io::Result<BufReader<File>> {
    Ok(BufReader::new(
        fs::OpenOptions::new().read(true).open(path)?,
    ))
}

pub(super) fn open_appender(path: &Path) -> io::Result<File> {
    fs::OpenOptions::new().create(true).append(true).open(path)
}
