use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};

use tracing::warn;

use crate::storage::{StorageError, StorageResult};

pub(super) const WRITE_LOCK_FILE: &str = "bitcask.write.lock";
pub(super) const MERGE_LOCK_FILE: &str = "bitcask.merge.lock";

/// A held PID lock file containing `"<pid> <active-data-basename>"`.
///
/// Acquisition is atomic: the file is opened with `create_new` so two
/// processes racing for the same directory cannot both win. An existing lock
/// naming a dead process is removed and acquisition retried; a lock naming a
/// live process fails with `StorageError::Locked`.
pub(super) struct LockFile {
    path: PathBuf,
    released: bool,
}

impl LockFile {
    pub fn acquire(dir: &Path, name: &str, active_file: &str) -> StorageResult<LockFile> {
        let path = dir.join(name);
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    write!(file, "{} {}", process::id(), active_file)?;
                    return Ok(LockFile {
                        path,
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if let Some(pid) = read_owner(&path)? {
                        if pid_is_alive(pid) {
                            return Err(StorageError::Locked(pid));
                        }
                    }
                    warn!(lock = %path.display(), "removing stale lock file");
                    if let Err(e) = fs::remove_file(&path) {
                        if e.kind() != io::ErrorKind::NotFound {
                            return Err(e.into());
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Rewrites the lock contents after the active file rolls over.
    pub fn update(&self, active_file: &str) -> io::Result<()> {
        let mut file = fs::File::create(&self.path)?;
        write!(file, "{} {}", process::id(), active_file)
    }

    pub fn release(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// Returns the PID recorded in the lock file, or None when the file vanished
// underneath us or does not parse. Either way the caller treats the lock as
// stale.
fn read_owner(path: &Path) -> StorageResult<Option<u32>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(contents
        .split_whitespace()
        .next()
        .and_then(|pid| pid.parse::<u32>().ok()))
}

/// Signal 0 performs the liveness and permission checks without delivering
/// anything; EPERM still means the process exists.
fn pid_is_alive(pid: u32) -> bool {
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    result == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn acquire_writes_pid_and_active_file() -> StorageResult<()> {
        let temp_dir = TempDir::new().expect("unable to create temporary working directory");
        let mut lock = LockFile::acquire(temp_dir.path(), WRITE_LOCK_FILE, "1.bitcask.data")?;

        let contents = fs::read_to_string(temp_dir.path().join(WRITE_LOCK_FILE))?;
        assert_eq!(contents, format!("{} 1.bitcask.data", process::id()));

        lock.release()?;
        assert!(!temp_dir.path().join(WRITE_LOCK_FILE).exists());
        Ok(())
    }

    #[test]
    fn live_pid_denies_acquisition() -> StorageResult<()> {
        let temp_dir = TempDir::new().expect("unable to create temporary working directory");
        let _lock = LockFile::acquire(temp_dir.path(), WRITE_LOCK_FILE, "1.bitcask.data")?;

        match LockFile::acquire(temp_dir.path(), WRITE_LOCK_FILE, "1.bitcask.data") {
            Err(StorageError::Locked(pid)) => assert_eq!(pid, process::id()),
            other => panic!("expected Locked, got {:?}", other.map(|_| ())),
        }
        Ok(())
    }

    #[test]
    fn stale_pid_is_silently_removed() -> StorageResult<()> {
        let temp_dir = TempDir::new().expect("unable to create temporary working directory");
        let lock_path = temp_dir.path().join(WRITE_LOCK_FILE);
        fs::write(&lock_path, b"999999 1.bitcask.data")?;
        assert!(!pid_is_alive(999999));

        let _lock = LockFile::acquire(temp_dir.path(), WRITE_LOCK_FILE, "2.bitcask.data")?;
        let contents = fs::read_to_string(&lock_path)?;
        assert_eq!(contents, format!("{} 2.bitcask.data", process::id()));
        Ok(())
    }

    #[test]
    fn dropping_the_guard_releases_the_lock() -> StorageResult<()> {
        let temp_dir = TempDir::new().expect("unable to create temporary working directory");
        {
            let _lock = LockFile::acquire(temp_dir.path(), MERGE_LOCK_FILE, "3.bitcask.data")?;
            assert!(temp_dir.path().join(MERGE_LOCK_FILE).exists());
        }
        assert!(!temp_dir.path().join(MERGE_LOCK_FILE).exists());
        Ok(())
    }
}
