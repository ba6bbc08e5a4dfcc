use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// An exclusive advisory lock on the data directory.
///
/// The lock file holds the owning process id. The lock is released when the
/// value is dropped; the file itself is left behind to avoid unlink races.
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    pub fn lock<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Self::try_lock(&file)?;

        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { _file: file, path })
    }

    #[cfg(unix)]
    fn try_lock(file: &File) -> io::Result<()> {
        use libc::{flock, LOCK_EX, LOCK_NB};

        let fd = file.as_raw_fd();
        let result = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn try_lock(_file: &File) -> io::Result<()> {
        // No advisory locking on this platform; opens succeed unguarded.
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_lock_records_process_id() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let lock_path = dir.path().join("emberdb.lock");

        let lock = FileLock::lock(&lock_path).expect("Failed to acquire lock");
        assert_eq!(lock.path(), lock_path.as_path());

        let content = fs::read_to_string(&lock_path).expect("Failed to read lock file");
        assert!(content.contains(&std::process::id().to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_double_lock_fails() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let lock_path = dir.path().join("emberdb.lock");

        let _first = FileLock::lock(&lock_path).expect("Failed to acquire first lock");
        assert!(FileLock::lock(&lock_path).is_err());
    }

    #[test]
    fn test_relock_after_drop() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let lock_path = dir.path().join("emberdb.lock");

        {
            let _lock = FileLock::lock(&lock_path).expect("Failed to acquire lock");
        }

        let _again = FileLock::lock(&lock_path).expect("Failed to reacquire lock after drop");
    }
}
