// Shard write lock.
//
// A shard `x.db` is being written while some process holds an exclusive flock(2) on `x.db.lock`.
// The kernel drops the lock when the holder closes the file or dies, so a writer that is killed in
// the middle of a pass leaves nothing behind that blocks the next pass; the file itself is just a
// rendezvous and stays put.  A writer that finds the lock taken skips the shard; it does not wait.
//
// The lock file holds the last owner's pid, for humans.

use anyhow::{bail, Result};
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process;

pub struct ShardLock {
    file: File,
    path: PathBuf,
}

impl ShardLock {
    /// Ok(None) if somebody else holds the lock.

    pub fn try_lock(shard: &Path) -> Result<Option<ShardLock>> {
        let path = lock_path(shard);
        let mut file = match OpenOptions::new().create(true).write(true).open(&path) {
            Ok(f) => f,
            Err(e) => bail!("Could not create lock {}: {e}", path.display()),
        };
        if let Err(e) = flock_exclusive(&file) {
            if e.kind() == io::ErrorKind::WouldBlock {
                return Ok(None);
            }
            bail!("Could not lock {}: {e}", path.display());
        }
        file.set_len(0)?;
        writeln!(file, "{}", process::id())?;
        debug!("Locked {}", path.display());
        Ok(Some(ShardLock { file, path }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ShardLock {
    fn drop(&mut self) {
        // Closing the file releases it as well.
        let result = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if result != 0 {
            debug!(
                "Could not unlock {}: {}",
                self.path.display(),
                io::Error::last_os_error()
            );
        }
    }
}

fn flock_exclusive(file: &File) -> io::Result<()> {
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn lock_path(shard: &Path) -> PathBuf {
    let mut name = shard.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[test]
fn test_lock() {
    let dir = tempfile::TempDir::new().unwrap();
    let shard = dir.path().join("queue.db");
    assert!(lock_path(&shard) == dir.path().join("queue.db.lock"));

    let lock = ShardLock::try_lock(&shard).unwrap().unwrap();
    assert!(lock.path().exists());
    let pid = std::fs::read_to_string(lock.path()).unwrap();
    assert!(pid.trim() == process::id().to_string());

    // Second taker is turned away, not blocked.
    assert!(ShardLock::try_lock(&shard).unwrap().is_none());

    drop(lock);
    assert!(ShardLock::try_lock(&shard).unwrap().is_some());

    assert!(ShardLock::try_lock(&dir.path().join("nonexistent/x.db")).is_err());
}

#[test]
fn test_orphaned_lock_file() {
    // What a writer killed mid-pass leaves behind: the file, with a pid that is gone, and no lock.
    let dir = tempfile::TempDir::new().unwrap();
    let shard = dir.path().join("queue.db");
    std::fs::write(lock_path(&shard), "999999\n").unwrap();

    let lock = ShardLock::try_lock(&shard).unwrap().unwrap();
    let pid = std::fs::read_to_string(lock.path()).unwrap();
    assert!(pid == format!("{}\n", process::id()));
}
