//! Host-level build lock.
//!
//! Only one build may own the build root and its mounts. The lock is an
//! exclusive `flock` on `<base>/livecd.lock`, held for the life of the
//! returned guard and released by the kernel if the process dies.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{BuildError, IoContext, Result};

#[derive(Debug)]
pub struct BuildLock {
    file: File,
    path: PathBuf,
}

impl BuildLock {
    /// Take the lock or fail with `Busy` naming the current holder.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }

        // Never unlink the lock file: a second process could then lock a
        // fresh inode at the same path while the first still holds the old one.
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .io_context(|| format!("Failed to open lock file {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            let mut holder = String::new();
            let _ = file.read_to_string(&mut holder);
            let holder = holder.trim();
            let who = if holder.is_empty() {
                "unknown process".to_string()
            } else {
                format!("pid {holder}")
            };
            return Err(BuildError::Busy(format!(
                "  {} holds {}",
                who,
                path.display()
            )));
        }

        write_owner(&mut file)
            .io_context(|| format!("Failed to write lock file {}", path.display()))?;

        debug!(path = %path.display(), "build lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_owner(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "build lock released");
    }
}
