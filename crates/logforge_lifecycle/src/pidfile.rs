//! PID file handling (spec.md §4.7 "check pidfile (refuse to start if
//! another instance is alive)", §6 "written atomically ... contains
//! decimal PID ... removed on clean exit").

use fs2::FileExt;
use logforge_protocol::error::{ErrorKind, LogforgeError, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// An open, exclusively-locked pidfile. The lock is held for the life
/// of this handle; it is released and the file removed on `Drop` during
/// a clean shutdown, or simply dropped (lock released, file left
/// behind) on a crash, so the next start can distinguish "stale file,
/// lock free" from "another instance is alive".
pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Write this process's PID atomically (`<path>.tmp` then rename)
    /// and take an exclusive advisory lock on it. Fails with
    /// `AlreadyRunning` if another instance already holds the lock.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LogforgeError::with_source(ErrorKind::Io, format!("creating pidfile directory {}", parent.display()), e)
            })?;
        }

        let tmp_path = path.with_extension("tmp");
        let pid = std::process::id();
        {
            let mut tmp = File::create(&tmp_path).map_err(|e| {
                LogforgeError::with_source(ErrorKind::Io, format!("creating {}", tmp_path.display()), e)
            })?;
            writeln!(tmp, "{pid}").map_err(|e| {
                LogforgeError::with_source(ErrorKind::Io, "writing pidfile contents", e)
            })?;
            tmp.sync_all().ok();
        }
        std::fs::rename(&tmp_path, path).map_err(|e| {
            LogforgeError::with_source(ErrorKind::Io, format!("renaming {} to {}", tmp_path.display(), path.display()), e)
        })?;

        let file = OpenOptions::new().read(true).write(true).open(path).map_err(|e| {
            LogforgeError::with_source(ErrorKind::Io, format!("opening {}", path.display()), e)
        })?;
        file.try_lock_exclusive().map_err(|_| {
            LogforgeError::new(
                ErrorKind::AlreadyRunning,
                format!("another instance already holds the lock on {}", path.display()),
            )
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}
