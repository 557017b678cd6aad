//! Single-instance guard and process liveness checks.
//!
//! Each daemon writes a pid file under the run directory at startup. A
//! second instance finding a pid file with a live owner exits immediately;
//! a pid file whose owner is gone (unclean shutdown) is taken over.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Whether a process with the given pid currently exists.
///
/// `kill(pid, 0)` performs no signal delivery, only the existence and
/// permission checks. EPERM still means the process exists.
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    let ret = unsafe { libc::kill(pid as i32, 0) };
    if ret == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Pid-file based single-instance guard. Removing the file on drop keeps
/// restarts clean under a process supervisor.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the instance lock for `name` (e.g. `"courtcam-worker"`).
    ///
    /// Returns [`CoreError::Config`] when another live instance holds it —
    /// the caller is expected to treat that as fatal at startup.
    pub fn acquire(run_dir: &Path, name: &str) -> Result<Self, CoreError> {
        std::fs::create_dir_all(run_dir)?;
        let path = run_dir.join(format!("{name}.pid"));

        if let Ok(contents) = std::fs::read_to_string(&path) {
            if let Ok(pid) = contents.trim().parse::<u32>() {
                if pid != std::process::id() && pid_alive(pid) {
                    return Err(CoreError::Config(format!(
                        "{name} is already running (pid {pid})"
                    )));
                }
            }
            // Dead owner or garbage contents: take the file over.
            let _ = std::fs::remove_file(&path);
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        write!(file, "{}", std::process::id())?;
        Ok(Self { path })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
