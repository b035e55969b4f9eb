use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use crate::Error;

/// A scoped process-wide transaction lock.
///
/// The lock is a pid file: acquiring writes the current process id,
/// dropping removes the file again, so the lock is released on every exit
/// path, panics included. A pid file whose owner is gone is taken over.
///
/// ## Examples
/// ```no_run
/// use rpmtx_solve::PidLock;
///
/// # fn main() -> Result<(), rpmtx_solve::Error> {
/// let lock = PidLock::acquire("/run/rpmtx.pid".as_ref())?;
/// // ... compute and hand off the transaction ...
/// drop(lock);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Acquires the lock at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Lock`] when another live process holds the lock or
    /// the pid file cannot be created.
    pub fn acquire(path: &Path) -> Result<Self, Error> {
        let pid = std::process::id();
        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(file) => {
                    use std::io::Write;
                    let mut file = file;
                    write!(file, "{pid}")
                        .map_err(|error| Error::Lock(error.to_string()))?;
                    return Ok(PidLock {
                        path: path.to_path_buf(),
                    });
                }
                Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(path)
                        .ok()
                        .and_then(|content| content.trim().parse::<u32>().ok());
                    match holder {
                        Some(holder) if process_is_alive(holder) => {
                            return Err(Error::Lock(format!(
                                "held by process {holder}"
                            )));
                        }
                        _ => {
                            // stale or unreadable pid file, take it over
                            debug!("removing stale lock file {}", path.display());
                            fs::remove_file(path)
                                .map_err(|error| Error::Lock(error.to_string()))?;
                        }
                    }
                }
                Err(error) => return Err(Error::Lock(error.to_string())),
            }
        }
        Err(Error::Lock("unable to create the lock file".to_string()))
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            debug!(
                "failed to remove lock file {}: {error}",
                self.path.display()
            );
        }
    }
}

fn process_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn lock_is_exclusive_and_released_on_drop() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("rpmtx.pid");

        let lock = PidLock::acquire(&path)?;
        assert!(path.exists());
        assert!(matches!(PidLock::acquire(&path), Err(Error::Lock(_))));

        drop(lock);
        assert!(!path.exists());
        let _relocked = PidLock::acquire(&path)?;
        Ok(())
    }

    #[test]
    fn stale_lock_is_taken_over() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("rpmtx.pid");
        // no live process has this pid on Linux (pid_max is far lower)
        fs::write(&path, "4194304004")?;

        let _lock = PidLock::acquire(&path)?;
        assert_eq!(
            fs::read_to_string(&path)?.trim(),
            std::process::id().to_string()
        );
        Ok(())
    }
}
