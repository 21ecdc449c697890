use std::path::{Path, PathBuf};

use log::{debug, warn};

/// Deletes a partially written output file when dropped, unless [`keep`]
/// was called. Wrap the whole compress/decompress call with one of these so
/// every early return and `?` leaves no half-written file behind.
///
/// [`keep`]: OutputGuard::keep
#[derive(Debug)]
pub struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mark the output precious: it survives the guard.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed partial output {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("could not remove partial output {:?}: {e}", self.path),
        }
    }
}
