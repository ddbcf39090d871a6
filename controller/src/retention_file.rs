use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use ir_schedule_common::{RetainedBlob, RetentionError, RetentionStore, RETAINED_BLOB_LEN};
use tracing::warn;

/// Retention region simulated as a file of exactly [`RETAINED_BLOB_LEN`]
/// bytes. Deleting the file is the host equivalent of pulling power.
pub struct FileRetention {
    path: PathBuf,
}

impl FileRetention {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops the simulated region, as a cold boot would.
    pub fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl RetentionStore for FileRetention {
    fn load(&mut self) -> RetainedBlob {
        let mut blob = [0_u8; RETAINED_BLOB_LEN];
        match fs::read(&self.path) {
            Ok(raw) if raw.len() == RETAINED_BLOB_LEN => blob.copy_from_slice(&raw),
            Ok(raw) => warn!(
                "ignoring retention file {} with {} bytes",
                self.path.display(),
                raw.len()
            ),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("failed to read retention file {}: {err}", self.path.display()),
        }
        blob
    }

    fn save(&mut self, blob: &RetainedBlob) -> Result<(), RetentionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| RetentionError::Write(err.to_string()))?;
        }
        fs::write(&self.path, blob).map_err(|err| RetentionError::Write(err.to_string()))
    }
}
