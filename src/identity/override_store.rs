use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::principal::Identity;
use crate::error::{AppError, AppResult};

/// Single persisted identity slot written only by the fallback sign-in path.
pub trait LocalOverrideStore: Send + Sync {
    fn read(&self) -> AppResult<Option<Identity>>;
    fn write(&self, identity: &Identity) -> AppResult<()>;
    fn delete(&self) -> AppResult<()>;
}

/// JSON file `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileOverrideStore {
    path: PathBuf,
}

impl FileOverrideStore {
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self { path: dir.as_ref().join(format!("{}.json", key)) }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl LocalOverrideStore for FileOverrideStore {
    fn read(&self) -> AppResult<Option<Identity>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() { return Ok(None); }
        let identity: Identity = serde_json::from_str(&raw)?;
        Ok(Some(identity))
    }

    fn write(&self, identity: &Identity) -> AppResult<()> {
        if let Some(dir) = self.path.parent() { std::fs::create_dir_all(dir)?; }
        let body = serde_json::to_vec_pretty(identity)?;
        // Write then rename so a crash never leaves a half-written record behind
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(target: "override_store", path = %self.path.display(), user = %identity.id, "override written");
        Ok(())
    }

    /// Removes the record. If the file cannot be removed it is truncated
    /// instead, which `read` treats as absent.
    fn delete(&self) -> AppResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(target: "override_store", path = %self.path.display(), "override deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(target: "override_store", path = %self.path.display(), error = %e, "override delete failed; truncating");
                self.truncate()
            }
        }
    }
}

impl FileOverrideStore {
    fn truncate(&self) -> AppResult<()> {
        std::fs::write(&self.path, b"").map_err(|e| {
            warn!(target: "override_store", path = %self.path.display(), error = %e, "override truncate failed");
            AppError::from(e)
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryOverrideStore {
    slot: Mutex<Option<Identity>>,
}

impl MemoryOverrideStore {
    pub fn new() -> Self { Self::default() }

    pub fn with(identity: Identity) -> Self { Self { slot: Mutex::new(Some(identity)) } }

    pub fn peek(&self) -> Option<Identity> { self.slot.lock().clone() }
}

impl LocalOverrideStore for MemoryOverrideStore {
    fn read(&self) -> AppResult<Option<Identity>> { Ok(self.slot.lock().clone()) }

    fn write(&self, identity: &Identity) -> AppResult<()> {
        *self.slot.lock() = Some(identity.clone());
        Ok(())
    }

    fn delete(&self) -> AppResult<()> {
        self.slot.lock().take();
        Ok(())
    }
}
