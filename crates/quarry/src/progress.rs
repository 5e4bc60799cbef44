//! Durable progress — the resume file written alongside a run.
//!
//! The file carries exactly the pair needed to resume: the normalized
//! region (to re-derive the identical traversal) and the mined count (the
//! index to skip to). Written after every checkpoint, deleted on completion
//! or stop. A missing or unparseable file means "no resume", never an
//! error.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::region::NormalizedRegion;

/// The persisted subset of run state.
///
/// Field names are the on-disk schema; do not rename without a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedProgress {
    /// The normalized excavation region.
    #[serde(rename = "area")]
    pub region: NormalizedRegion,
    /// Targets already processed; also the resume index.
    #[serde(rename = "minedBlocks")]
    pub mined: u64,
}

/// File-backed store for [`PersistedProgress`].
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a checkpoint. Goes through a temp file + rename so a crash
    /// mid-write never leaves a truncated checkpoint behind.
    pub fn save(&self, progress: &PersistedProgress) -> Result<()> {
        let json = serde_json::to_string_pretty(progress)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        debug!(mined = progress.mined, path = %self.path.display(), "progress saved");
        Ok(())
    }

    /// Load the checkpoint if one exists and parses; anything else is
    /// `None`.
    pub fn load(&self) -> Option<PersistedProgress> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return None,
        };
        match serde_json::from_str(&raw) {
            Ok(progress) => Some(progress),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "progress file unreadable; ignoring");
                None
            }
        }
    }

    /// Remove the checkpoint. Missing file is fine.
    pub fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "could not remove progress file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{BlockPos, Region};
    use tempfile::tempdir;

    fn region() -> NormalizedRegion {
        Region::new(BlockPos::new(0, 0, 0), BlockPos::new(1, 0, 1)).normalized()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));

        let progress = PersistedProgress {
            region: region(),
            mined: 2,
        };
        store.save(&progress).unwrap();

        assert_eq!(store.load(), Some(progress));
    }

    #[test]
    fn test_exact_wire_schema() {
        let progress = PersistedProgress {
            region: region(),
            mined: 2,
        };
        let json = serde_json::to_value(progress).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "area": {
                    "min": {"x": 0, "y": 0, "z": 0},
                    "max": {"x": 1, "y": 0, "z": 1}
                },
                "minedBlocks": 2
            })
        );
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_load_corrupt_file_is_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        fs::write(&path, "{not json").unwrap();
        let store = ProgressStore::new(path);
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));

        store
            .save(&PersistedProgress {
                region: region(),
                mined: 7,
            })
            .unwrap();
        store.clear();
        assert_eq!(store.load(), None);
        store.clear(); // no file left; still fine
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("nested/deep/progress.json"));
        store
            .save(&PersistedProgress {
                region: region(),
                mined: 0,
            })
            .unwrap();
        assert!(store.load().is_some());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        store
            .save(&PersistedProgress {
                region: region(),
                mined: 1,
            })
            .unwrap();
        assert!(!dir.path().join("progress.json.tmp").exists());
    }
}
