use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::data::{DataError, DataMapping};
use crate::fs::ensure_dir;

/// Address of one stored simulation input/output document.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataHandle {
    pub user: String,
    pub db: String,
    pub shot: u32,
    pub run: u32,
}

impl DataHandle {
    pub fn with_run(&self, run: u32) -> Self {
        Self {
            run,
            ..self.clone()
        }
    }
}

impl fmt::Display for DataHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.user, self.db, self.shot, self.run)
    }
}

/// Filesystem-backed store mapping a handle to one YAML document under
/// `<root>/<user>/<db>/<shot>/<run>.yaml`.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn path_for(&self, handle: &DataHandle) -> PathBuf {
        self.root
            .join(&handle.user)
            .join(&handle.db)
            .join(handle.shot.to_string())
            .join(format!("{}.yaml", handle.run))
    }

    pub fn exists(&self, handle: &DataHandle) -> bool {
        self.path_for(handle).is_file()
    }

    pub fn load(&self, handle: &DataHandle) -> Result<DataMapping, DataError> {
        DataMapping::load(&self.path_for(handle))
    }

    pub fn save(&self, handle: &DataHandle, data: &DataMapping) -> Result<(), DataError> {
        data.save(&self.path_for(handle))
    }

    pub fn copy(&self, from: &DataHandle, to: &DataHandle) -> Result<(), DataError> {
        let src = self.path_for(from);
        let dst = self.path_for(to);
        if let Some(parent) = dst.parent() {
            ensure_dir(parent).map_err(|source| DataError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::copy(&src, &dst).map_err(|source| DataError::Io { path: src, source })?;
        Ok(())
    }

    pub fn remove(&self, handle: &DataHandle) -> Result<(), DataError> {
        let path = self.path_for(handle);
        if path.is_file() {
            std::fs::remove_file(&path).map_err(|source| DataError::Io { path, source })?;
        }
        Ok(())
    }
}
