use std::io::Write;
use std::path::{Path, PathBuf};

use super::{validate_key, ArtifactStore};
use crate::error::StorageError;

/// Move a file from `src` to `dst`. Uses `rename` first (atomic on the same
/// filesystem) and falls back to copy + delete for cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Stores artifacts below a local root directory.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(root))
                .unwrap_or_else(|_| root.to_path_buf())
        };
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        key.split('/').fold(self.root.clone(), |path, s| path.join(s))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Writes to a sibling temp file, syncs it, then moves it over the
    /// target so readers never see a partial artifact.
    fn write_atomic(&self, target: &Path, content: &[u8]) -> Result<(), StorageError> {
        let dir = target.parent().unwrap_or(&self.root);
        self.ensure_directory(dir)?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let write = || -> std::io::Result<()> {
            let mut file = std::fs::File::create(&temp_path)?;
            file.write_all(content)?;
            file.sync_all()
        };
        if let Err(e) = write() {
            let _ = std::fs::remove_file(&temp_path);
            return Err(StorageError::WriteFile {
                path: temp_path,
                source: e,
            });
        }

        move_file(&temp_path, target).inspect_err(|_| {
            let _ = std::fs::remove_file(&temp_path);
        })
    }
}

impl ArtifactStore for FileStorage {
    fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        let path = self.path_for(key);
        self.write_atomic(&path, bytes)?;
        log::debug!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(format!("file://{}", path.display()))
    }
}
