//! Artifact Store: durable storage for generated images and reports.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::generation::GeneratedImage;
use crate::state::ProductId;

pub mod filesystem;
pub mod gcs;

pub use filesystem::FileStorage;
pub use gcs::GcsStorage;

/// Object key of the image artifact for a product. Retries overwrite it.
pub fn image_key(id: ProductId, image: &GeneratedImage) -> String {
    format!("images/product_{}.{}", id, image.extension())
}

/// Rejects keys that would escape the store root.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|s| s.is_empty() || s == "." || s == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub trait ArtifactStore: Send + Sync {
    /// Writes `bytes` under `key`, replacing any previous object, and
    /// returns the durable URI.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError>;

    /// Stores a product image under its canonical key.
    fn store_image(&self, id: ProductId, image: &GeneratedImage) -> Result<String, StorageError> {
        self.put(&image_key(id, image), &image.bytes, &image.mime_type)
    }
}

/// Builds the configured store. The token is only used by remote stores.
pub fn open(
    config: &StorageConfig,
    token: SecretString,
    timeout: Duration,
) -> Result<Arc<dyn ArtifactStore>, StorageError> {
    match config {
        StorageConfig::Filesystem { root } => Ok(Arc::new(FileStorage::new(root))),
        StorageConfig::Gcs { bucket, prefix } => {
            Ok(Arc::new(GcsStorage::new(bucket, prefix, token, timeout)?))
        }
    }
}
