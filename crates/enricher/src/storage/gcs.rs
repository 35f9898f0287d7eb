//! Google Cloud Storage backend using the JSON API media upload.

use std::time::Duration;

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};

use super::{validate_key, ArtifactStore};
use crate::error::StorageError;
use crate::generation::vertex::truncate_body;

const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

pub struct GcsStorage {
    http: Client,
    endpoint: String,
    bucket: String,
    prefix: String,
    token: SecretString,
}

impl GcsStorage {
    pub fn new(
        bucket: &str,
        prefix: &str,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(StorageError::Client)?;
        Ok(Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            token,
        })
    }

    /// Points uploads at another host, e.g. a local emulator.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    /// Full object name including the configured prefix.
    pub fn object_name(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/storage/v1/b/{}/o", self.endpoint, self.bucket)
    }
}

impl ArtifactStore for GcsStorage {
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        let name = self.object_name(key);

        let response = self
            .http
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", name.as_str())])
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .map_err(|e| StorageError::Upload {
                key: name.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StorageError::UploadRejected {
                key: name,
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        log::debug!("Uploaded gs://{}/{} ({} bytes)", self.bucket, name, bytes.len());
        Ok(format!("gs://{}/{}", self.bucket, name))
    }
}
