//! Blocking HTTP plumbing shared by the Vertex AI model clients.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::GenerationError;
use crate::config::GenerationConfig;

/// Maximum length of an error body kept in `last_error`.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Truncates a response body on a char boundary so it fits in diagnostics.
pub(crate) fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

pub struct VertexClient {
    http: Client,
    base_url: String,
    project_id: String,
    location: String,
    token: SecretString,
}

impl VertexClient {
    pub fn new(config: &GenerationConfig, token: SecretString) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("enricher/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::Http {
                service: "http client",
                source: e,
            })?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            project_id: config.project_id.clone(),
            location: config.location.clone(),
            token,
        })
    }

    /// `{base}/v1/projects/{project}/locations/{location}/publishers/google/models/{model}:{method}`
    pub fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:{}",
            self.base_url, self.project_id, self.location, model, method
        )
    }

    /// POSTs a JSON body and decodes a JSON response.
    pub fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        service: &'static str,
        url: &str,
        body: &B,
    ) -> Result<T, GenerationError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .map_err(|e| GenerationError::Http { service, source: e })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited { service });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Status {
                service,
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        response
            .json::<T>()
            .map_err(|e| GenerationError::InvalidResponse {
                service,
                reason: e.to_string(),
            })
    }
}
