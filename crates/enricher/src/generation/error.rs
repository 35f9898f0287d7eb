use thiserror::Error;

/// Failure of a single generation call. Recorded against the record, never
/// fatal to a run.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("request to {service} failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} rejected the request: rate limited (HTTP 429)")]
    RateLimited { service: &'static str },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    #[error("{service} returned no {what}")]
    Empty {
        service: &'static str,
        what: &'static str,
    },
}

impl GenerationError {
    /// Timeouts and rate limiting are worth another attempt in a later run.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Http { source, .. } => source.is_timeout() || source.is_connect(),
            GenerationError::RateLimited { .. } => true,
            GenerationError::Status { status, .. } => *status >= 500,
            GenerationError::InvalidResponse { .. } | GenerationError::Empty { .. } => false,
        }
    }
}
