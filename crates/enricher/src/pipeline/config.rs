use std::time::Duration;

use crate::config::RunConfig;
use crate::error::ConfigError;

/// Parameters of one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub batch_size: usize,
    pub max_attempts: u32,
    /// Floor between consecutive external-service calls.
    pub request_delay: Duration,
    pub max_records: Option<usize>,
    pub workers: usize,
    pub state_write_retries: u32,
    pub state_write_backoff: Duration,
}

impl RunOptions {
    pub fn new(batch_size: usize, max_attempts: u32, request_delay: Duration) -> Self {
        Self {
            batch_size,
            max_attempts,
            request_delay,
            max_records: None,
            workers: 1,
            state_write_retries: 3,
            state_write_backoff: Duration::from_millis(100),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_attempts: config.max_attempts,
            request_delay: config.request_delay(),
            max_records: config.max_records,
            workers: config.workers,
            state_write_retries: config.state_write_retries,
            state_write_backoff: config.state_write_backoff(),
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = Some(max_records);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Validation {
            message: message.to_string(),
        };
        if self.batch_size < 1 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.max_attempts < 1 {
            return Err(invalid("max_attempts must be at least 1"));
        }
        if self.workers < 1 {
            return Err(invalid("workers must be at least 1"));
        }
        Ok(())
    }
}
