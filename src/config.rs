//! Run configuration: the endpoint a benchmark talks to, and the list of
//! batch sizes it sweeps.

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("batch size `{0}` is not a number")]
    NotANumber(String),
    #[error("batch size must be greater than 0 (got `{0}`)")]
    NonPositive(String),
    #[error("no batch sizes given")]
    EmptyBatchSizes,
    #[error("base URL `{0}` must start with http:// or https://")]
    InvalidUrl(String),
}

/// Connection settings for the completion endpoint. Built once by the caller
/// and handed to the client; nothing here is global.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-request deadline. `None` means a hung request blocks its group.
    pub request_timeout: Option<Duration>,
}

impl EndpointConfig {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        request_timeout: Option<Duration>,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(base_url));
        }
        Ok(Self {
            base_url,
            api_key: api_key.trim().to_string(),
            model: model.trim().to_string(),
            request_timeout,
        })
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: None,
        }
    }
}

/// Parse a comma-separated list of positive batch sizes, e.g. `"1, 2,4"`.
///
/// Repeated sizes are dropped after their first occurrence: each size owns
/// one set of output files and one comparison row.
pub fn parse_batch_sizes(input: &str) -> Result<Vec<usize>, ConfigError> {
    let mut sizes = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let value: i64 = part
            .parse()
            .map_err(|_| ConfigError::NotANumber(part.to_string()))?;
        if value <= 0 {
            return Err(ConfigError::NonPositive(part.to_string()));
        }
        let value = value as usize;
        if !sizes.contains(&value) {
            sizes.push(value);
        }
    }
    if sizes.is_empty() {
        return Err(ConfigError::EmptyBatchSizes);
    }
    Ok(sizes)
}
