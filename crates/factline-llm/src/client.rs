use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use factline_core::LlmError;

use crate::retry::{
    is_retryable_http_error, new_request_id, parse_retry_after_ms, should_retry_status,
    RetryPolicy,
};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone)]
/// Public struct `OpenAiConfig` for any OpenAI-compatible endpoint.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retry: RetryPolicy::default(),
        }
    }
}

/// Blocking JSON transport shared by the chat gateway and the embedder.
#[derive(Debug, Clone)]
pub struct OpenAiTransport {
    client: reqwest::blocking::Client,
    config: OpenAiConfig,
}

fn http_error(error: reqwest::Error) -> LlmError {
    LlmError::Http(error.to_string())
}

impl OpenAiTransport {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        if config.api_base.trim().is_empty() {
            return Err(LlmError::InvalidResponse(
                "api_base must not be empty".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| {
                LlmError::InvalidResponse(format!("invalid API key header: {e}"))
            })?,
        );

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(http_error)?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.config.api_base.trim().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if base.ends_with(path) {
            return base.to_string();
        }
        format!("{base}/{path}")
    }

    /// POSTs `body` to `path` and returns the decoded JSON response.
    pub fn post_json(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
        let url = self.endpoint(path);
        let started = Instant::now();
        let mut attempt = 0usize;
        loop {
            let response = self
                .client
                .post(&url)
                .header("x-factline-request-id", new_request_id())
                .header("x-factline-retry-attempt", attempt.to_string())
                .json(body)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let raw = response.text().map_err(http_error)?;
                        return Ok(serde_json::from_str::<Value>(&raw)?);
                    }
                    let retry_after_ms = parse_retry_after_ms(response.headers());
                    let raw = response.text().unwrap_or_default();
                    if should_retry_status(status.as_u16()) {
                        if let Some(delay) =
                            self.config
                                .retry
                                .delay_for(attempt, started.elapsed(), retry_after_ms)
                        {
                            tracing::warn!(
                                status = status.as_u16(),
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "retrying provider request"
                            );
                            std::thread::sleep(delay);
                            attempt += 1;
                            continue;
                        }
                    }
                    return Err(LlmError::HttpStatus {
                        status: status.as_u16(),
                        body: raw.chars().take(480).collect(),
                    });
                }
                Err(error) => {
                    if is_retryable_http_error(&error) {
                        if let Some(delay) =
                            self.config.retry.delay_for(attempt, started.elapsed(), None)
                        {
                            tracing::warn!(
                                error = %error,
                                attempt,
                                "retrying provider request after transport error"
                            );
                            std::thread::sleep(delay);
                            attempt += 1;
                            continue;
                        }
                    }
                    return Err(http_error(error));
                }
            }
        }
    }
}
