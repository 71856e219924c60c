use std::thread::sleep;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{FROM, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClientSettings;
use crate::error::{StatsError, StatsResult};

/// Raw outcome of a GET. Status interpretation is left to the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> StatsResult<T> {
        serde_json::from_str(&self.body)
            .map_err(|error| StatsError::malformed(&self.url, error.to_string()))
    }

    pub fn client_error(&self) -> StatsError {
        StatsError::ClientError {
            url: self.url.clone(),
            status: self.status,
        }
    }
}

/// Outbound HTTP seam. Implementations retry transient failures themselves.
pub trait HttpFetch {
    fn get(&mut self, url: &str) -> StatsResult<RemoteResponse>;
    fn request_count(&self) -> usize;
}

pub struct RemoteClient {
    client: Client,
    settings: ClientSettings,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl RemoteClient {
    pub fn new(settings: ClientSettings) -> StatsResult<Self> {
        let mut headers = HeaderMap::new();
        let from = HeaderValue::from_str(&settings.contact).map_err(|_| {
            StatsError::Config(format!(
                "contact identity is not a valid header value: {}",
                settings.contact
            ))
        })?;
        headers.insert(FROM, from);

        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|error| StatsError::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            client,
            settings,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn apply_rate_limit(&mut self) {
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < self.settings.rate_limit {
                sleep(self.settings.rate_limit - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }
}

impl HttpFetch for RemoteClient {
    fn get(&mut self, url: &str) -> StatsResult<RemoteResponse> {
        let max_retries = self.settings.max_retries;
        let mut last_error = String::new();
        let mut attempts = 0usize;

        for attempt in 0..=max_retries {
            attempts += 1;
            self.apply_rate_limit();
            match self.client.get(url).send() {
                Ok(response) => {
                    let status = response.status();
                    if is_retryable_status(status) {
                        last_error = format!("HTTP {status}");
                        if attempt < max_retries {
                            warn!(url, %status, attempt, "retrying after server error");
                            sleep(backoff_delay(self.settings.backoff_factor, attempt));
                            continue;
                        }
                        break;
                    }
                    let body = match response.text() {
                        Ok(body) => body,
                        Err(error) if is_retryable_error(&error) && attempt < max_retries => {
                            last_error = error.to_string();
                            sleep(backoff_delay(self.settings.backoff_factor, attempt));
                            continue;
                        }
                        Err(error) => {
                            last_error = error.to_string();
                            break;
                        }
                    };
                    debug!(url, status = status.as_u16(), "request_result");
                    return Ok(RemoteResponse {
                        url: url.to_string(),
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(error) => {
                    last_error = error.to_string();
                    if attempt < max_retries && is_retryable_error(&error) {
                        warn!(url, attempt, error = %error, "retrying after network failure");
                        sleep(backoff_delay(self.settings.backoff_factor, attempt));
                        continue;
                    }
                    break;
                }
            }
        }

        Err(StatsError::TransientNetwork {
            url: url.to_string(),
            attempts,
            message: last_error,
        })
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// factor, 2*factor, 4*factor, ... for attempt 0, 1, 2, ...
pub fn backoff_delay(factor: Duration, attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt).unwrap_or(16).min(16);
    factor.saturating_mul(2u32.saturating_pow(exponent))
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}
