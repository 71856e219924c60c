use thiserror::Error;

pub type StatsResult<T> = Result<T, StatsError>;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Retry budget exhausted on timeouts, connection failures or 5xx responses.
    #[error("request to {url} failed after {attempts} attempts: {message}")]
    TransientNetwork {
        url: String,
        attempts: usize,
        message: String,
    },

    #[error("HTTP {status} from {url}")]
    ClientError { url: String, status: u16 },

    /// The site does not expose the requested REST endpoint.
    #[error("REST endpoint not found: {url}")]
    EndpointNotFound { url: String },

    #[error("no media requests for the provided time period [{title}]")]
    NoDataForPeriod { title: String },

    #[error("bad request: {detail}")]
    BadRequest { detail: String },

    #[error("malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    #[error("wiki API error: {0}")]
    Wiki(String),
}

impl StatsError {
    pub fn malformed(url: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Skip-and-continue errors: the current file or site endpoint is dropped, the run goes on.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::EndpointNotFound { .. } | Self::NoDataForPeriod { .. }
        )
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_soft()
    }
}
