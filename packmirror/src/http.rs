//! HTTP client abstraction for testability.
//!
//! The engine only needs one primitive: fetch the body at a URL. Everything
//! else (mirror selection, retries, persistence) is layered on top, so tests
//! swap in a mock client and exercise the full engine without a network.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::{MirrorError, MirrorResult};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("packmirror/", env!("CARGO_PKG_VERSION"));

/// Why a single request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    Status(u16),
    /// The request exceeded the client timeout.
    Timeout,
    /// Connection, TLS or body read failure.
    Transport(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Status(code) => write!(f, "HTTP {}", code),
            FetchError::Timeout => write!(f, "request timed out"),
            FetchError::Transport(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Asynchronous request primitive.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the response body.
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestClient {
    /// Creates a client with the default timeout and user agent.
    pub fn new() -> MirrorResult<Self> {
        Self::with_settings(Duration::from_secs(DEFAULT_TIMEOUT_SECS), DEFAULT_USER_AGENT)
    }

    /// Creates a client with a custom timeout and user agent.
    pub fn with_settings(timeout: Duration, user_agent: &str) -> MirrorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| MirrorError::HttpClient(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl AsyncHttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response.bytes().await.map(|b| b.to_vec()).map_err(classify)
    }
}

fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(error.to_string())
    }
}
