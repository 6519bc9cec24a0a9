//! HTTP fetcher implementation
//!
//! This module handles the actual page requests issued by fetch workers:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with the referring page passed along
//! - Classifying failures so repeated network trouble can be counted per host

use crate::config::UserAgentConfig;
use crate::state::WorkItem;
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use std::fmt;
use std::time::Duration;

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server answered with a success status
    Fetched {
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value
        content_type: Option<String>,
        /// Body size in bytes
        bytes: usize,
    },

    /// The server answered with an error status
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// No usable answer (connection refused, timeout, TLS failure, ...)
    NetworkError {
        /// Error description
        error: String,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fetched { .. })
    }

    /// True for failures that say something about the host rather than the page
    pub fn is_network_issue(&self) -> bool {
        matches!(self, Self::NetworkError { .. })
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetched {
                status_code, bytes, ..
            } => write!(f, "{}\t{}", status_code, bytes),
            Self::HttpError { status_code } => write!(f, "{}\t-", status_code),
            Self::NetworkError { error } => {
                write!(f, "ERR\t{}", error.replace(['\t', '\n'], " "))
            }
        }
    }
}

/// Performs the fetch for one work item
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, item: &WorkItem) -> FetchOutcome;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Overall request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages over HTTP(S) with reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, item: &WorkItem) -> FetchOutcome {
        let mut request = self.client.get(item.target.as_str());
        if let Some(source) = &item.source {
            request = request.header(header::REFERER, source.as_str());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let status = response.status();
        if !status.is_success() {
            return FetchOutcome::HttpError {
                status_code: status.as_u16(),
            };
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match response.bytes().await {
            Ok(body) => FetchOutcome::Fetched {
                status_code: status.as_u16(),
                content_type,
                bytes: body.len(),
            },
            Err(e) => classify_error(&e),
        }
    }
}

fn classify_error(e: &reqwest::Error) -> FetchOutcome {
    let error = if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else {
        e.to_string()
    };
    FetchOutcome::NetworkError { error }
}
