//! Robots.txt handling module
//!
//! This module provides fetching, parsing, and caching of robots.txt files.
//! Parsing compiles the rules into automatons (see [`crate::automaton`]);
//! downloading goes through the [`RobotsSource`] trait so tests and
//! alternative transports can stand in for HTTP.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::RobotsRuleset;

use crate::config::UserAgentConfig;
use crate::{CrawlError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Where robots.txt text comes from
#[async_trait]
pub trait RobotsSource: Send + Sync {
    /// Downloads robots.txt for a host
    ///
    /// Returns `Ok(None)` when the host has no robots.txt, which means
    /// everything is allowed.
    async fn fetch(&self, host: &str) -> Result<Option<String>>;
}

/// Downloads robots.txt over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpRobotsSource {
    client: Client,
    scheme: &'static str,
}

impl HttpRobotsSource {
    /// Builds a source that fetches `https://<host>/robots.txt`
    pub fn new(config: &UserAgentConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.header())
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            scheme: "https",
        })
    }

    /// Switches to plain HTTP
    pub fn insecure(mut self) -> Self {
        self.scheme = "http";
        self
    }
}

#[async_trait]
impl RobotsSource for HttpRobotsSource {
    async fn fetch(&self, host: &str) -> Result<Option<String>> {
        let url = format!("{}://{}/robots.txt", self.scheme, host);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| CrawlError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|source| CrawlError::Http { url, source })?;
            return Ok(Some(body));
        }

        // A missing or forbidden robots.txt means no restrictions
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            tracing::debug!("No robots.txt for {} (HTTP {})", host, status.as_u16());
            return Ok(None);
        }

        Err(CrawlError::HttpStatus {
            url,
            status: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source() -> HttpRobotsSource {
        HttpRobotsSource::new(&UserAgentConfig::default(), Duration::from_secs(5))
            .unwrap()
            .insecure()
    }

    fn host_of(server: &MockServer) -> String {
        server.uri().trim_start_matches("http://").to_string()
    }

    #[tokio::test]
    async fn test_fetches_robots_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /x\n"))
            .mount(&server)
            .await;

        let text = source().fetch(&host_of(&server)).await.unwrap();
        assert_eq!(text.as_deref(), Some("User-agent: *\nDisallow: /x\n"));
    }

    #[tokio::test]
    async fn test_missing_robots_allows_all() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let text = source().fetch(&host_of(&server)).await.unwrap();
        assert!(text.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = source().fetch(&host_of(&server)).await;
        assert!(matches!(
            result,
            Err(CrawlError::HttpStatus { status: 503, .. })
        ));
    }
}
