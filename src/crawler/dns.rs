//! Host name resolution for enrichment

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

/// Resolves a host to one address
///
/// `None` means the host could not be resolved; such items are never fetched.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Option<IpAddr>;
}

/// Uses the operating system resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return Some(ip);
        }

        match tokio::net::lookup_host((bare, 0)).await {
            Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
            Err(e) => {
                tracing::debug!("DNS lookup failed for {}: {}", host, e);
                None
            }
        }
    }
}

/// Answers from a fixed table; unknown hosts do not resolve
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, ip: IpAddr) -> Self {
        self.table.insert(host.to_ascii_lowercase(), ip);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        self.table.get(&host.to_ascii_lowercase()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_literals_resolve_to_themselves() {
        let resolver = SystemResolver;
        assert_eq!(
            resolver.resolve("10.1.2.3").await,
            Some("10.1.2.3".parse().unwrap())
        );
        assert_eq!(resolver.resolve("[::1]").await, Some("::1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_localhost_resolves() {
        assert!(SystemResolver.resolve("localhost").await.is_some());
    }

    #[tokio::test]
    async fn test_static_table() {
        let ip: IpAddr = "192.0.2.7".parse().unwrap();
        let resolver = StaticResolver::new().with("Example.org", ip);

        assert_eq!(resolver.resolve("example.org").await, Some(ip));
        assert_eq!(resolver.resolve("other.org").await, None);
    }
}
