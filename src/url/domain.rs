use url::Url;

/// Extracts the lowercase host of a URL
///
/// A trailing root dot (`example.com.`) is dropped so both spellings share
/// host state. IPv6 hosts keep their brackets.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use crawlgate::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.com./path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("mailto:someone@example.com").unwrap();
/// assert_eq!(extract_domain(&url), None);
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

/// Returns the top-level label of a host name
///
/// IP literals have no top-level domain.
pub fn top_level_domain(host: &str) -> Option<&str> {
    if host.starts_with('[') || host.parse::<std::net::IpAddr>().is_ok() {
        return None;
    }
    host.rsplit('.').next().filter(|label| !label.is_empty())
}
