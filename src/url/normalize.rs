use crate::UrlError;
use url::Url;

/// Query parameters that only carry tracking state
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "mc_cid", "msclkid", "yclid"];

/// Normalizes a discovered link before it is deduplicated
///
/// # Normalization Steps
///
/// 1. Parse the URL (the parser already lowercases the host, drops default
///    ports and resolves dot segments)
/// 2. Remove the fragment
/// 3. Remove tracking query parameters (`utm_*` and a fixed list)
/// 4. Sort the remaining query parameters
/// 5. Drop an empty query string
///
/// The scheme and path are left alone: unsupported schemes are flagged later
/// rather than rejected here, and trailing slashes are significant to
/// robots.txt rules.
///
/// # Examples
///
/// ```
/// use crawlgate::url::normalize_url;
///
/// let url = normalize_url("HTTP://Example.COM:80/a/../b/?utm_source=x&z=1&a=2#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/b/?a=2&z=1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Resolves a possibly relative link against the page it was found on
pub fn resolve_link(base: Option<&Url>, link: &str) -> Result<Url, UrlError> {
    match base {
        Some(base) => {
            let joined = base
                .join(link.trim())
                .map_err(|e| UrlError::Parse(e.to_string()))?;
            normalize_url(joined.as_str())
        }
        None => normalize_url(link),
    }
}

fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme_and_trailing_slash() {
        let url = normalize_url("http://example.com/daylight/").unwrap();
        assert_eq!(url.as_str(), "http://example.com/daylight/");
    }

    #[test]
    fn test_removes_fragment() {
        let url = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(url.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_drops_query_made_only_of_tracking() {
        let url = normalize_url("https://example.com/?utm_medium=a&fbclid=b").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_sorts_query() {
        let url = normalize_url("https://example.com/s?q=rust&a=1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/s?a=1&q=rust");
    }

    #[test]
    fn test_unsupported_scheme_is_not_an_error() {
        let url = normalize_url("ftp://files.example.com/x").unwrap();
        assert_eq!(url.scheme(), "ftp");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_resolve_relative_link() {
        let base = Url::parse("https://example.com/docs/index.html").unwrap();
        let url = resolve_link(Some(&base), "../about#team").unwrap();
        assert_eq!(url.as_str(), "https://example.com/about");

        let url = resolve_link(None, "https://other.org/").unwrap();
        assert_eq!(url.as_str(), "https://other.org/");
        assert!(resolve_link(None, "/relative").is_err());
    }
}
