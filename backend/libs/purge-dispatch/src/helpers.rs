//! Helper functions for edge addressing and tag syntax

use once_cell::sync::Lazy;
use reqwest::Method;
use url::Url;

use crate::{PurgeError, Result};

/// Pattern purge verb understood by the edge fleet
pub static BAN: Lazy<Method> =
    Lazy::new(|| Method::from_bytes(b"BAN").expect("BAN is a valid method token"));

/// Exact-resource purge verb
pub static PURGE: Lazy<Method> =
    Lazy::new(|| Method::from_bytes(b"PURGE").expect("PURGE is a valid method token"));

/// Edge tag syntax: visible ASCII only. Tags travel space-separated in
/// header values, so spaces and control bytes are refused.
///
/// # Example
///
/// ```
/// use purge_dispatch::helpers::is_valid_tag;
///
/// assert!(is_valid_tag("node:1"));
/// assert!(!is_valid_tag("foo bar"));
/// assert!(!is_valid_tag("line\nbreak"));
/// ```
pub fn is_valid_tag(tag: &str) -> bool {
    tag.bytes().all(|b| b.is_ascii_graphic())
}

/// Build `http://{address}{path}` for an edge node
///
/// # Example
///
/// ```
/// use purge_dispatch::helpers::edge_url;
///
/// let url = edge_url("10.0.0.1:8080", "/tags").unwrap();
/// assert_eq!(url.as_str(), "http://10.0.0.1:8080/tags");
/// ```
pub fn edge_url(address: &str, path: &str) -> Result<Url> {
    Ok(Url::parse(&format!("http://{}", address))?.join(path)?)
}

/// Split an edge address into host and optional port
pub fn parse_edge_address(address: &str) -> Result<(String, Option<u16>)> {
    let parsed = Url::parse(&format!("http://{}", address))?;
    let host = parsed
        .host_str()
        .ok_or(PurgeError::InvalidUrl(url::ParseError::EmptyHost))?
        .to_string();
    Ok((host, parsed.port()))
}

/// `host[:port]` of a URL, as it would appear in a Host header
pub fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Point `url` at an edge node while remembering the original authority.
///
/// Returns the rewritten URL and the original `host[:port]`. With
/// `force_http` the scheme is downgraded to `http`.
///
/// # Example
///
/// ```
/// use purge_dispatch::helpers::rewrite_for_edge;
///
/// let (target, host) =
///     rewrite_for_edge("https://www.example.com/news?page=2", "10.0.0.1:8080", true).unwrap();
/// assert_eq!(target.as_str(), "http://10.0.0.1:8080/news?page=2");
/// assert_eq!(host, "www.example.com");
/// ```
pub fn rewrite_for_edge(url: &str, address: &str, force_http: bool) -> Result<(Url, String)> {
    let mut target = Url::parse(url)?;
    let original =
        authority(&target).ok_or(PurgeError::InvalidUrl(url::ParseError::EmptyHost))?;

    if force_http && target.scheme() != "http" {
        target
            .set_scheme("http")
            .map_err(|_| PurgeError::InvalidUrl(url::ParseError::RelativeUrlWithoutBase))?;
    }

    let (host, port) = parse_edge_address(address)?;
    target.set_host(Some(&host))?;
    target
        .set_port(port)
        .map_err(|_| PurgeError::InvalidUrl(url::ParseError::InvalidPort))?;

    Ok((target, original))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_methods() {
        assert_eq!(BAN.as_str(), "BAN");
        assert_eq!(PURGE.as_str(), "PURGE");
    }

    #[test]
    fn test_is_valid_tag() {
        assert!(is_valid_tag("node:1"));
        assert!(is_valid_tag("config:system.site"));
        assert!(is_valid_tag(""));
        assert!(!is_valid_tag("foo bar"));
        assert!(!is_valid_tag(" leading"));
        assert!(!is_valid_tag("line\nbreak"));
        assert!(!is_valid_tag("tab\there"));
        assert!(!is_valid_tag("del\x7f"));
        assert!(!is_valid_tag("ünïcødé"));
    }

    #[test]
    fn test_edge_url() {
        assert_eq!(
            edge_url("10.0.0.1", "/site").unwrap().as_str(),
            "http://10.0.0.1/site"
        );
        assert_eq!(
            edge_url("[::1]:6081", "/tags").unwrap().as_str(),
            "http://[::1]:6081/tags"
        );
    }

    #[test]
    fn test_parse_edge_address() {
        assert_eq!(
            parse_edge_address("10.0.0.1").unwrap(),
            ("10.0.0.1".to_string(), None)
        );
        assert_eq!(
            parse_edge_address("edge-1.internal:6081").unwrap(),
            ("edge-1.internal".to_string(), Some(6081))
        );
        assert!(parse_edge_address("").is_err());
    }

    #[test]
    fn test_rewrite_keeps_scheme_for_exact_purge() {
        let (target, host) =
            rewrite_for_edge("https://example.com:8443/a/b?x=1", "10.0.0.2", false).unwrap();
        assert_eq!(target.as_str(), "https://10.0.0.2/a/b?x=1");
        assert_eq!(host, "example.com:8443");
    }

    #[test]
    fn test_rewrite_forces_http() {
        let (target, host) =
            rewrite_for_edge("https://example.com/news/*", "10.0.0.2:80", true).unwrap();
        assert_eq!(target.scheme(), "http");
        assert_eq!(target.host_str(), Some("10.0.0.2"));
        assert_eq!(target.path(), "/news/*");
        assert_eq!(host, "example.com");
    }

    #[test]
    fn test_rewrite_rejects_garbage() {
        assert!(rewrite_for_edge("not a url", "10.0.0.1", false).is_err());
        assert!(rewrite_for_edge("mailto:someone@example.com", "10.0.0.1", false).is_err());
    }
}
