use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Why a subscription URL was refused.
///
/// Besides parse failures this covers the SSRF policy: a bot that fetches
/// arbitrary user-supplied URLs must not be pointed at internal hosts.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Empty URL")]
    Empty,
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Turn user input into the canonical form a feed is stored and keyed under.
///
/// - surrounding whitespace is dropped
/// - a bare `example.com/rss` gets an `http://` scheme
/// - scheme and host are lowercased and default ports removed (by [`Url`]);
///   path and query keep their case since servers may treat them as significant
///
/// Two users adding `HTTPS://Example.com/rss` and `https://example.com/rss`
/// therefore share one feed and one cursor.
///
/// ```
/// use rssbot::util::normalize_feed_url;
///
/// let url = normalize_feed_url(" HTTPS://Example.COM:443/Feed.xml ").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/Feed.xml");
///
/// assert!(normalize_feed_url("http://localhost/feed").is_err());
/// assert!(normalize_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn normalize_feed_url(input: &str) -> Result<Url, UrlValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlValidationError::Empty);
    }

    let url = if trimmed.contains("://") {
        Url::parse(trimmed)?
    } else {
        Url::parse(&format!("http://{trimmed}"))?
    };

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if host == "localhost" || host.ends_with(".localhost") {
        return Err(UrlValidationError::Localhost);
    }

    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            if v6.is_unspecified() {
                return true;
            }
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return mapped.is_loopback() || is_private_ip(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
