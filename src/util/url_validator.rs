use thiserror::Error;
use url::Url;

/// Errors raised when a feed URL is rejected.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Validates a URL string for use as a feed source.
///
/// Feeds are fetched with a plain HTTP GET, so only `http` and `https` are
/// accepted. Hosts are not filtered; self-hosted feeds on a LAN are a normal
/// subscription.
///
/// # Examples
///
/// ```
/// use siphon::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://example.com/feed.xml").is_ok());
        assert!(validate_url("http://news.example.org").is_ok());
        assert!(validate_url("http://127.0.0.1:8080/rss").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(s)) if s == "file"
        ));
        assert!(validate_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_unparseable() {
        assert!(matches!(
            validate_url("example.com/feed"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
        assert!(validate_url("").is_err());
    }
}
