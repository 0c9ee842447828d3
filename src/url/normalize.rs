use crate::UrlError;
use url::Url;

/// Normalizes a URL for frontier membership
///
/// Normalization is light; spellings the site may treat differently stay apart:
///
/// 1. Parse the URL; reject if malformed
/// 2. Require an `http` or `https` scheme and a host
/// 3. Lowercase the host (done by the parser) and drop default ports
/// 4. Remove the fragment
///
/// Trailing slashes, query order and `www.` prefixes are left as found.
///
/// # Examples
///
/// ```
/// use url_harvest::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.test:443/a/#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.test/a/");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    Ok(url)
}

/// String form of [`normalize_url`], `None` when the input is not a usable URL
pub fn normalize_str(url_str: &str) -> Option<String> {
    normalize_url(url_str).ok().map(String::from)
}

/// Scheme, host and port of `url` without a trailing slash, e.g. `https://example.test`
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}
