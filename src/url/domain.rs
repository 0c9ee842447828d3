use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use url_harvest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Whether `host` belongs to the harvested `domain`
///
/// Exact match always qualifies. With `allow_subdomains`, any `*.domain` host
/// qualifies as well; `www.` gets no special treatment either way.
pub fn host_in_scope(host: &str, domain: &str, allow_subdomains: bool) -> bool {
    let host = host.trim_end_matches('.');
    let domain = domain.trim_end_matches('.');

    if host.eq_ignore_ascii_case(domain) {
        return true;
    }

    if !allow_subdomains || host.len() <= domain.len() + 1 {
        return false;
    }

    let split = host.len() - domain.len();
    host.is_char_boundary(split)
        && host[split..].eq_ignore_ascii_case(domain)
        && host.as_bytes()[split - 1] == b'.'
}
