use crate::url::normalize::ensure_scheme;
use url::Url;

/// Extracts the lowercase host from a parsed URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use urlscope::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
}

/// Extracts the host from a raw URL string, tolerating a missing scheme
///
/// Falls back to splitting on `//` and `/` when the string cannot be parsed.
pub fn host_of(url_str: &str) -> Option<String> {
    let parsed = Url::parse(&ensure_scheme(url_str))
        .ok()
        .and_then(|url| extract_domain(&url));

    parsed.or_else(|| {
        let after_scheme = url_str
            .split_once("//")
            .map_or(url_str, |(_, rest)| rest);
        let host = after_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        (!host.is_empty()).then_some(host)
    })
}

/// Strips a leading `www.` (or a bare `www` label) from a host
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.")
        .or_else(|| host.strip_prefix("www").filter(|rest| rest.is_empty()))
        .unwrap_or(host)
}

/// Returns true if two hosts name the same site
///
/// Hosts match on exact string equality after lowercasing and stripping a
/// leading `www.`. This is a string comparison, not DNS identity: aliases,
/// CNAMEs and sibling subdomains never match.
pub fn hosts_match(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    strip_www(&a) == strip_www(&b)
}

/// Splits a host into its dot-separated labels, dropping leading `www` labels
///
/// # Examples
///
/// ```
/// use urlscope::url::split_domains;
///
/// assert_eq!(split_domains("www.mail.example.com"), vec!["mail", "example", "com"]);
/// ```
pub fn split_domains(host: &str) -> Vec<String> {
    host.split('.')
        .skip_while(|label| label.starts_with("www"))
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}
