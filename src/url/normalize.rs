use crate::UrlError;
use url::Url;

/// Schemes that are absolute without a `//` authority part
const OPAQUE_SCHEMES: &[&str] = &["mailto", "javascript", "data", "tel", "about"];

/// Returns true if the string already looks like an absolute URL
///
/// A string is absolute when it starts with `scheme://` or with one of the
/// opaque schemes (`mailto:`, `javascript:`, ...). A bare `host:port` prefix
/// such as `example.com:8080/path` is not treated as a scheme.
pub fn has_scheme(url_str: &str) -> bool {
    let Some((scheme, rest)) = url_str.split_once(':') else {
        return false;
    };

    let mut chars = scheme.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    };

    if !valid {
        return false;
    }

    rest.starts_with("//") || OPAQUE_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str())
}

/// Prefixes `http://` onto URLs that carry no scheme
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace
/// 2. Protocol-relative URLs (`//host/path`) get `http:` prepended
/// 3. URLs without a scheme, or starting with `www`, get `http://` prepended
///
/// # Examples
///
/// ```
/// use urlscope::url::ensure_scheme;
///
/// assert_eq!(ensure_scheme("example.com/a"), "http://example.com/a");
/// assert_eq!(ensure_scheme("https://example.com"), "https://example.com");
/// ```
pub fn ensure_scheme(url_str: &str) -> String {
    let trimmed = url_str.trim();

    if let Some(rest) = trimmed.strip_prefix("//") {
        return format!("http://{}", rest);
    }

    if has_scheme(trimmed) && !trimmed.starts_with("www") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Parses a raw URL into an absolute HTTP(S) URL suitable for probing
///
/// # Arguments
///
/// * `url_str` - The raw URL string, with or without a scheme
///
/// # Returns
///
/// * `Ok(Url)` - Absolute URL with an http or https scheme and a host
/// * `Err(UrlError)` - The string cannot be probed
pub fn parse_absolute(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(&ensure_scheme(url_str)).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes can be probed, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}
