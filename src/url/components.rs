//! Structural breakdown of a resolved URL
//!
//! Components come from the structured parser first. When the parser rejects
//! the string (schemeless or malformed input) or yields an empty component,
//! the value is recovered by splitting the raw string on `//`, `/`, `?` and
//! `#` instead.

use crate::url::domain::split_domains;
use crate::url::normalize::has_scheme;
use serde::Serialize;
use url::Url;

/// One `key=value` pair from a query string
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParam {
    pub key: String,
    pub value: String,
}

/// Structural sub-fields of a URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlComponents {
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub query_params: Vec<QueryParam>,
    pub fragment: String,
    pub fragments: Vec<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domains: Vec<String>,
}

/// Pieces recovered by splitting the raw string by hand
#[derive(Debug, Default)]
struct ManualSplit<'a> {
    host: &'a str,
    port: Option<u16>,
    username: Option<&'a str>,
    password: Option<&'a str>,
    path: &'a str,
    query: &'a str,
    fragment: &'a str,
}

impl<'a> ManualSplit<'a> {
    fn new(url_str: &'a str) -> Self {
        let after_scheme = url_str
            .split_once("//")
            .map_or(url_str, |(_, rest)| rest);

        let (rest, fragment) = after_scheme.split_once('#').unwrap_or((after_scheme, ""));
        let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => (rest, ""),
        };

        let (userinfo, host_port) = match authority.rsplit_once('@') {
            Some((userinfo, host_port)) => (Some(userinfo), host_port),
            None => (None, authority),
        };
        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (Some(user), Some(pass)),
                None => (Some(info), None),
            },
            None => (None, None),
        };

        // A trailing `:digits` is a port unless it sits inside IPv6 brackets
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port))
                if !port.is_empty()
                    && port.chars().all(|c| c.is_ascii_digit())
                    && (!host.starts_with('[') || host.ends_with(']')) =>
            {
                (host, port.parse().ok())
            }
            _ => (host_port, None),
        };

        Self {
            host,
            port,
            username: username.filter(|u| !u.is_empty()),
            password: password.filter(|p| !p.is_empty()),
            path,
            query,
            fragment,
        }
    }
}

impl UrlComponents {
    /// Breaks a URL string into its components
    ///
    /// # Examples
    ///
    /// ```
    /// use urlscope::url::UrlComponents;
    ///
    /// let parts = UrlComponents::parse("example.com/a/b");
    /// assert_eq!(parts.host, "example.com");
    /// assert_eq!(parts.path, "/a/b");
    /// ```
    pub fn parse(url_str: &str) -> Self {
        let structured = if has_scheme(url_str) {
            Url::parse(url_str).ok()
        } else {
            None
        };
        let manual = ManualSplit::new(url_str);

        let (scheme, host, path, query, fragment, port, username, password) = match &structured {
            Some(url) => (
                url.scheme().to_string(),
                url.host_str().unwrap_or_default().to_string(),
                url.path().to_string(),
                url.query().unwrap_or_default().to_string(),
                url.fragment().unwrap_or_default().to_string(),
                url.port(),
                Some(url.username()).filter(|u| !u.is_empty()).map(str::to_string),
                url.password().filter(|p| !p.is_empty()).map(str::to_string),
            ),
            None => Default::default(),
        };

        let host = or_fallback(host, manual.host);
        let path = or_fallback(path, manual.path);
        let query = or_fallback(query, manual.query);
        let fragment = or_fallback(fragment, manual.fragment);
        let port = port.or(manual.port);
        let username = username.or_else(|| manual.username.map(str::to_string));
        let password = password.or_else(|| manual.password.map(str::to_string));

        let query_params = parse_query_params(&query);
        let fragments = fragment
            .split('#')
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect();
        let domains = split_domains(&host);

        Self {
            scheme,
            host,
            path,
            query,
            query_params,
            fragment,
            fragments,
            port,
            username,
            password,
            domains,
        }
    }
}

fn or_fallback(parsed: String, manual: &str) -> String {
    if parsed.is_empty() {
        manual.to_string()
    } else {
        parsed
    }
}

/// Splits a query string into ordered pairs, dropping empty and `=`-free segments
fn parse_query_params(query: &str) -> Vec<QueryParam> {
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.split_once('='))
        .map(|(key, value)| QueryParam {
            key: key.to_string(),
            value: value.to_string(),
        })
        .collect()
}
