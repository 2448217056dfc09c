//! The canonical, redirect-aware view of one raw URL

use crate::resolver::transport::Probe;
use crate::source::UrlLabel;
use crate::url::{host_of, hosts_match, UrlComponents};
use std::sync::OnceLock;
use std::time::Duration;

/// One redirect response observed while following a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectHop {
    /// URL that answered with a redirect
    pub url: String,

    /// Redirect status code (301, 302, ...)
    pub status: u16,

    /// Raw `Location` header value, if any
    pub location: Option<String>,
}

/// The final response of a successful probe
#[derive(Debug, Clone, Default)]
pub struct ProbeResponse {
    /// URL of the response after all redirects
    pub final_url: String,

    /// HTTP status code of the final response
    pub status: u16,

    /// Headers with lower-cased names, in arrival order; repeated names are
    /// folded into one comma-separated value
    pub headers: Vec<(String, String)>,

    /// Cookies set by the final response as `(name, value)` pairs
    pub cookies: Vec<(String, String)>,

    /// Character set announced by `content-type`
    pub encoding: Option<String>,

    /// Time from sending the first request to receiving the final headers
    pub elapsed: Duration,

    /// Response body, truncated to the configured maximum size
    pub body: String,
}

impl ProbeResponse {
    /// Looks up a header by lower-case name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A raw URL together with everything learned from probing it once
///
/// Owned by one pipeline iteration and shared by reference with every
/// feature set. The structural components of `resolved_url` are parsed on
/// first access and cached for the lifetime of the instance.
#[derive(Debug)]
pub struct ResolvedUrl {
    raw_url: String,
    label: Option<UrlLabel>,
    probe: Option<ProbeResponse>,
    history: Vec<RedirectHop>,
    resolved_url: String,
    components: OnceLock<UrlComponents>,
}

impl ResolvedUrl {
    /// Builds a resolved URL from the outcome of a probe
    ///
    /// A missing probe means the transport failed; the raw URL is then used
    /// as the resolved URL and the redirect history is empty.
    pub fn new(raw_url: impl Into<String>, label: Option<UrlLabel>, probe: Option<Probe>) -> Self {
        let raw_url = raw_url.into();
        let (probe, history) = match probe {
            Some(Probe { response, history }) => (Some(response), history),
            None => (None, Vec::new()),
        };
        let resolved_url = choose_resolved(&raw_url, probe.as_ref(), &history);

        Self {
            raw_url,
            label,
            probe,
            history,
            resolved_url,
            components: OnceLock::new(),
        }
    }

    /// Builds a resolved URL without touching the network
    pub fn offline(raw_url: impl Into<String>, label: Option<UrlLabel>) -> Self {
        Self::new(raw_url, label, None)
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    pub fn label(&self) -> Option<UrlLabel> {
        self.label
    }

    pub fn probe(&self) -> Option<&ProbeResponse> {
        self.probe.as_ref()
    }

    pub fn redirect_history(&self) -> &[RedirectHop] {
        &self.history
    }

    pub fn resolved_url(&self) -> &str {
        &self.resolved_url
    }

    /// Structural components of the resolved URL, parsed once
    pub fn components(&self) -> &UrlComponents {
        self.components
            .get_or_init(|| UrlComponents::parse(&self.resolved_url))
    }
}

/// Picks the URL that stands for a raw URL after probing
///
/// The final response URL is trusted when it moved to another host, or when
/// at most one redirect led there. A chain of two or more redirects that ends
/// on the same host falls back to the raw URL, as does a failed probe.
pub fn choose_resolved(
    raw_url: &str,
    probe: Option<&ProbeResponse>,
    history: &[RedirectHop],
) -> String {
    let Some(response) = probe else {
        return raw_url.to_string();
    };

    let raw_host = host_of(raw_url).unwrap_or_default();
    let final_host = host_of(&response.final_url).unwrap_or_default();

    if !hosts_match(&final_host, &raw_host) || history.len() <= 1 {
        response.final_url.clone()
    } else {
        raw_url.to_string()
    }
}
