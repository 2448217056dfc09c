//! URL resolution
//!
//! The resolver turns a raw URL into a [`ResolvedUrl`] by probing it once
//! over HTTP. Resolution never fails: any transport problem degrades to a
//! resolved URL equal to the raw input with no response attached.

mod resolved;
mod transport;

pub use resolved::{choose_resolved, ProbeResponse, RedirectHop, ResolvedUrl};
pub use transport::{build_http_client, charset_of, HttpTransport, Probe, Transport, TransportError};

use crate::config::ResolverConfig;
use crate::source::RawUrlRecord;
use crate::url::parse_absolute;
use std::sync::Arc;

/// Probes raw URLs and builds their resolved form
#[derive(Clone)]
pub struct Resolver {
    transport: Arc<dyn Transport>,
}

impl Resolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Creates a resolver backed by the HTTP transport
    pub fn from_config(config: &ResolverConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    /// Resolves one raw record
    ///
    /// # Steps
    ///
    /// 1. Prefix `http://` when the URL carries no scheme or starts with `www`
    /// 2. Probe once, following redirects
    /// 3. Pick the resolved URL from the probe outcome
    pub async fn resolve(&self, record: &RawUrlRecord) -> ResolvedUrl {
        let target = match parse_absolute(&record.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Not probing {}: {}", record.url, e);
                return ResolvedUrl::offline(record.url.clone(), record.label);
            }
        };

        match self.transport.probe(&target).await {
            Ok(probe) => {
                tracing::debug!(
                    "Probed {} -> {} ({} redirects)",
                    record.url,
                    probe.response.final_url,
                    probe.history.len()
                );
                ResolvedUrl::new(record.url.clone(), record.label, Some(probe))
            }
            Err(e) => {
                tracing::debug!("Probe failed for {}: {}", record.url, e);
                ResolvedUrl::offline(record.url.clone(), record.label)
            }
        }
    }
}
