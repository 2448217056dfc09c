//! Host features (`ht_`)
//!
//! Three upstream lookups feed this set: a DNS resolution of the resolved
//! host, the threat-intel document for that address, and the web archive's
//! captures of the resolved URL (query string dropped). Intel and archive
//! run concurrently once the address is known. Each lookup that fails leaves
//! its features null or empty; none of them fail the set.

use crate::config::FeaturesConfig;
use crate::features::{
    evaluate, manifest_names, FeatureError, FeatureFamily, FeatureRecord, FeatureSet,
    FeatureValue, Manifest,
};
use crate::intel::{ArchiveSource, HostIntel, IntelCertificate, IntelSource, Snapshot};
use crate::resolver::ResolvedUrl;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Everything the host extractors read
#[derive(Debug, Clone)]
pub struct HostContext {
    /// Empty when DNS resolution failed
    ip: String,
    intel: Option<HostIntel>,
    snapshots: Option<Vec<Snapshot>>,
    today: NaiveDate,
}

impl HostContext {
    pub fn new(
        ip: String,
        intel: Option<HostIntel>,
        snapshots: Option<Vec<Snapshot>>,
        today: NaiveDate,
    ) -> Self {
        Self {
            ip,
            intel,
            snapshots,
            today,
        }
    }

    fn attribute(&self, name: &str) -> FeatureValue {
        self.intel
            .as_ref()
            .map(|intel| intel.attribute(name))
            .unwrap_or_default()
            .into()
    }

    fn certificate(&self) -> Option<&IntelCertificate> {
        self.intel.as_ref().and_then(HostIntel::certificate)
    }

    fn days_since(&self, moment: Option<NaiveDateTime>) -> Option<i64> {
        moment.map(|m| (self.today - m.date()).num_days())
    }

    fn snapshots(&self) -> &[Snapshot] {
        self.snapshots.as_deref().unwrap_or_default()
    }

    fn first_seen(&self) -> Option<NaiveDateTime> {
        self.snapshots().first().map(|s| s.timestamp)
    }

    fn last_seen(&self) -> Option<NaiveDateTime> {
        self.snapshots().last().map(|s| s.timestamp)
    }

    fn num_live(&self) -> Option<usize> {
        self.snapshots
            .as_ref()
            .map(|snaps| snaps.iter().filter(|s| s.is_live()).count())
    }
}

fn non_empty(count: usize) -> FeatureValue {
    (count > 0).then_some(count).into()
}

const HOST_FEATURES: Manifest<HostContext> = &[
    ("ht_ip_address", |c| (!c.ip.is_empty()).then(|| c.ip.clone()).into()),
    ("ht_is_ipv4", |c| c.ip.contains('.').into()),
    ("ht_is_ipv6", |c| c.ip.contains(':').into()),
    ("ht_open_port_443", |c| {
        c.intel.as_ref().map(|i| i.ports.contains(&443)).into()
    }),
    ("ht_has_cert", |c| c.certificate().is_some().into()),
    ("ht_ssl_version", |c| {
        c.certificate()
            .and_then(|cert| cert.version.as_ref())
            .map(FeatureValue::from_json)
            .unwrap_or_default()
    }),
    ("ht_region", |c| c.attribute("region_code")),
    ("ht_country", |c| c.attribute("country_name")),
    ("ht_city", |c| c.attribute("city")),
    ("ht_area_code", |c| c.attribute("area_code")),
    ("ht_org", |c| c.attribute("org")),
    ("ht_isp", |c| c.attribute("isp")),
    ("ht_asn", |c| c.attribute("asn")),
    ("ht_total_open_ports", |c| {
        c.intel.as_ref().map_or(FeatureValue::Null, |i| non_empty(i.ports.len()))
    }),
    ("ht_total_vulnerabilities", |c| {
        c.intel
            .as_ref()
            .map_or(FeatureValue::Null, |i| non_empty(i.num_vulnerabilities()))
    }),
    ("ht_total_services", |c| {
        c.intel.as_ref().map_or(FeatureValue::Null, |i| non_empty(i.data.len()))
    }),
    ("ht_certificate_issued", |c| {
        c.certificate()
            .and_then(IntelCertificate::issued_at)
            .map(|t| t.to_string())
            .into()
    }),
    ("ht_certificate_expiry", |c| {
        c.certificate()
            .and_then(IntelCertificate::expires_at)
            .map(|t| t.to_string())
            .into()
    }),
    ("ht_days_to_expiry", |c| {
        c.days_since(c.certificate().and_then(IntelCertificate::expires_at))
            .map(|d| -d)
            .into()
    }),
    ("ht_certificate_age", |c| {
        c.days_since(c.certificate().and_then(IntelCertificate::issued_at))
            .into()
    }),
    ("ht_first_seen", |c| c.first_seen().map(|t| t.date().to_string()).into()),
    ("ht_last_seen", |c| c.last_seen().map(|t| t.date().to_string()).into()),
    ("ht_total_updates", |c| c.snapshots.as_ref().map(Vec::len).into()),
    ("ht_has_updates", |c| {
        c.snapshots.as_ref().map(|s| !s.is_empty()).into()
    }),
    ("ht_url_age", |c| c.days_since(c.first_seen()).into()),
    ("ht_days_since_last_update", |c| c.days_since(c.last_seen()).into()),
    ("ht_update_frequency", |c| {
        match (c.days_since(c.first_seen()), c.snapshots().len()) {
            (Some(age), total) if total > 0 => FeatureValue::Float(age as f64 / total as f64),
            _ => FeatureValue::Null,
        }
    }),
    ("ht_num_live_snapshots", |c| c.num_live().into()),
    ("ht_live_snapshot_ratio", |c| match c.num_live() {
        Some(live) if !c.snapshots().is_empty() => {
            FeatureValue::Float(live as f64 / c.snapshots().len() as f64)
        }
        _ => FeatureValue::Null,
    }),
];

/// Picks the address reported for a host, IPv4 first
fn pick_address(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let addrs: Vec<IpAddr> = addrs.into_iter().collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

/// Host feature set
pub struct HostFeatures {
    intel: Option<Arc<dyn IntelSource>>,
    archive: Option<Arc<dyn ArchiveSource>>,
    dns_timeout: Duration,
    today: Option<NaiveDate>,
}

impl HostFeatures {
    pub fn new(
        config: &FeaturesConfig,
        intel: Option<Arc<dyn IntelSource>>,
        archive: Option<Arc<dyn ArchiveSource>>,
    ) -> Self {
        Self {
            intel,
            archive,
            dns_timeout: Duration::from_secs(config.dns_timeout_secs),
            today: None,
        }
    }

    /// Pins the date used for ages and day counts
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    async fn resolve_ip(&self, host: &str) -> String {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return String::new();
        }

        let lookup = tokio::net::lookup_host((host, 0));
        match tokio::time::timeout(self.dns_timeout, lookup).await {
            Ok(Ok(addrs)) => pick_address(addrs.map(|a| a.ip()))
                .map(|ip| ip.to_string())
                .unwrap_or_default(),
            Ok(Err(e)) => {
                tracing::debug!("DNS lookup failed for {}: {}", host, e);
                String::new()
            }
            Err(_) => {
                tracing::debug!("DNS lookup timed out for {}", host);
                String::new()
            }
        }
    }

    async fn lookup_intel(&self, ip: &str) -> Option<HostIntel> {
        let source = self.intel.as_ref()?;
        if ip.is_empty() {
            return None;
        }

        match source.lookup(ip).await {
            Ok(intel) => Some(intel),
            Err(e) => {
                tracing::warn!("Intel lookup for {} gave up: {}", ip, e);
                None
            }
        }
    }

    async fn lookup_snapshots(&self, url: &str) -> Option<Vec<Snapshot>> {
        let source = self.archive.as_ref()?;
        let url = url.split('?').next().unwrap_or_default();
        if url.is_empty() {
            return None;
        }

        match source.snapshots(url).await {
            Ok(snapshots) => Some(snapshots),
            Err(e) => {
                tracing::warn!("Archive lookup for {} failed: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl FeatureSet for HostFeatures {
    fn family(&self) -> FeatureFamily {
        FeatureFamily::Host
    }

    fn names(&self) -> Vec<&'static str> {
        manifest_names(HOST_FEATURES)
    }

    async fn extract(&self, resolved: &ResolvedUrl) -> Result<FeatureRecord, FeatureError> {
        let ip = self.resolve_ip(&resolved.components().host).await;
        let (intel, snapshots) = tokio::join!(
            self.lookup_intel(&ip),
            self.lookup_snapshots(resolved.resolved_url())
        );

        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let ctx = HostContext::new(ip, intel, snapshots, today);
        Ok(evaluate(FeatureFamily::Host, HOST_FEATURES, &ctx))
    }
}
