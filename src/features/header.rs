//! HTTP header and TLS certificate features (`hd_`)
//!
//! Header values come from the resolver probe. Certificate facts come from a
//! separate TLS handshake on port 443, made only when the resolved scheme is
//! https. Every value is independently null when its input is missing.

use crate::config::FeaturesConfig;
use crate::features::certificate::{CertificateInfo, CertificateSource, TlsCertificateProbe};
use crate::features::{
    evaluate, manifest_names, shannon_entropy, FeatureError, FeatureFamily, FeatureRecord,
    FeatureSet, Manifest,
};
use crate::resolver::{ProbeResponse, ResolvedUrl};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;

const TLS_PORT: u16 = 443;

/// Reads an integer parameter out of a structured header value
///
/// Parameters are separated by commas or whitespace; the first one named
/// `key` (case-insensitive) supplies the value.
///
/// # Examples
///
/// ```
/// use urlscope::features::header::header_param;
///
/// assert_eq!(header_param(Some("timeout=5, max=1000"), "timeout"), Some(5));
/// assert_eq!(header_param(Some("timeout=5,max=100"), "timeout"), Some(5));
/// assert_eq!(header_param(Some("public, max-age=3600"), "max-age"), Some(3600));
/// assert_eq!(header_param(Some("no-cache"), "max-age"), None);
/// assert_eq!(header_param(None, "max"), None);
/// ```
pub fn header_param(value: Option<&str>, key: &str) -> Option<i64> {
    let raw = value?
        .split(|c: char| c == ',' || c.is_whitespace())
        .find_map(|param| {
            let (name, raw) = param.split_once('=')?;
            name.trim().eq_ignore_ascii_case(key).then_some(raw)
        })?;
    let raw = raw.trim().trim_matches('"');
    match raw.parse() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::debug!("Unparsable {} value '{}': {}", key, raw, e);
            None
        }
    }
}

/// Converts an HTTP date into an ISO-8601 calendar date
pub fn http_date_to_iso(value: Option<&str>) -> Option<String> {
    DateTime::parse_from_rfc2822(value?.trim())
        .ok()
        .map(|dt| dt.date_naive().to_string())
}

/// Everything the header extractors read
#[derive(Debug, Clone)]
pub struct HeaderContext {
    probe: Option<ProbeResponse>,
    num_redirects: usize,
    certificate: Option<CertificateInfo>,
    today: NaiveDate,
}

impl HeaderContext {
    pub fn new(
        resolved: &ResolvedUrl,
        certificate: Option<CertificateInfo>,
        today: NaiveDate,
    ) -> Self {
        Self {
            probe: resolved.probe().cloned(),
            num_redirects: resolved.redirect_history().len(),
            certificate,
            today,
        }
    }

    /// A header value, only when the response carried any headers
    fn header(&self, name: &str) -> Option<&str> {
        self.probe
            .as_ref()
            .filter(|p| !p.headers.is_empty())
            .and_then(|p| p.header(name))
    }

    fn headers(&self) -> Option<&[(String, String)]> {
        self.probe
            .as_ref()
            .map(|p| p.headers.as_slice())
            .filter(|h| !h.is_empty())
    }

    fn cert_days(&self, date: impl Fn(&CertificateInfo) -> NaiveDate) -> Option<i64> {
        self.certificate
            .as_ref()
            .map(|cert| (date(cert) - self.today).num_days())
    }

    fn days_left(&self) -> Option<i64> {
        self.cert_days(|cert| cert.not_after)
    }
}

const HEADER_FEATURES: Manifest<HeaderContext> = &[
    ("hd_status_code", |c| c.probe.as_ref().map(|p| p.status).into()),
    ("hd_response_time", |c| {
        c.probe.as_ref().map(|p| p.elapsed.as_secs_f64()).into()
    }),
    ("hd_encoding", |c| {
        c.probe.as_ref().and_then(|p| p.encoding.as_deref()).into()
    }),
    ("hd_content_encoding", |c| c.header("content-encoding").into()),
    ("hd_last_modified", |c| http_date_to_iso(c.header("last-modified")).into()),
    ("hd_num_header_keys", |c| c.probe.as_ref().map(|p| p.headers.len()).into()),
    ("hd_connection", |c| c.header("connection").into()),
    ("hd_server", |c| c.header("server").into()),
    ("hd_content_type", |c| c.header("content-type").into()),
    ("hd_cache_control", |c| c.header("cache-control").into()),
    ("hd_keep_alive", |c| c.header("keep-alive").into()),
    ("hd_keep_alive_timeout", |c| header_param(c.header("keep-alive"), "timeout").into()),
    ("hd_keep_alive_max", |c| header_param(c.header("keep-alive"), "max").into()),
    ("hd_cache_max_age", |c| header_param(c.header("cache-control"), "max-age").into()),
    ("hd_content_length", |c| c.header("content-length").into()),
    ("hd_xss_protection", |c| c.header("x-xss-protection").into()),
    ("hd_x_content_type_options", |c| c.header("x-content-type-options").into()),
    ("hd_x_last_modified", |c| http_date_to_iso(c.header("last-modified")).into()),
    ("hd_expires", |c| http_date_to_iso(c.header("expires")).into()),
    ("hd_num_header_params", |c| c.headers().map(<[_]>::len).into()),
    ("hd_header_entropy", |c| {
        c.headers()
            .map(|headers| {
                let joined: String = headers.iter().map(|(_, v)| v.as_str()).collect();
                shannon_entropy(&joined)
            })
            .into()
    }),
    ("hd_num_redirects", |c| {
        (c.probe.is_some() && c.num_redirects > 0)
            .then(|| c.num_redirects - 1)
            .into()
    }),
    ("hd_cookie_entropy", |c| {
        c.probe
            .as_ref()
            .map(|p| {
                let joined: String = p.cookies.iter().map(|(_, v)| v.as_str()).collect();
                shannon_entropy(&joined)
            })
            .into()
    }),
    ("hd_num_cookie_params", |c| {
        c.probe
            .as_ref()
            .map(|p| p.cookies.len())
            .filter(|n| *n > 0)
            .into()
    }),
    ("hd_certificate_issued", |c| {
        c.certificate.as_ref().map(|cert| cert.not_before.to_string()).into()
    }),
    ("hd_certificate_expires", |c| {
        c.certificate.as_ref().map(|cert| cert.not_after.to_string()).into()
    }),
    ("hd_certificate_duration", |c| {
        c.certificate
            .as_ref()
            .map(|cert| (cert.not_after - cert.not_before).num_days())
            .into()
    }),
    ("hd_certificate_age", |c| c.cert_days(|cert| cert.not_before).map(|d| -d).into()),
    ("hd_certificate_days_left", |c| c.days_left().into()),
    ("hd_certificate_expired", |c| c.days_left().map(|d| d < 0).into()),
    ("hd_certificate_entropy", |c| {
        c.certificate.as_ref().map(|cert| shannon_entropy(&cert.pem)).into()
    }),
    ("hd_certificate_num_extensions", |c| {
        c.certificate
            .as_ref()
            .map_or(0, |cert| cert.num_extensions)
            .into()
    }),
];

/// Header and certificate feature set
pub struct HeaderFeatures {
    certificates: Option<Arc<dyn CertificateSource>>,
    today: Option<NaiveDate>,
}

impl HeaderFeatures {
    /// Creates the feature set; without a certificate source every
    /// certificate feature is null
    pub fn new(certificates: Option<Arc<dyn CertificateSource>>) -> Self {
        Self {
            certificates,
            today: None,
        }
    }

    pub fn from_config(config: &FeaturesConfig) -> Self {
        let timeout = Duration::from_secs(config.certificate_timeout_secs);
        Self::new(Some(Arc::new(TlsCertificateProbe::new(timeout))))
    }

    /// Pins the date used for certificate ages
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    async fn certificate(&self, resolved: &ResolvedUrl) -> Option<CertificateInfo> {
        let source = self.certificates.as_ref()?;
        let parts = resolved.components();
        if parts.host.is_empty() || !parts.scheme.to_lowercase().contains("https") {
            return None;
        }

        match source.fetch(&parts.host, TLS_PORT).await {
            Ok(cert) => Some(cert),
            Err(e) => {
                tracing::debug!("Certificate probe failed for {}: {}", parts.host, e);
                None
            }
        }
    }
}

#[async_trait]
impl FeatureSet for HeaderFeatures {
    fn family(&self) -> FeatureFamily {
        FeatureFamily::Header
    }

    fn names(&self) -> Vec<&'static str> {
        manifest_names(HEADER_FEATURES)
    }

    async fn extract(&self, resolved: &ResolvedUrl) -> Result<FeatureRecord, FeatureError> {
        let certificate = self.certificate(resolved).await;
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let ctx = HeaderContext::new(resolved, certificate, today);
        Ok(evaluate(FeatureFamily::Header, HEADER_FEATURES, &ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::certificate::CertificateError;
    use crate::features::FeatureValue;
    use crate::resolver::{Probe, RedirectHop};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedCertificate {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CertificateSource for FixedCertificate {
        async fn fetch(&self, _host: &str, port: u16) -> Result<CertificateInfo, CertificateError> {
            assert_eq!(port, 443);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CertificateInfo {
                pem: "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n".into(),
                not_before: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                not_after: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
                num_extensions: 9,
            })
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn resolved(url: &str, headers: Vec<(&str, &str)>, redirects: usize) -> ResolvedUrl {
        let probe = Probe {
            response: ProbeResponse {
                final_url: url.to_string(),
                status: 200,
                headers: headers
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                cookies: vec![("sid".to_string(), "abcd".to_string())],
                encoding: Some("utf-8".to_string()),
                elapsed: Duration::from_millis(250),
                body: String::new(),
            },
            history: (0..redirects)
                .map(|i| RedirectHop {
                    url: format!("{}?hop={}", url, i),
                    status: 301,
                    location: Some(url.to_string()),
                })
                .collect(),
        };
        ResolvedUrl::new(url, None, Some(probe))
    }

    #[test]
    fn test_header_param_edge_cases() {
        assert_eq!(header_param(Some("timeout=abc"), "timeout"), None);
        assert_eq!(header_param(Some(""), "timeout"), None);
        assert_eq!(header_param(Some("max=7"), "max"), Some(7));
    }

    #[test]
    fn test_header_param_without_spaces() {
        assert_eq!(header_param(Some("timeout=5,max=100"), "timeout"), Some(5));
        assert_eq!(header_param(Some("timeout=5,max=100"), "max"), Some(100));
        assert_eq!(header_param(Some("max-age=60,max=3"), "max"), Some(3));
        assert_eq!(header_param(Some("Timeout=7"), "timeout"), Some(7));
        assert_eq!(header_param(Some("max-age=\"90\""), "max-age"), Some(90));
    }

    #[test]
    fn test_http_date() {
        assert_eq!(
            http_date_to_iso(Some("Wed, 21 Oct 2015 07:28:00 GMT")),
            Some("2015-10-21".to_string())
        );
        assert_eq!(http_date_to_iso(Some("0")), None);
        assert_eq!(http_date_to_iso(None), None);
    }

    #[tokio::test]
    async fn test_header_values() {
        let features = HeaderFeatures::new(None).with_today(today());
        let url = resolved(
            "http://example.com/",
            vec![
                ("server", "nginx"),
                ("keep-alive", "timeout=5, max=100"),
                ("cache-control", "public, max-age=600"),
                ("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
                ("content-length", "512"),
            ],
            2,
        );

        let record = features.extract(&url).await.unwrap();
        assert_eq!(record.get("hd_status_code"), Some(&FeatureValue::Int(200)));
        assert_eq!(record.get("hd_response_time"), Some(&FeatureValue::Float(0.25)));
        assert_eq!(record.get("hd_server"), Some(&FeatureValue::Text("nginx".into())));
        assert_eq!(record.get("hd_keep_alive_timeout"), Some(&FeatureValue::Int(5)));
        assert_eq!(record.get("hd_keep_alive_max"), Some(&FeatureValue::Int(100)));
        assert_eq!(record.get("hd_cache_max_age"), Some(&FeatureValue::Int(600)));
        assert_eq!(
            record.get("hd_last_modified"),
            Some(&FeatureValue::Text("2015-10-21".into()))
        );
        assert_eq!(record.get("hd_content_length"), Some(&FeatureValue::Text("512".into())));
        assert_eq!(record.get("hd_num_header_keys"), Some(&FeatureValue::Int(5)));
        assert_eq!(record.get("hd_num_redirects"), Some(&FeatureValue::Int(1)));
        assert_eq!(record.get("hd_num_cookie_params"), Some(&FeatureValue::Int(1)));
        assert_eq!(record.get("hd_connection"), Some(&FeatureValue::Null));
        // Plain http: no certificate probe
        assert_eq!(record.get("hd_certificate_issued"), Some(&FeatureValue::Null));
        assert_eq!(
            record.get("hd_certificate_num_extensions"),
            Some(&FeatureValue::Int(0))
        );
    }

    #[tokio::test]
    async fn test_certificate_features() {
        let source = Arc::new(FixedCertificate {
            calls: AtomicUsize::new(0),
        });
        let features = HeaderFeatures::new(Some(source.clone())).with_today(today());
        let record = features
            .extract(&resolved("https://example.com/", vec![], 0))
            .await
            .unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            record.get("hd_certificate_issued"),
            Some(&FeatureValue::Text("2024-01-01".into()))
        );
        assert_eq!(record.get("hd_certificate_duration"), Some(&FeatureValue::Int(365)));
        assert_eq!(record.get("hd_certificate_age"), Some(&FeatureValue::Int(182)));
        assert_eq!(record.get("hd_certificate_days_left"), Some(&FeatureValue::Int(183)));
        assert_eq!(record.get("hd_certificate_expired"), Some(&FeatureValue::Bool(false)));
        assert_eq!(record.get("hd_certificate_num_extensions"), Some(&FeatureValue::Int(9)));
        assert!(record.get("hd_certificate_entropy").and_then(FeatureValue::as_f64).unwrap() > 0.0);
        // No headers at all
        assert_eq!(record.get("hd_num_header_params"), Some(&FeatureValue::Null));
        assert_eq!(record.get("hd_header_entropy"), Some(&FeatureValue::Null));
        assert_eq!(record.get("hd_num_redirects"), Some(&FeatureValue::Null));
    }

    #[tokio::test]
    async fn test_no_probe_is_all_null() {
        let features = HeaderFeatures::new(None).with_today(today());
        let record = features
            .extract(&ResolvedUrl::offline("example.com", None))
            .await
            .unwrap();

        for (name, value) in record.values() {
            if *name == "hd_certificate_num_extensions" {
                assert_eq!(value, &FeatureValue::Int(0));
            } else {
                assert!(value.is_null(), "{} should be null", name);
            }
        }
    }
}
