//! Direct TLS certificate probe
//!
//! Opens a TLS connection to the host and reads the leaf certificate the
//! server presents. The chain is not verified: expired or self-signed
//! certificates are exactly what the header features want to describe.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::{Certificate, ClientConfig, ServerName};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid server name '{0}'")]
    InvalidHost(String),

    #[error("Server presented no certificate")]
    NoCertificate,

    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    #[error("Certificate probe timed out after {0:?}")]
    Timeout(Duration),
}

/// Facts read from a server's leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// PEM encoding of the DER certificate
    pub pem: String,
    pub not_before: NaiveDate,
    pub not_after: NaiveDate,
    pub num_extensions: usize,
}

impl CertificateInfo {
    /// Parses a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| CertificateError::Parse(e.to_string()))?;

        let validity = cert.validity();
        let not_before = timestamp_to_date(validity.not_before.timestamp())?;
        let not_after = timestamp_to_date(validity.not_after.timestamp())?;

        Ok(Self {
            pem: der_to_pem(der),
            not_before,
            not_after,
            num_extensions: cert.extensions().len(),
        })
    }
}

fn timestamp_to_date(timestamp: i64) -> Result<NaiveDate, CertificateError> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| CertificateError::Parse(format!("timestamp {} out of range", timestamp)))
}

/// Encodes DER bytes as a PEM certificate block with 64-column lines
pub fn der_to_pem(der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// Seam for fetching a host's certificate
#[async_trait]
pub trait CertificateSource: Send + Sync {
    async fn fetch(&self, host: &str, port: u16) -> Result<CertificateInfo, CertificateError>;
}

/// Accepts whatever certificate the server presents
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// rustls-backed certificate probe
pub struct TlsCertificateProbe {
    connector: TlsConnector,
    timeout: Duration,
}

impl TlsCertificateProbe {
    pub fn new(timeout: Duration) -> Self {
        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth();

        Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        }
    }

    async fn handshake(&self, host: &str, port: u16) -> Result<CertificateInfo, CertificateError> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let server_name = ServerName::try_from(host)
            .map_err(|_| CertificateError::InvalidHost(host.to_string()))?;

        let tcp = TcpStream::connect((host, port)).await?;
        let tls = self.connector.connect(server_name, tcp).await?;

        let (_, session) = tls.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or(CertificateError::NoCertificate)?;

        CertificateInfo::from_der(&leaf.0)
    }
}

#[async_trait]
impl CertificateSource for TlsCertificateProbe {
    async fn fetch(&self, host: &str, port: u16) -> Result<CertificateInfo, CertificateError> {
        tokio::time::timeout(self.timeout, self.handshake(host, port))
            .await
            .map_err(|_| CertificateError::Timeout(self.timeout))?
    }
}
