//! Reachability probe
//!
//! Measures how long it takes to open a TCP connection to a proxy server
//! and, when the server speaks TLS, to finish the handshake. Certificates are
//! not verified, matching the `skip-cert-verify` / `insecure` flags the
//! generated documents carry. The whole attempt runs under one hard timeout.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::descriptor::{Protocol, ProxyDescriptor};

// ============================================================================
// Types
// ============================================================================

/// Where to probe
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
}

impl ProbeTarget {
    /// Probe target for a descriptor
    ///
    /// Hysteria2 and TUIC run over QUIC and cannot be reached by a TCP probe.
    pub fn from_descriptor(descriptor: &ProxyDescriptor) -> Option<Self> {
        if matches!(descriptor.protocol(), Protocol::Hy2 | Protocol::Tuic) {
            return None;
        }
        let tls = descriptor.tls();
        Some(Self {
            host: descriptor.server.clone(),
            port: descriptor.port,
            tls: tls.is_some(),
            sni: tls.map(|t| t.sni.clone()),
        })
    }
}

/// Probe result as returned over HTTP: `{latencyMs}` or `{error}`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum ProbeOutcome {
    Reachable {
        #[serde(rename = "latencyMs")]
        latency_ms: u64,
    },
    Failed {
        error: String,
    },
}

impl ProbeOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        ProbeOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }
}

#[async_trait]
pub trait Probe: Send + Sync {
    /// Never takes longer than the probe's timeout
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome;
}

// ============================================================================
// TCP / TLS Probe
// ============================================================================

pub struct TcpProbe {
    timeout: Duration,
    connector: TlsConnector,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Result<Self, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerify))
            .with_no_client_auth();

        Ok(Self {
            timeout,
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    async fn connect(&self, target: &ProbeTarget) -> io::Result<()> {
        let stream = TcpStream::connect((target.host.as_str(), target.port)).await?;
        trace!("TCP connected to {}:{}", target.host, target.port);

        if target.tls {
            let name = target
                .sni
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(&target.host);
            let server_name = ServerName::try_from(name.to_string())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            self.connector.connect(server_name, stream).await?;
            trace!("TLS handshake with {} complete", name);
        }
        Ok(())
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.connect(target)).await {
            Ok(Ok(())) => ProbeOutcome::Reachable {
                latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
            Ok(Err(e)) => ProbeOutcome::failed(e.to_string()),
            Err(_) => ProbeOutcome::failed(format!(
                "timed out after {} ms",
                self.timeout.as_millis()
            )),
        };
        debug!("Probe {}:{} -> {:?}", target.host, target.port, outcome);
        outcome
    }
}

/// Accepts any server certificate
#[derive(Debug)]
struct NoVerify;

impl ServerCertVerifier for NoVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
