//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Build the acceptor for the TLS-terminating listener from PEM files
//! - Build the connector used to dial HTTPS backends, with certificate
//!   verification switchable by configuration

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use thiserror::Error;
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Errors while loading TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read PEM data from {path}: {source}")]
    Pem {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No certificate found in {0}")]
    NoCertificate(String),

    #[error("No private key found in {0}")]
    NoPrivateKey(String),

    #[error("Invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// Load a certificate chain and private key into a TLS acceptor.
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    let cert_display = cert_path.display().to_string();
    let key_display = key_path.display().to_string();

    let mut cert_file = BufReader::new(File::open(cert_path).map_err(|source| TlsError::Open {
        path: cert_display.clone(),
        source,
    })?);
    let certs = rustls_pemfile::certs(&mut cert_file)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            path: cert_display.clone(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(cert_display));
    }

    let mut key_file = BufReader::new(File::open(key_path).map_err(|source| TlsError::Open {
        path: key_display.clone(),
        source,
    })?);
    let key = rustls_pemfile::private_key(&mut key_file)
        .map_err(|source| TlsError::Pem {
            path: key_display.clone(),
            source,
        })?
        .ok_or(TlsError::NoPrivateKey(key_display))?;

    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build the connector for HTTPS backends.
///
/// With `verify_certificates` off, any backend certificate is accepted but
/// handshake signatures are still checked.
pub fn backend_connector(verify_certificates: bool) -> Result<TlsConnector, TlsError> {
    let builder = ClientConfig::builder_with_provider(provider()).with_safe_default_protocol_versions()?;
    let config = if verify_certificates {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            tracing::warn!(error = %error, "Failed to load a native root certificate");
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        tracing::debug!(added, ignored, "Loaded native root certificates");

        builder
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        tracing::warn!("Backend certificate verification disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate::new()))
            .with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Process-wide crypto provider.
fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// SNI / verification name for a backend host.
pub fn server_name(host: &str) -> Result<ServerName<'static>, std::io::Error> {
    ServerName::try_from(host.to_string())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
}

/// Accepts every server certificate.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyCertificate {
    fn new() -> Self {
        Self {
            provider: provider(),
        }
    }
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
