//! rustls client setup for the hijacked socket.

use std::sync::Arc;

use rustls::DigitallySignedStruct;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};

/// Builds a connector trusting the bundled web PKI roots, or anything at all
/// when `insecure` is set.
pub(crate) fn connector(insecure: bool) -> Result<TlsConnector> {
	let provider = Arc::new(rustls::crypto::ring::default_provider());
	let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
		.with_safe_default_protocol_versions()
		.map_err(|e| Error::transport_with("failed to configure TLS", e))?;

	let config = if insecure {
		builder
			.dangerous()
			.with_custom_certificate_verifier(Arc::new(AcceptAnyCert {
				algorithms: provider.signature_verification_algorithms,
			}))
			.with_no_client_auth()
	} else {
		let mut roots = rustls::RootCertStore::empty();
		roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
		builder.with_root_certificates(roots).with_no_client_auth()
	};

	Ok(TlsConnector::from(Arc::new(config)))
}

pub(crate) fn server_name(host: &str) -> Result<ServerName<'static>> {
	ServerName::try_from(host.to_string()).map_err(|e| Error::InvalidHost {
		host: host.to_string(),
		reason: e.to_string(),
	})
}

/// Verifier used for `insecure-skip-tls-verify`: certificates are accepted
/// unchecked, handshake signatures are still verified.
#[derive(Debug)]
struct AcceptAnyCert {
	algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyCert {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp_response: &[u8],
		_now: UnixTime,
	) -> std::result::Result<ServerCertVerified, rustls::Error> {
		Ok(ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
		rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
	}

	fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
		self.algorithms.supported_schemes()
	}
}
