//! Loopback tests for hijacking over TLS

use std::net::SocketAddr;
use std::sync::Arc;

use pi_runtime::{Connection, ConnectionConfig, Credentials, Error};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

fn config(host: String, insecure: bool) -> ConnectionConfig {
	ConnectionConfig::new(
		host,
		"test-region",
		Credentials {
			access_key: "AKTEST".into(),
			secret_key: "sktest".into(),
		},
	)
	.insecure_skip_tls_verify(insecure)
}

/// Acceptor presenting a freshly generated self-signed certificate.
fn self_signed_acceptor() -> TlsAcceptor {
	let certified = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string(), "localhost".to_string()]).unwrap();
	let cert = CertificateDer::from(certified.cert.der().to_vec());
	let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

	let provider = Arc::new(rustls::crypto::ring::default_provider());
	let server = rustls::ServerConfig::builder_with_provider(provider)
		.with_safe_default_protocol_versions()
		.unwrap()
		.with_no_client_auth()
		.with_single_cert(vec![cert], key)
		.unwrap();
	TlsAcceptor::from(Arc::new(server))
}

async fn read_head(stream: &mut (impl AsyncRead + Unpin)) -> String {
	let mut buf = Vec::new();
	let mut chunk = [0u8; 1024];
	while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
		let n = stream.read(&mut chunk).await.unwrap();
		assert!(n > 0, "client closed before sending a full head");
		buf.extend_from_slice(&chunk[..n]);
	}
	String::from_utf8_lossy(&buf).to_string()
}

/// Upgrades one TLS connection, then answers four input bytes with `pong`.
async fn serve_once() -> (SocketAddr, JoinHandle<Option<(String, Vec<u8>)>>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let acceptor = self_signed_acceptor();

	let server = tokio::spawn(async move {
		let (tcp, _) = listener.accept().await.unwrap();
		let mut stream = acceptor.accept(tcp).await.ok()?;
		let head = read_head(&mut stream).await;
		stream.write_all(b"HTTP/1.1 101 UPGRADED\r\n\r\nhello ").await.unwrap();

		let mut input = [0u8; 4];
		stream.read_exact(&mut input).await.unwrap();
		stream.write_all(b"pong").await.unwrap();
		stream.shutdown().await.unwrap();
		Some((head, input.to_vec()))
	});
	(addr, server)
}

#[tokio::test]
async fn insecure_mode_hijacks_over_self_signed_tls() {
	let (addr, server) = serve_once().await;

	let conn = Connection::new(config(format!("tcp://{addr}"), true)).unwrap();
	let (mut reader, mut writer) = conn
		.hijack("POST", "/api/v1/exec/exec-1/start", None)
		.await
		.unwrap()
		.into_split();

	writer.write_all(b"ping").await.unwrap();
	let mut out = Vec::new();
	reader.read_to_end(&mut out).await.unwrap();
	assert_eq!(out, b"hello pong");

	let (head, input) = server.await.unwrap().expect("handshake completed");
	assert!(head.starts_with("POST /api/v1/exec/exec-1/start HTTP/1.1\r\n"));
	assert!(head.contains(&format!("Host: {addr}\r\n")));
	assert_eq!(input, b"ping");
}

#[tokio::test]
async fn verifying_mode_rejects_self_signed_certificate() {
	let (addr, server) = serve_once().await;

	let conn = Connection::new(config(format!("https://{addr}"), false)).unwrap();
	let err = conn.hijack("POST", "/api/v1/exec/exec-1/start", None).await.unwrap_err();
	assert!(matches!(err, Error::Transport { .. }), "expected transport error, got {err}");
	assert!(err.to_string().contains("TLS handshake"), "{err}");

	assert!(server.await.unwrap().is_none());
}
