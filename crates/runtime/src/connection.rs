//! Signed requests and connection hijacking against the control plane.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{Level, debug, trace};

use crate::curl;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::hijack::{HijackedConnection, RawStream};
use crate::signer::{Credentials, Signer, SigningRequest};
use crate::tls;

/// Dial timeout for both ordinary and hijacked requests.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

const JSON_CONTENT_TYPE: &str = "application/json";
const MAX_HEAD_LEN: usize = 64 * 1024;
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(2);

/// `pi/<version> (<os>)`
pub fn default_user_agent() -> String {
	format!("pi/{} ({})", env!("CARGO_PKG_VERSION"), std::env::consts::OS)
}

/// Everything needed to reach and authenticate against one region.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
	/// `scheme://host:port`; `*` on the default domain is replaced by `region`.
	pub host: String,
	pub region: String,
	pub credentials: Credentials,
	pub insecure_skip_tls_verify: bool,
	pub user_agent: String,
	pub dial_timeout: Duration,
}

impl ConnectionConfig {
	pub fn new(host: impl Into<String>, region: impl Into<String>, credentials: Credentials) -> Self {
		Self {
			host: host.into(),
			region: region.into(),
			credentials,
			insecure_skip_tls_verify: false,
			user_agent: default_user_agent(),
			dial_timeout: DEFAULT_DIAL_TIMEOUT,
		}
	}

	pub fn insecure_skip_tls_verify(mut self, insecure: bool) -> Self {
		self.insecure_skip_tls_verify = insecure;
		self
	}
}

/// Status and body of an ordinary request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
	pub status: u16,
	pub body: Bytes,
}

impl RawResponse {
	/// Body as lossy UTF-8, trimmed.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).trim().to_string()
	}

	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		Ok(serde_json::from_slice(&self.body)?)
	}

	/// Fails with [`Error::UnexpectedStatus`] unless the status is `expected`.
	pub fn expect(self, method: &str, path: &str, expected: u16) -> Result<Self> {
		if self.status == expected {
			Ok(self)
		} else {
			Err(Error::UnexpectedStatus {
				method: method.to_string(),
				path: path.to_string(),
				status: self.status,
				body: self.text(),
			})
		}
	}
}

/// A signed connection to one control-plane endpoint.
#[derive(Debug, Clone)]
pub struct Connection {
	endpoint: Endpoint,
	signer: Signer,
	client: reqwest::Client,
	insecure: bool,
	user_agent: String,
	dial_timeout: Duration,
}

impl Connection {
	pub fn new(config: ConnectionConfig) -> Result<Self> {
		let endpoint = Endpoint::parse(&config.host, &config.region)?;
		let client = reqwest::Client::builder()
			.connect_timeout(config.dial_timeout)
			.no_proxy()
			.danger_accept_invalid_certs(config.insecure_skip_tls_verify)
			.user_agent(config.user_agent.clone())
			.build()
			.map_err(|e| Error::transport_with("failed to build HTTP client", e))?;

		debug!(
			target = "pi.transport",
			endpoint = %endpoint.base_url(),
			region = %config.region,
			insecure = config.insecure_skip_tls_verify,
			"connection configured"
		);

		Ok(Self {
			endpoint,
			signer: Signer::new(config.credentials, config.region),
			client,
			insecure: config.insecure_skip_tls_verify,
			user_agent: config.user_agent,
			dial_timeout: config.dial_timeout,
		})
	}

	pub fn endpoint(&self) -> &Endpoint {
		&self.endpoint
	}

	/// Sends a signed request and returns whatever status the remote answered.
	pub async fn request(&self, method: &str, path: &str, body: Option<Vec<u8>>) -> Result<RawResponse> {
		let body = body.unwrap_or_default();
		let headers = self.signed_headers(method, path, &body);
		let url = format!("{}{}", self.endpoint.base_url(), path);
		self.dump(method, &url, &headers, &body);

		let method_value = reqwest::Method::from_bytes(method.as_bytes())
			.map_err(|e| Error::transport_with(format!("invalid method '{method}'"), e))?;
		let mut request = self.client.request(method_value, &url);
		for (name, value) in &headers {
			request = request.header(name.as_str(), value.as_str());
		}
		if !body.is_empty() {
			request = request.body(body);
		}

		let response = request.send().await?;
		let status = response.status().as_u16();
		let body = response.bytes().await?;
		debug!(target = "pi.transport", %method, %path, status, len = body.len(), "response");
		Ok(RawResponse { status, body })
	}

	/// Serializes `body` as JSON and sends it with [`request`](Self::request).
	pub async fn request_json<T: Serialize>(&self, method: &str, path: &str, body: &T) -> Result<RawResponse> {
		let body = serde_json::to_vec(body)?;
		self.request(method, path, Some(body)).await
	}

	/// Sends a signed request on a dedicated socket and takes it over once the
	/// response head arrives.
	///
	/// The remote must answer `200` or `101`; anything else fails with
	/// [`Error::UnexpectedStatus`] carrying the readable part of the body.
	pub async fn hijack(&self, method: &str, path: &str, body: Option<Vec<u8>>) -> Result<HijackedConnection> {
		let body = body.unwrap_or_default();
		let headers = self.signed_headers(method, path, &body);
		let url = format!("{}{}", self.endpoint.base_url(), path);
		self.dump(method, &url, &headers, &body);

		let mut stream = self.dial().await?;

		let mut head = format!("{} {} HTTP/1.1\r\n", method.to_ascii_uppercase(), path);
		head.push_str(&format!("User-Agent: {}\r\n", self.user_agent));
		for (name, value) in &headers {
			head.push_str(&format!("{name}: {value}\r\n"));
		}
		head.push_str(&format!("Content-Length: {}\r\n", body.len()));
		head.push_str("Upgrade: \r\n\r\n");

		stream.write_all(head.as_bytes()).await?;
		stream.write_all(&body).await?;
		stream.flush().await?;

		let (status, header_lines, leftover) = read_response_head(&mut stream).await?;
		debug!(target = "pi.transport", %method, %path, status, buffered = leftover.len(), "hijack response");

		if status != 200 && status != 101 {
			let body = read_error_body(&mut stream, &header_lines, leftover).await;
			return Err(Error::UnexpectedStatus {
				method: method.to_string(),
				path: path.to_string(),
				status,
				body: String::from_utf8_lossy(&body).trim().to_string(),
			});
		}

		Ok(HijackedConnection::new(stream, leftover.freeze()))
	}

	async fn dial(&self) -> Result<Box<dyn RawStream>> {
		let addr = (self.endpoint.host.as_str(), self.endpoint.port);
		let tcp = tokio::time::timeout(self.dial_timeout, TcpStream::connect(addr))
			.await
			.map_err(|_| Error::transport(format!("dial {} timed out after {:?}", self.endpoint.authority(), self.dial_timeout)))?
			.map_err(|e| Error::transport_with(format!("dial {} failed", self.endpoint.authority()), e))?;
		let _ = tcp.set_nodelay(true);

		if !self.endpoint.is_tls() {
			return Ok(Box::new(tcp));
		}

		let connector = tls::connector(self.insecure)?;
		let server_name = tls::server_name(&self.endpoint.host)?;
		let stream = tokio::time::timeout(self.dial_timeout, connector.connect(server_name, tcp))
			.await
			.map_err(|_| Error::transport(format!("TLS handshake with {} timed out", self.endpoint.authority())))?
			.map_err(|e| Error::transport_with(format!("TLS handshake with {} failed", self.endpoint.authority()), e))?;
		Ok(Box::new(stream))
	}

	fn signed_headers(&self, method: &str, path: &str, body: &[u8]) -> Vec<(String, String)> {
		let host = self.endpoint.authority();
		let content_type = (!body.is_empty()).then_some(JSON_CONTENT_TYPE);
		let signed = self.signer.sign(&SigningRequest {
			method,
			path,
			host: &host,
			content_type,
			body,
		});

		let mut headers = vec![("Host".to_string(), host.clone())];
		if let Some(content_type) = content_type {
			headers.push(("Content-Type".to_string(), content_type.to_string()));
		}
		headers.extend(signed.into_iter().map(|(name, value)| (name.to_string(), value)));
		headers
	}

	fn dump(&self, method: &str, url: &str, headers: &[(String, String)], body: &[u8]) {
		if tracing::enabled!(Level::TRACE) {
			trace!(target = "pi.transport", "[REQUEST]:\n{}", curl::render(method, url, headers, body));
		}
	}
}

/// Reads up to the blank line ending the response head. Returns the status,
/// the header lines and any bytes read past the head.
async fn read_response_head<S>(stream: &mut S) -> Result<(u16, Vec<(String, String)>, BytesMut)>
where
	S: tokio::io::AsyncRead + Unpin + ?Sized,
{
	let mut buf = BytesMut::with_capacity(1024);
	let head_end = loop {
		if let Some(pos) = find_head_end(&buf) {
			break pos;
		}
		if buf.len() > MAX_HEAD_LEN {
			return Err(Error::MalformedResponse("response head too large".into()));
		}
		let n = stream.read_buf(&mut buf).await?;
		if n == 0 {
			return Err(Error::MalformedResponse("connection closed before response head".into()));
		}
	};

	let head = buf.split_to(head_end + 4);
	let text = String::from_utf8_lossy(&head);
	let mut lines = text.split("\r\n");
	let status_line = lines.next().unwrap_or_default();
	let status = parse_status_line(status_line)?;

	let headers = lines
		.filter(|line| !line.is_empty())
		.filter_map(|line| line.split_once(':'))
		.map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
		.collect();

	Ok((status, headers, buf))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
	buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_status_line(line: &str) -> Result<u16> {
	let mut parts = line.splitn(3, ' ');
	let version = parts.next().unwrap_or_default();
	if !version.starts_with("HTTP/") {
		return Err(Error::MalformedResponse(format!("bad status line '{line}'")));
	}
	parts
		.next()
		.and_then(|code| code.parse::<u16>().ok())
		.ok_or_else(|| Error::MalformedResponse(format!("bad status line '{line}'")))
}

/// Best-effort read of an error body: up to `Content-Length` when given,
/// otherwise until EOF, bounded by a short timeout either way.
async fn read_error_body<S>(stream: &mut S, headers: &[(String, String)], mut body: BytesMut) -> BytesMut
where
	S: tokio::io::AsyncRead + Unpin + ?Sized,
{
	let content_length = headers
		.iter()
		.find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
		.and_then(|(_, value)| value.parse::<usize>().ok());

	let read = async {
		loop {
			if content_length.is_some_and(|len| body.len() >= len) {
				break;
			}
			match stream.read_buf(&mut body).await {
				Ok(0) | Err(_) => break,
				Ok(_) => {}
			}
		}
	};
	let _ = tokio::time::timeout(ERROR_BODY_TIMEOUT, read).await;
	if let Some(len) = content_length {
		body.truncate(len);
	}
	body
}
