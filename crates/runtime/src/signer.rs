//! HMAC-SHA256 request signing.
//!
//! Produces the `X-Hyper-Date`, `X-Hyper-Content-Sha256` and `Authorization`
//! headers expected by the API router. The scheme follows the familiar
//! "canonical request → string to sign → derived key" layout:
//!
//! ```text
//! canonical = METHOD \n PATH \n SORTED_QUERY \n CANONICAL_HEADERS \n SIGNED_HEADERS \n hex(sha256(body))
//! to_sign   = HYPER-HMAC-SHA256 \n DATE \n SCOPE \n hex(sha256(canonical))
//! key       = hmac(hmac(hmac(hmac("HYPER" + secret, day), region), "hyper"), "hyper_request")
//! ```

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HYPER-HMAC-SHA256";
pub const DATE_HEADER: &str = "X-Hyper-Date";
pub const CONTENT_HASH_HEADER: &str = "X-Hyper-Content-Sha256";
const SERVICE: &str = "hyper";
const TERMINATOR: &str = "hyper_request";
const KEY_PREFIX: &str = "HYPER";

/// Access/secret key pair for one region.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	pub access_key: String,
	pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credentials")
			.field("access_key", &self.access_key)
			.field("secret_key", &"<redacted>")
			.finish()
	}
}

/// Inputs of a single signature.
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
	pub method: &'a str,
	/// Path including an optional `?query`.
	pub path: &'a str,
	/// `Host` header value.
	pub host: &'a str,
	pub content_type: Option<&'a str>,
	pub body: &'a [u8],
}

/// Signs requests for one credential/region pair.
#[derive(Debug, Clone)]
pub struct Signer {
	credentials: Credentials,
	region: String,
}

impl Signer {
	pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
		Self {
			credentials,
			region: region.into(),
		}
	}

	/// Signs `request` at the current time.
	pub fn sign(&self, request: &SigningRequest<'_>) -> Vec<(&'static str, String)> {
		self.sign_at(request, Utc::now())
	}

	/// Signs `request` as of `now`; returns the headers to attach.
	pub fn sign_at(&self, request: &SigningRequest<'_>, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
		let stamp = now.format("%Y%m%dT%H%M%SZ").to_string();
		let day = now.format("%Y%m%d").to_string();
		let payload_hash = hex::encode(Sha256::digest(request.body));

		let mut headers: Vec<(&'static str, String)> = Vec::with_capacity(4);
		if let Some(content_type) = request.content_type {
			headers.push(("content-type", content_type.trim().to_string()));
		}
		headers.push(("host", request.host.trim().to_string()));
		headers.push(("x-hyper-content-sha256", payload_hash.clone()));
		headers.push(("x-hyper-date", stamp.clone()));

		let signed_headers = headers.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(";");
		let canonical_headers: String = headers.iter().map(|(name, value)| format!("{name}:{value}\n")).collect();

		let (path, query) = match request.path.split_once('?') {
			Some((path, query)) => (path, canonical_query(query)),
			None => (request.path, String::new()),
		};
		let canonical_request = format!(
			"{}\n{}\n{}\n{}\n{}\n{}",
			request.method.to_ascii_uppercase(),
			if path.is_empty() { "/" } else { path },
			query,
			canonical_headers,
			signed_headers,
			payload_hash
		);

		let scope = format!("{}/{}/{}/{}", day, self.region, SERVICE, TERMINATOR);
		let string_to_sign = format!(
			"{}\n{}\n{}\n{}",
			ALGORITHM,
			stamp,
			scope,
			hex::encode(Sha256::digest(canonical_request.as_bytes()))
		);

		let key = self.signing_key(&day);
		let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

		vec![
			(DATE_HEADER, stamp),
			(CONTENT_HASH_HEADER, payload_hash),
			(
				"Authorization",
				format!(
					"{} Credential={}/{}, SignedHeaders={}, Signature={}",
					ALGORITHM, self.credentials.access_key, scope, signed_headers, signature
				),
			),
		]
	}

	fn signing_key(&self, day: &str) -> Vec<u8> {
		let seed = format!("{}{}", KEY_PREFIX, self.credentials.secret_key);
		let k_date = hmac(seed.as_bytes(), day.as_bytes());
		let k_region = hmac(&k_date, self.region.as_bytes());
		let k_service = hmac(&k_region, SERVICE.as_bytes());
		hmac(&k_service, TERMINATOR.as_bytes())
	}
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
	// HMAC accepts keys of any length, so construction cannot fail.
	let mut mac = match HmacSha256::new_from_slice(key) {
		Ok(mac) => mac,
		Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
	};
	mac.update(data);
	mac.finalize().into_bytes().to_vec()
}

/// Sorts `a=1&b=2` pairs by key, then value.
fn canonical_query(query: &str) -> String {
	let mut pairs: Vec<(&str, &str)> = query
		.split('&')
		.filter(|pair| !pair.is_empty())
		.map(|pair| pair.split_once('=').unwrap_or((pair, "")))
		.collect();
	pairs.sort_unstable();
	pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	fn signer() -> Signer {
		Signer::new(
			Credentials {
				access_key: "AK123".into(),
				secret_key: "s3cr3t".into(),
			},
			"gcp-us-central1",
		)
	}

	fn request(body: &[u8]) -> SigningRequest<'_> {
		SigningRequest {
			method: "post",
			path: "/api/v1/namespaces/default/pods/web/exec?container=app",
			host: "gcp-us-central1.hyper.sh",
			content_type: Some("application/json"),
			body,
		}
	}

	fn header<'a>(headers: &'a [(&'static str, String)], name: &str) -> &'a str {
		headers
			.iter()
			.find(|(n, _)| *n == name)
			.map(|(_, v)| v.as_str())
			.unwrap_or_else(|| panic!("missing header {name}"))
	}

	#[test]
	fn authorization_names_credential_scope_and_signed_headers() {
		let now = Utc.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap();
		let headers = signer().sign_at(&request(b"{}"), now);

		assert_eq!(header(&headers, DATE_HEADER), "20240309T080706Z");
		let auth = header(&headers, "Authorization");
		assert!(auth.starts_with("HYPER-HMAC-SHA256 Credential=AK123/20240309/gcp-us-central1/hyper/hyper_request, "));
		assert!(auth.contains("SignedHeaders=content-type;host;x-hyper-content-sha256;x-hyper-date, "));
		let signature = auth.rsplit("Signature=").next().unwrap();
		assert_eq!(signature.len(), 64);
		assert!(!auth.contains("s3cr3t"));
	}

	#[test]
	fn content_hash_is_sha256_of_body() {
		let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
		let headers = signer().sign_at(&request(b""), now);
		assert_eq!(
			header(&headers, CONTENT_HASH_HEADER),
			"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
		);
	}

	#[test]
	fn signature_is_deterministic_and_body_sensitive() {
		let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
		let a = signer().sign_at(&request(b"{\"tty\":true}"), now);
		let b = signer().sign_at(&request(b"{\"tty\":true}"), now);
		let c = signer().sign_at(&request(b"{\"tty\":false}"), now);
		assert_eq!(header(&a, "Authorization"), header(&b, "Authorization"));
		assert_ne!(header(&a, "Authorization"), header(&c, "Authorization"));
	}

	#[test]
	fn query_order_does_not_change_signature() {
		let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
		let mut first = request(b"");
		first.path = "/x?b=2&a=1";
		let mut second = request(b"");
		second.path = "/x?a=1&b=2";
		assert_eq!(
			header(&signer().sign_at(&first, now), "Authorization"),
			header(&signer().sign_at(&second, now), "Authorization")
		);
	}

	#[test]
	fn debug_output_redacts_secret() {
		let rendered = format!("{:?}", signer());
		assert!(rendered.contains("AK123"));
		assert!(!rendered.contains("s3cr3t"));
	}
}
