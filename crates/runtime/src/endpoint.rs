//! Remote host parsing and default-domain substitution.

use url::Url;

use crate::error::{Error, Result};

/// Wildcard domain the hosted service publishes per region.
pub const DEFAULT_DOMAIN: &str = "hyper.sh";

/// Scheme-level transport choice for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
	Http,
	Https,
}

/// A resolved `scheme://host:port` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	pub scheme: Scheme,
	pub host: String,
	pub port: u16,
}

impl Endpoint {
	/// Parses `host`, substituting `region` for a `*` label on the default domain.
	///
	/// `https://` and `tcp://` both mean TLS; `http://` is plain TCP. A bare
	/// `host:port` is treated as `https://`.
	pub fn parse(host: &str, region: &str) -> Result<Self> {
		let mut raw = host.trim().to_string();
		if raw.is_empty() {
			return Err(invalid(host, "host is empty"));
		}
		if !raw.contains("://") {
			raw = format!("https://{raw}");
		}
		if raw.contains(DEFAULT_DOMAIN) && raw.contains('*') {
			if region.is_empty() {
				return Err(invalid(host, "wildcard host requires a region"));
			}
			raw = raw.replacen('*', region, 1);
		}

		let url = Url::parse(&raw).map_err(|e| invalid(host, &e.to_string()))?;
		let scheme = match url.scheme() {
			"http" => Scheme::Http,
			"https" | "tcp" => Scheme::Https,
			other => return Err(invalid(host, &format!("unsupported scheme '{other}'"))),
		};
		let name = url.host_str().ok_or_else(|| invalid(host, "missing host name"))?;
		let port = url.port().unwrap_or(match scheme {
			Scheme::Http => 80,
			Scheme::Https => 443,
		});

		Ok(Self {
			scheme,
			host: name.trim_start_matches('[').trim_end_matches(']').to_string(),
			port,
		})
	}

	pub fn is_tls(&self) -> bool {
		self.scheme == Scheme::Https
	}

	/// `host[:port]` as sent in the `Host` header; default ports are omitted.
	pub fn authority(&self) -> String {
		let default_port = match self.scheme {
			Scheme::Http => 80,
			Scheme::Https => 443,
		};
		let host = if self.host.contains(':') {
			format!("[{}]", self.host)
		} else {
			self.host.clone()
		};
		if self.port == default_port {
			host
		} else {
			format!("{}:{}", host, self.port)
		}
	}

	/// Base URL for ordinary requests.
	pub fn base_url(&self) -> String {
		let scheme = match self.scheme {
			Scheme::Http => "http",
			Scheme::Https => "https",
		};
		format!("{}://{}", scheme, self.authority())
	}
}

fn invalid(host: &str, reason: &str) -> Error {
	Error::InvalidHost {
		host: host.to_string(),
		reason: reason.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wildcard_default_domain_takes_region() {
		let endpoint = Endpoint::parse("https://*.hyper.sh:443", "gcp-us-central1").unwrap();
		assert_eq!(endpoint.host, "gcp-us-central1.hyper.sh");
		assert_eq!(endpoint.port, 443);
		assert!(endpoint.is_tls());
		assert_eq!(endpoint.authority(), "gcp-us-central1.hyper.sh");
	}

	#[test]
	fn tcp_scheme_means_tls() {
		let endpoint = Endpoint::parse("tcp://api.example.com:6443", "").unwrap();
		assert_eq!(endpoint.scheme, Scheme::Https);
		assert_eq!(endpoint.authority(), "api.example.com:6443");
		assert_eq!(endpoint.base_url(), "https://api.example.com:6443");
	}

	#[test]
	fn plain_http_keeps_port() {
		let endpoint = Endpoint::parse("http://127.0.0.1:8080", "").unwrap();
		assert!(!endpoint.is_tls());
		assert_eq!(endpoint.base_url(), "http://127.0.0.1:8080");
	}

	#[test]
	fn bare_host_defaults_to_https() {
		let endpoint = Endpoint::parse("api.example.com", "").unwrap();
		assert_eq!(endpoint.scheme, Scheme::Https);
		assert_eq!(endpoint.port, 443);
	}

	#[test]
	fn wildcard_without_region_is_rejected() {
		let err = Endpoint::parse("https://*.hyper.sh", "").unwrap_err();
		assert!(matches!(err, Error::InvalidHost { .. }));
	}

	#[test]
	fn unsupported_scheme_is_rejected() {
		assert!(Endpoint::parse("ftp://example.com", "").is_err());
	}
}
