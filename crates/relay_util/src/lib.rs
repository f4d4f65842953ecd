#![forbid(unsafe_code)]

pub mod endpoint {
	use std::net::SocketAddr;

	use thiserror::Error;

	/// Errors for parsing `tcp://host:port` endpoint strings.
	#[derive(Debug, Error, Clone, PartialEq, Eq)]
	pub enum EndpointParseError {
		#[error("endpoint must be non-empty (expected tcp://host:port)")]
		Empty,
		#[error("invalid endpoint (expected tcp://host:port): {0}")]
		BadScheme(String),
		#[error("invalid endpoint (no path/query/fragment allowed): {0}")]
		TrailingJunk(String),
		#[error("invalid endpoint host: {0}")]
		BadHost(String),
		#[error("IPv6 hosts must be bracketed, like tcp://[::1]:8888: {0}")]
		UnbracketedIpv6(String),
		#[error("invalid endpoint port (expected 1..=65535): {0}")]
		BadPort(String),
		#[error("host must be an IP literal here (DNS names not accepted): {0}")]
		NotIpLiteral(String),
	}

	/// Parsed `tcp://host:port` endpoint.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct TcpEndpoint {
		pub host: String,
		pub port: u16,
	}

	impl TcpEndpoint {
		/// Returns `host:port` (IPv6 hosts stay bracketed).
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host, self.port)
		}

		/// Convert to `SocketAddr`; fails for DNS hostnames.
		pub fn to_socket_addr_if_ip_literal(&self) -> Result<SocketAddr, EndpointParseError> {
			self.hostport()
				.parse()
				.map_err(|_| EndpointParseError::NotIpLiteral(self.host.clone()))
		}

		/// Parse an endpoint string in the form `tcp://host:port`.
		pub fn parse(s: &str) -> Result<Self, EndpointParseError> {
			let s = s.trim();
			if s.is_empty() {
				return Err(EndpointParseError::Empty);
			}

			let rest = s
				.strip_prefix("tcp://")
				.ok_or_else(|| EndpointParseError::BadScheme(s.to_string()))?;

			if rest.contains('/') || rest.contains('?') || rest.contains('#') {
				return Err(EndpointParseError::TrailingJunk(s.to_string()));
			}

			let (host, port_s) = rest
				.rsplit_once(':')
				.ok_or_else(|| EndpointParseError::BadPort(s.to_string()))?;

			let host = host.trim();
			if host.is_empty() {
				return Err(EndpointParseError::BadHost(s.to_string()));
			}
			if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
				return Err(EndpointParseError::UnbracketedIpv6(s.to_string()));
			}

			let port: u16 = port_s
				.trim()
				.parse()
				.map_err(|_| EndpointParseError::BadPort(s.to_string()))?;
			if port == 0 {
				return Err(EndpointParseError::BadPort(s.to_string()));
			}

			Ok(Self {
				host: host.to_string(),
				port,
			})
		}
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		#[test]
		fn parses_ipv4_and_dns() {
			let e = TcpEndpoint::parse("tcp://127.0.0.1:8888").unwrap();
			assert_eq!(e.hostport(), "127.0.0.1:8888");

			let e = TcpEndpoint::parse("tcp://relay.example.com:8888").unwrap();
			assert_eq!(e.host, "relay.example.com");
			assert!(e.to_socket_addr_if_ip_literal().is_err());
		}

		#[test]
		fn parses_bracketed_ipv6() {
			let e = TcpEndpoint::parse("tcp://[::1]:8888").unwrap();
			assert_eq!(e.host, "[::1]");
			assert_eq!(e.to_socket_addr_if_ip_literal().unwrap().to_string(), "[::1]:8888");
		}

		#[test]
		fn rejects_malformed_endpoints() {
			assert_eq!(TcpEndpoint::parse(""), Err(EndpointParseError::Empty));
			assert!(matches!(
				TcpEndpoint::parse("quic://127.0.0.1:8888"),
				Err(EndpointParseError::BadScheme(_))
			));
			assert!(matches!(
				TcpEndpoint::parse("tcp://::1:8888"),
				Err(EndpointParseError::UnbracketedIpv6(_))
			));
			assert!(matches!(
				TcpEndpoint::parse("tcp://127.0.0.1:0"),
				Err(EndpointParseError::BadPort(_))
			));
			assert!(matches!(
				TcpEndpoint::parse("tcp://127.0.0.1:8888/path"),
				Err(EndpointParseError::TrailingJunk(_))
			));
			assert!(matches!(
				TcpEndpoint::parse("tcp://127.0.0.1"),
				Err(EndpointParseError::BadPort(_))
			));
		}
	}
}
