//! Key extraction for rate limiting
//!
//! Every request maps to *some* key: when the chosen strategy finds nothing,
//! the client address chain is used, and when no address is known either the
//! request lands in one of 65 536 anonymous buckets derived from its headers.

use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::Arc;

/// Type alias for key extractor function
pub type KeyExtractorFn = Arc<dyn Fn(&RequestInfo) -> Option<String> + Send + Sync>;

/// Headers consulted for the client address, in order.
const CLIENT_IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Headers hashed into the anonymous bucket.
const FINGERPRINT_HEADERS: [&str; 3] = ["user-agent", "accept-language", "accept"];

/// Information about an incoming request used for key extraction
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Peer address of the connection
    pub ip: Option<IpAddr>,
    /// Request path
    pub path: String,
    /// Request method (GET, POST, etc.)
    pub method: String,
    /// User ID (if authenticated)
    pub user_id: Option<String>,
    /// Request headers
    pub headers: Vec<(String, String)>,
}

impl RequestInfo {
    /// Create a new request info
    pub fn new(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            ip: None,
            path: path.into(),
            method: method.into(),
            user_id: None,
            headers: Vec::new(),
        }
    }

    /// Set the peer address
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Set the user ID
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Get a header value by name (case-insensitive)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Best-known client address: forwarding headers first, then the peer.
    ///
    /// Only the first hop of `X-Forwarded-For` is used.
    pub fn client_ip(&self) -> Option<String> {
        for header in CLIENT_IP_HEADERS {
            let candidate = self
                .get_header(header)
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty());
            if let Some(ip) = candidate {
                return Some(ip.to_string());
            }
        }
        self.ip.map(|ip| ip.to_string())
    }

    /// Anonymous bucket derived from identifying headers, e.g. `anon:3f9a`.
    pub fn anonymous_key(&self) -> String {
        let mut hasher = Sha256::new();
        for header in FINGERPRINT_HEADERS {
            hasher.update(self.get_header(header).unwrap_or_default().as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        format!("anon:{}", hex::encode(&digest[..2]))
    }
}

/// Key extraction strategies
#[derive(Clone, Default)]
pub enum KeyExtractor {
    /// Client address from forwarding headers, falling back to the peer
    #[default]
    ForwardedIp,
    /// Peer address only
    Ip,
    /// Extract key from user ID (requires authentication)
    UserId,
    /// Extract key from API key header
    ApiKey {
        /// Header name for API key
        header_name: String,
    },
    /// Extract key from a custom header
    Header {
        /// Header name to extract
        name: String,
    },
    /// Combine client address and path for per-endpoint limiting
    IpAndPath,
    /// Custom extractor function
    Custom(KeyExtractorFn),
}

impl KeyExtractor {
    /// Create a user ID-based key extractor
    pub fn user_id() -> Self {
        Self::UserId
    }

    /// Create an API key-based extractor
    pub fn api_key(header_name: impl Into<String>) -> Self {
        Self::ApiKey {
            header_name: header_name.into(),
        }
    }

    /// Create a header-based extractor
    pub fn header(name: impl Into<String>) -> Self {
        Self::Header { name: name.into() }
    }

    /// Create a custom extractor
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&RequestInfo) -> Option<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Extract the key from request info, if this strategy applies
    pub fn extract(&self, info: &RequestInfo) -> Option<String> {
        match self {
            Self::ForwardedIp => info.client_ip(),
            Self::Ip => info.ip.map(|ip| ip.to_string()),
            Self::UserId => info.user_id.clone(),
            Self::ApiKey { header_name } => info.get_header(header_name).map(|s| s.to_string()),
            Self::Header { name } => info.get_header(name).map(|s| s.to_string()),
            Self::IpAndPath => info.client_ip().map(|ip| format!("{}:{}", ip, info.path)),
            Self::Custom(f) => f(info),
        }
    }

    /// Extract the key, never failing.
    ///
    /// Falls back to the client address chain, then to the anonymous bucket.
    pub fn key_for(&self, info: &RequestInfo) -> String {
        self.extract(info)
            .or_else(|| info.client_ip())
            .unwrap_or_else(|| info.anonymous_key())
    }

    /// Get a description of this extractor
    pub fn description(&self) -> &str {
        match self {
            Self::ForwardedIp => "Forwarded IP",
            Self::Ip => "IP address",
            Self::UserId => "User ID",
            Self::ApiKey { .. } => "API key",
            Self::Header { .. } => "Custom header",
            Self::IpAndPath => "IP + Path",
            Self::Custom(_) => "Custom",
        }
    }
}

impl std::fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey { header_name } => f.debug_struct("ApiKey").field("header_name", header_name).finish(),
            Self::Header { name } => f.debug_struct("Header").field("name", name).finish(),
            other => f.write_str(match other {
                Self::ForwardedIp => "ForwardedIp",
                Self::Ip => "Ip",
                Self::UserId => "UserId",
                Self::IpAndPath => "IpAndPath",
                _ => "Custom",
            }),
        }
    }
}
