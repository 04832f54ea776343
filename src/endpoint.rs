//! Endpoint URL parsing for the network transport
//!
//! Parsing is permissive. A missing scheme is accepted, a missing or
//! unparseable port becomes 80 and a missing path becomes `/`. Only an empty
//! host is rejected.

use crate::config::ConfigError;
use std::fmt;

/// Port used when the URL does not name one
pub const DEFAULT_PORT: u16 = 80;

/// A parsed `scheme://host:port/target` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Request target including the leading `/` (and any query string)
    pub target: String,
}

impl Endpoint {
    /// Parse an endpoint URL such as `http://collector:8080/ingest`
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let url = url.trim();
        let rest = match url.find("://") {
            Some(idx) => &url[idx + 3..],
            None => url,
        };

        let (authority, target) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let (host, port_text) = split_authority(authority);
        if host.is_empty() {
            return Err(ConfigError::EmptyHost(url.to_string()));
        }

        let port = match port_text {
            None | Some("") => DEFAULT_PORT,
            Some(text) => text.parse().unwrap_or_else(|_| {
                tracing::warn!(port = text, "unparseable endpoint port, using {}", DEFAULT_PORT);
                DEFAULT_PORT
            }),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            target: target.to_string(),
        })
    }

    /// Value for the `Host` header
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == DEFAULT_PORT {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// Split `host[:port]`, honouring bracketed IPv6 literals
fn split_authority(authority: &str) -> (&str, Option<&str>) {
    if let Some(stripped) = authority.strip_prefix('[') {
        if let Some(close) = stripped.find(']') {
            let host = &stripped[..close];
            let after = &stripped[close + 1..];
            return (host, after.strip_prefix(':'));
        }
    }
    match authority.rfind(':') {
        Some(idx) => (&authority[..idx], Some(&authority[idx + 1..])),
        None => (authority, None),
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "http://[{}]:{}{}", self.host, self.port, self.target)
        } else {
            write!(f, "http://{}:{}{}", self.host, self.port, self.target)
        }
    }
}
