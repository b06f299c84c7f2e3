//! Proxy data models

use crate::proxy::error::ProbeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Proxy protocol tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Protocol {
    #[default]
    Http,
    Socks4,
    Socks5,
    /// A tag no probe strategy understands; checking it fails per record.
    Other(String),
}

impl Protocol {
    /// Parse a protocol tag, case-insensitively. `https` lists are plain
    /// forward proxies and map to `Http`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "http" | "https" => Protocol::Http,
            "socks4" => Protocol::Socks4,
            "socks5" => Protocol::Socks5,
            other => Protocol::Other(other.to_string()),
        }
    }

    /// Lowercase tag used in `protocol://host:port` lines
    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Http => "http",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
            Protocol::Other(tag) => tag,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Protocol::Other(_))
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate proxy as delivered by a source list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub host: String,
    pub port: String,
    pub protocol: Protocol,
    pub source: String,
}

impl ProxyRecord {
    pub fn new(host: &str, port: &str, protocol: Protocol, source: &str) -> Self {
        Self {
            host: host.to_string(),
            port: port.to_string(),
            protocol,
            source: source.to_string(),
        }
    }

    /// `host:port`, the deduplication key
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `protocol://host:port`
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Result of checking one proxy across its validation rounds
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub proxy: ProxyRecord,
    pub valid: bool,
    /// Rounds that actually ran
    pub attempts: u32,
    pub last_error: Option<ProbeError>,
}

impl CheckOutcome {
    pub fn passed(proxy: ProxyRecord, attempts: u32) -> Self {
        Self {
            proxy,
            valid: true,
            attempts,
            last_error: None,
        }
    }

    pub fn failed(proxy: ProxyRecord, attempts: u32, error: ProbeError) -> Self {
        Self {
            proxy,
            valid: false,
            attempts,
            last_error: Some(error),
        }
    }
}

/// Final counters of a validation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Unique candidates after filtering and deduplication
    pub total: usize,
    pub checked: usize,
    pub valid: usize,
    /// Whether the valid limit stopped the run early
    pub cancelled: bool,
}

impl RunSummary {
    /// Completion fraction in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        progress_fraction(self.checked, self.total)
    }
}

pub(crate) fn progress_fraction(checked: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        checked as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let proxy = ProxyRecord::new("127.0.0.1", "8080", Protocol::Http, "list");
        assert_eq!(proxy.host, "127.0.0.1");
        assert_eq!(proxy.port, "8080");
        assert_eq!(proxy.protocol, Protocol::Http);
        assert_eq!(proxy.source, "list");
    }

    #[test]
    fn test_record_url_and_address() {
        let proxy = ProxyRecord::new("192.168.1.1", "1080", Protocol::Socks5, "list");
        assert_eq!(proxy.url(), "socks5://192.168.1.1:1080");
        assert_eq!(proxy.address(), "192.168.1.1:1080");
        assert_eq!(proxy.to_string(), "socks5://192.168.1.1:1080");
    }

    #[test]
    fn test_protocol_from_tag() {
        assert_eq!(Protocol::from_tag("HTTP"), Protocol::Http);
        assert_eq!(Protocol::from_tag("https"), Protocol::Http);
        assert_eq!(Protocol::from_tag("Socks4"), Protocol::Socks4);
        assert_eq!(Protocol::from_tag("socks5"), Protocol::Socks5);
        assert_eq!(
            Protocol::from_tag("quic"),
            Protocol::Other("quic".to_string())
        );
        assert!(!Protocol::from_tag("quic").is_supported());
    }

    #[test]
    fn test_check_outcome() {
        let proxy = ProxyRecord::new("127.0.0.1", "8080", Protocol::Http, "list");

        let outcome = CheckOutcome::passed(proxy.clone(), 3);
        assert!(outcome.valid);
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.last_error.is_none());

        let outcome = CheckOutcome::failed(proxy, 1, ProbeError::HttpStatus(403));
        assert!(!outcome.valid);
        assert_eq!(outcome.last_error, Some(ProbeError::HttpStatus(403)));
    }

    #[test]
    fn test_fraction_with_zero_total() {
        let summary = RunSummary::default();
        assert_eq!(summary.fraction(), 0.0);

        let summary = RunSummary {
            total: 4,
            checked: 1,
            ..Default::default()
        };
        assert_eq!(summary.fraction(), 0.25);
    }
}
