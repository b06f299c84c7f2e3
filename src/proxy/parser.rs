//! Proxy list parser for plain-text sources

use crate::proxy::models::{Protocol, ProxyRecord};
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

/// `scheme://host:port` with an optional trailing slash
static URL_FORMAT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?|socks[45])://([^:/\s]+):(\d{1,5})/?$").expect("Invalid URL format regex")
});

/// IP:PORT patterns embedded in arbitrary text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\b")
        .expect("Invalid IP:PORT regex")
});

/// Proxy parser for parsing proxies from strings and files
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line
    ///
    /// Supports formats:
    /// - HOST:PORT
    /// - HOST:PORT:anything (trailing fields are ignored)
    /// - scheme://HOST:PORT, where a known scheme overrides `protocol`
    pub fn parse_line(line: &str, protocol: &Protocol, source: &str) -> Option<ProxyRecord> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        if let Some(caps) = URL_FORMAT_REGEX.captures(line) {
            let port = valid_port(&caps[3])?;
            return Some(ProxyRecord::new(
                &caps[2],
                port,
                Protocol::from_tag(&caps[1]),
                source,
            ));
        }

        // unknown scheme prefixes are stripped, the list's protocol applies
        let line = line.split_once("://").map_or(line, |(_, rest)| rest);

        let mut parts = line.split(':');
        let host = parts.next()?.trim();
        let port = valid_port(parts.next()?.trim())?;
        if host.is_empty() || host.contains(char::is_whitespace) {
            return None;
        }

        Some(ProxyRecord::new(host, port, protocol.clone(), source))
    }

    /// Parse proxies from a string (multiple lines), falling back to
    /// IP:PORT extraction when no line parses on its own
    pub fn parse_string(content: &str, protocol: &Protocol, source: &str) -> Vec<ProxyRecord> {
        let proxies: Vec<_> = content
            .lines()
            .filter_map(|line| Self::parse_line(line, protocol, source))
            .collect();

        if proxies.is_empty() {
            Self::extract_ip_ports(content, protocol, source)
        } else {
            proxies
        }
    }

    /// Parse proxies from a file
    pub fn parse_file<P: AsRef<Path>>(
        path: P,
        protocol: &Protocol,
        source: &str,
    ) -> Result<Vec<ProxyRecord>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse_string(&content, protocol, source))
    }

    /// Extract IPv4:PORT pairs anywhere in the content
    pub fn extract_ip_ports(content: &str, protocol: &Protocol, source: &str) -> Vec<ProxyRecord> {
        IP_PORT_REGEX
            .captures_iter(content)
            .filter_map(|cap| {
                let host = cap.get(1)?.as_str();
                if host.parse::<std::net::Ipv4Addr>().is_err() {
                    return None;
                }
                let port = valid_port(cap.get(2)?.as_str())?;
                Some(ProxyRecord::new(host, port, protocol.clone(), source))
            })
            .collect()
    }
}

/// Ports are kept as text, but must be a non-zero u16
fn valid_port(port: &str) -> Option<&str> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(port),
    }
}
