//! Candidate acquisition from remote proxy lists
//!
//! Sources are fetched concurrently and each one hands its records to the
//! dedup channel as soon as it completes. A failing source is reported and
//! skipped; it never stops the others.

use crate::proxy::models::{Protocol, ProxyRecord};
use crate::proxy::parser::ProxyParser;
use crate::proxy::status::Reporter;
use crate::Result;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Configuration for the list fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// How a source's response body is laid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// One proxy per line, all of the source's protocol
    Text,
    /// Paged geonode-style JSON API; `page=N` is appended to the URL
    Geonode { pages: u32 },
}

/// A remote proxy list
#[derive(Debug, Clone)]
pub struct ProxySource {
    pub name: String,
    pub url: String,
    pub protocol: Protocol,
    pub kind: SourceKind,
}

impl ProxySource {
    pub fn text(name: &str, url: &str, protocol: Protocol) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            protocol,
            kind: SourceKind::Text,
        }
    }

    pub fn geonode(name: &str, url: &str, pages: u32) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            protocol: Protocol::Http,
            kind: SourceKind::Geonode { pages },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeonodePage {
    #[serde(default)]
    data: Vec<GeonodeEntry>,
}

#[derive(Debug, Deserialize)]
struct GeonodeEntry {
    ip: String,
    port: String,
    #[serde(default)]
    protocols: Vec<String>,
}

impl GeonodeEntry {
    /// One record per protocol the entry advertises; unknown tags are skipped
    fn into_records(self, source: &str) -> Vec<ProxyRecord> {
        self.protocols
            .iter()
            .map(|tag| Protocol::from_tag(tag))
            .filter(Protocol::is_supported)
            .map(|protocol| ProxyRecord::new(&self.ip, &self.port, protocol, source))
            .collect()
    }
}

/// Fetches proxy lists over HTTP
pub struct ProxyFetcher {
    client: Client,
}

impl ProxyFetcher {
    /// Create a new fetcher with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(FetcherConfig::default())
    }

    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }

    /// Fetch and parse every record of one source
    pub async fn fetch_source(&self, source: &ProxySource, reporter: &Reporter) -> Result<Vec<ProxyRecord>> {
        match source.kind {
            SourceKind::Text => self.fetch_text(source).await,
            SourceKind::Geonode { pages } => Ok(self.fetch_geonode(source, pages, reporter).await),
        }
    }

    async fn fetch_text(&self, source: &ProxySource) -> Result<Vec<ProxyRecord>> {
        let response = self.client.get(&source.url).send().await?.error_for_status()?;
        let content = response.text().await?;
        Ok(ProxyParser::parse_string(&content, &source.protocol, &source.name))
    }

    /// Pages that fail are skipped; the first empty page ends the walk
    async fn fetch_geonode(&self, source: &ProxySource, pages: u32, reporter: &Reporter) -> Vec<ProxyRecord> {
        let mut records = Vec::new();

        for page in 1..=pages {
            let url = format!("{}&page={}", source.url, page);
            match self.fetch_geonode_page(&url).await {
                Ok(body) if body.data.is_empty() => break,
                Ok(body) => {
                    for entry in body.data {
                        records.extend(entry.into_records(&source.name));
                    }
                }
                Err(e) => {
                    warn!(source = %source.name, page, "page fetch failed: {e}");
                    reporter.log(format!("Error fetching {} page {}: {}", source.name, page, e));
                }
            }
        }

        records
    }

    async fn fetch_geonode_page(&self, url: &str) -> reqwest::Result<GeonodePage> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<GeonodePage>()
            .await
    }

    /// Fetch every source concurrently, sending each source's records to
    /// `tx` as soon as it completes
    pub async fn fetch_all(
        &self,
        sources: &[ProxySource],
        tx: mpsc::Sender<Vec<ProxyRecord>>,
        reporter: &Reporter,
    ) {
        let tasks = sources.iter().map(|source| {
            let tx = tx.clone();
            async move {
                reporter.log(format!("Fetching {} list from {}...", source.protocol, source.name));
                match self.fetch_source(source, reporter).await {
                    Ok(records) => {
                        info!(source = %source.name, count = records.len(), "fetched proxies");
                        reporter.log(format!("Fetched {} proxies from {}", records.len(), source.name));
                        if !records.is_empty() {
                            let _ = tx.send(records).await;
                        }
                    }
                    Err(e) => {
                        warn!(source = %source.name, "fetch failed: {e}");
                        reporter.log(format!("Error fetching {}: {}", source.name, e));
                    }
                }
            }
        });

        join_all(tasks).await;
    }

    /// Public proxy lists checked when no other input is given.
    ///
    /// free-proxy-list.net is read as text: the raw list embedded in its page
    /// parses line by line, so the HTML table is not scraped. proxydb.net is
    /// not included.
    pub fn default_sources() -> Vec<ProxySource> {
        vec![
            ProxySource::text(
                "iplocate",
                "https://raw.githubusercontent.com/iplocate/free-proxy-list/refs/heads/main/all-proxies.txt",
                Protocol::Http,
            ),
            ProxySource::text(
                "proxyscrape",
                "https://api.proxyscrape.com/v4/free-proxy-list/get?request=get_proxies&skip=0&proxy_format=protocolipport&format=text&limit=1000000&timeout=200000",
                Protocol::Http,
            ),
            ProxySource::text(
                "TheSpeedX-SOCKS5",
                "https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/socks5.txt",
                Protocol::Socks5,
            ),
            ProxySource::text(
                "TheSpeedX-SOCKS4",
                "https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/socks4.txt",
                Protocol::Socks4,
            ),
            ProxySource::text(
                "TheSpeedX-HTTP",
                "https://raw.githubusercontent.com/TheSpeedX/SOCKS-List/master/http.txt",
                Protocol::Http,
            ),
            ProxySource::geonode(
                "Geonode",
                "https://proxylist.geonode.com/api/proxy-list?limit=500&sort_by=lastChecked&sort_type=desc",
                10,
            ),
            ProxySource::text(
                "free-proxy-list.net",
                "https://free-proxy-list.net/",
                Protocol::Http,
            ),
        ]
    }
}
