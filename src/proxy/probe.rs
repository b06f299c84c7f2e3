//! Connectivity probes, one strategy per proxy protocol

use crate::proxy::error::ProbeError;
use crate::proxy::models::{Protocol, ProxyRecord};
use crate::proxy::{socks4, transport};
use async_trait::async_trait;
use reqwest::{redirect, Client, Proxy as ReqwestProxy, StatusCode};
use std::time::Duration;
use url::Url;

/// Default timeout for proxy checks in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of concurrent checks
const DEFAULT_CONCURRENCY: usize = 10;

/// Default URL to test proxies against
const DEFAULT_TARGET_URL: &str = "https://www.google.com";

/// Configuration of a validation run
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Reachability target every probe fetches through the proxy
    pub target_url: String,
    /// Timeout for connecting and for the request itself
    pub timeout: Duration,
    /// Consecutive successful probes required per proxy
    pub rounds_per_proxy: u32,
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Stop after this many valid proxies, 0 means check everything
    pub valid_limit: usize,
    /// Only check proxies of this protocol
    pub protocol_filter: Option<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            rounds_per_proxy: 1,
            concurrency: DEFAULT_CONCURRENCY,
            valid_limit: 0,
            protocol_filter: None,
        }
    }
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_url(mut self, url: String) -> Self {
        self.target_url = url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds_per_proxy = rounds.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_valid_limit(mut self, limit: usize) -> Self {
        self.valid_limit = limit;
        self
    }

    pub fn with_protocol_filter(mut self, filter: Option<String>) -> Self {
        self.protocol_filter = filter.filter(|f| !f.trim().is_empty());
        self
    }
}

/// A single connectivity attempt through a proxy
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, proxy: &ProxyRecord) -> Result<(), ProbeError>;
}

/// Probe that picks the HTTP, SOCKS5 or SOCKS4 strategy from the record's tag
#[derive(Debug, Clone)]
pub struct ProtocolProbe {
    target: Url,
    timeout: Duration,
}

impl ProtocolProbe {
    pub fn new(target_url: &str, timeout: Duration) -> crate::Result<Self> {
        let target = Url::parse(target_url)?;
        Ok(Self { target, timeout })
    }

    pub fn from_config(config: &ValidationConfig) -> crate::Result<Self> {
        Self::new(&config.target_url, config.timeout)
    }

    async fn probe_http(&self, proxy: &ProxyRecord) -> Result<(), ProbeError> {
        let client = self.create_client(&format!("http://{}", proxy.address()))?;
        self.fetch_through(&client).await
    }

    async fn probe_socks5(&self, proxy: &ProxyRecord) -> Result<(), ProbeError> {
        // socks5h hands the target hostname to the proxy
        let client = self.create_client(&format!("socks5h://{}", proxy.address()))?;
        self.fetch_through(&client).await
    }

    async fn probe_socks4(&self, proxy: &ProxyRecord) -> Result<(), ProbeError> {
        let stream = socks4::connect(&proxy.address(), &self.target, self.timeout).await?;

        let status = tokio::time::timeout(self.timeout, transport::get_status(stream, &self.target))
            .await
            .map_err(|_| ProbeError::Dial("request timed out".to_string()))??;

        expect_ok(status.as_u16())
    }

    /// Create a reqwest client routed through the proxy, one fresh
    /// connection per probe. Redirects are returned as-is, so a 3xx target
    /// fails the same way on every strategy.
    fn create_client(&self, proxy_url: &str) -> Result<Client, ProbeError> {
        let reqwest_proxy = ReqwestProxy::all(proxy_url)
            .map_err(|e| ProbeError::ProxyProtocol(e.to_string()))?;

        Client::builder()
            .proxy(reqwest_proxy)
            .redirect(redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProbeError::ProxyProtocol(e.to_string()))
    }

    async fn fetch_through(&self, client: &Client) -> Result<(), ProbeError> {
        let response = client.get(self.target.clone()).send().await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ProbeError::HttpStatus(status.as_u16())),
        }
    }
}

fn expect_ok(status: u16) -> Result<(), ProbeError> {
    if status == 200 {
        Ok(())
    } else {
        Err(ProbeError::HttpStatus(status))
    }
}

#[async_trait]
impl Probe for ProtocolProbe {
    async fn probe(&self, proxy: &ProxyRecord) -> Result<(), ProbeError> {
        match &proxy.protocol {
            Protocol::Http => self.probe_http(proxy).await,
            Protocol::Socks5 => self.probe_socks5(proxy).await,
            Protocol::Socks4 => self.probe_socks4(proxy).await,
            Protocol::Other(tag) => Err(ProbeError::UnsupportedProtocol(tag.clone())),
        }
    }
}
