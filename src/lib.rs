//! Proxy Harvest - Proxy Collector and Validator
//!
//! Collects candidate HTTP, SOCKS4 and SOCKS5 proxies, checks each one by
//! fetching a reachability target through it, and keeps the ones that work.

pub mod logging;
pub mod proxy;

pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
