//! Proxy module for collecting and validating proxies
//!
//! This module provides functionality for:
//! - Parsing and fetching candidate proxies from lists and APIs
//! - Deduplicating candidates by address
//! - Probing HTTP, SOCKS4 and SOCKS5 proxies through a bounded worker pool
//! - Streaming valid proxies to a sink with an optional early stop

pub mod aggregator;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod parser;
pub mod pool;
pub mod probe;
pub mod socks4;
pub mod status;
pub mod transport;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use dedup::{deduplicate, DedupSet, Deduplicator};
pub use error::{ProbeError, ValidatorError};
pub use fetcher::{FetcherConfig, ProxyFetcher, ProxySource, SourceKind};
pub use models::{CheckOutcome, Protocol, ProxyRecord, RunSummary};
pub use parser::ProxyParser;
pub use probe::{Probe, ProtocolProbe, ValidationConfig};
pub use status::{status_channel, Reporter, StatusUpdate};
pub use validator::ProxyValidator;
