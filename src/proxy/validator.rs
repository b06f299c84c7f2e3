//! Per-run validation pipeline
//!
//! Each call to [`ProxyValidator::run`] builds its own job queue, event
//! stream and cancellation token, so concurrent runs never share state:
//!
//! ```text
//! records -> Deduplicator -> feeder -> job queue -> N workers -> events -> Aggregator -> sink
//! ```

use crate::proxy::aggregator::Aggregator;
use crate::proxy::dedup::{DedupSet, Deduplicator};
use crate::proxy::error::ValidatorError;
use crate::proxy::models::{ProxyRecord, RunSummary};
use crate::proxy::pool::WorkerPool;
use crate::proxy::probe::{Probe, ProtocolProbe, ValidationConfig};
use crate::proxy::status::Reporter;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capacity of the worker -> aggregator event stream
const EVENT_BUFFER: usize = 1000;

pub struct ProxyValidator {
    config: ValidationConfig,
    probe: Arc<dyn Probe>,
}

impl ProxyValidator {
    /// Validator using the real protocol probes
    pub fn new(config: ValidationConfig) -> crate::Result<Self> {
        let probe = ProtocolProbe::from_config(&config)?;
        Ok(Self::with_probe(config, Arc::new(probe)))
    }

    pub fn with_probe(config: ValidationConfig, probe: Arc<dyn Probe>) -> Self {
        Self { config, probe }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Deduplicator applying this run's protocol filter
    pub fn deduplicator(&self) -> Deduplicator {
        Deduplicator::new(self.config.protocol_filter.as_deref())
    }

    /// Deduplicate `records` and check them
    pub async fn run_records<W: Write>(
        &self,
        records: Vec<ProxyRecord>,
        sink: &mut W,
        reporter: Reporter,
    ) -> Result<RunSummary, ValidatorError> {
        let mut dedup = self.deduplicator();
        dedup.extend(records);
        self.run(dedup.finish(), sink, reporter).await
    }

    /// Gather record batches until every producer hangs up, then check them
    pub async fn run_stream<W: Write>(
        &self,
        batches: mpsc::Receiver<Vec<ProxyRecord>>,
        sink: &mut W,
        reporter: Reporter,
    ) -> Result<RunSummary, ValidatorError> {
        let mut dedup = self.deduplicator();
        dedup.collect_from(batches).await;
        self.run(dedup.finish(), sink, reporter).await
    }

    /// Check every candidate, writing valid ones to `sink` as
    /// `protocol://host:port` lines. Returns once every worker has exited.
    pub async fn run<W: Write>(
        &self,
        candidates: DedupSet,
        sink: &mut W,
        reporter: Reporter,
    ) -> Result<RunSummary, ValidatorError> {
        let total = candidates.len();
        info!(
            total,
            concurrency = self.config.concurrency,
            rounds = self.config.rounds_per_proxy,
            limit = self.config.valid_limit,
            target = %self.config.target_url,
            "starting validation"
        );
        reporter.log(format!("Checking {total} unique proxies..."));

        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let pool = WorkerPool::new(
            Arc::clone(&self.probe),
            self.config.rounds_per_proxy,
            self.config.concurrency,
        );
        let handle = pool.spawn(
            candidates.into_records(),
            event_tx,
            reporter.clone(),
            cancel.clone(),
        );

        let result = Aggregator::new(sink, total, self.config.valid_limit, cancel, reporter)
            .run(event_rx)
            .await;

        if let Err(e) = handle.await {
            warn!("worker pool ended abnormally: {e}");
        }

        result
    }
}
