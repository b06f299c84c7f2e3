//! Single consumer of pool events: counts, persists and decides when to stop

use crate::proxy::error::ValidatorError;
use crate::proxy::models::{CheckOutcome, RunSummary};
use crate::proxy::pool::PoolEvent;
use crate::proxy::status::Reporter;
use std::io::{self, Write};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Counters owned by the aggregator loop
#[derive(Debug, Default, Clone, Copy)]
struct RunState {
    checked: usize,
    valid: usize,
}

pub struct Aggregator<'a, W: Write> {
    sink: &'a mut W,
    total: usize,
    valid_limit: usize,
    state: RunState,
    cancel: CancellationToken,
    reporter: Reporter,
    limit_reached: bool,
    sink_error: Option<io::Error>,
}

impl<'a, W: Write> Aggregator<'a, W> {
    pub fn new(
        sink: &'a mut W,
        total: usize,
        valid_limit: usize,
        cancel: CancellationToken,
        reporter: Reporter,
    ) -> Self {
        Self {
            sink,
            total,
            valid_limit,
            state: RunState::default(),
            cancel,
            reporter,
            limit_reached: false,
            sink_error: None,
        }
    }

    /// Consume events until the pool reports completion, then emit the
    /// finished event. Keeps draining after cancellation so in-flight workers
    /// are never blocked on a full stream.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<PoolEvent>,
    ) -> Result<RunSummary, ValidatorError> {
        while let Some(event) = events.recv().await {
            match event {
                PoolEvent::Valid(outcome) => self.on_valid(outcome),
                PoolEvent::Progress { .. } => self.on_progress(),
                PoolEvent::Completed => break,
            }
        }

        let summary = RunSummary {
            total: self.total,
            checked: self.state.checked,
            valid: self.state.valid,
            cancelled: self.cancel.is_cancelled(),
        };
        info!(
            checked = summary.checked,
            valid = summary.valid,
            total = summary.total,
            "validation finished"
        );
        self.reporter.finished(summary);

        match self.sink_error {
            Some(err) => Err(ValidatorError::SinkWrite(err)),
            None => Ok(summary),
        }
    }

    fn on_valid(&mut self, outcome: CheckOutcome) {
        let proxy = outcome.proxy;
        if self.limit_reached || self.sink_error.is_some() {
            debug!(%proxy, "valid proxy arrived after the run was stopped, discarding");
            return;
        }

        // persist first so the proxy that hits the limit is never lost
        if let Err(err) = writeln!(self.sink, "{}", proxy.url()).and_then(|_| self.sink.flush()) {
            error!(%proxy, "failed to persist valid proxy: {err}");
            self.sink_error = Some(err);
            self.cancel.cancel();
            return;
        }

        self.state.valid += 1;
        self.reporter.log(format!("Valid: {proxy}"));

        if self.valid_limit > 0 && self.state.valid >= self.valid_limit {
            info!(limit = self.valid_limit, "valid proxy limit reached, stopping");
            self.limit_reached = true;
            self.cancel.cancel();
        }
    }

    fn on_progress(&mut self) {
        self.state.checked += 1;
        self.reporter
            .progress(self.state.checked, self.total, self.state.valid);
    }
}
