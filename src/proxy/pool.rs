//! Fixed-size worker pool draining a shared job queue

use crate::proxy::models::{CheckOutcome, ProxyRecord};
use crate::proxy::probe::Probe;
use crate::proxy::status::Reporter;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Events flowing from the pool to the aggregator
#[derive(Debug)]
pub enum PoolEvent {
    /// The proxy passed every round it ran
    Valid(CheckOutcome),
    /// One job finished, sent exactly once per claimed job
    Progress { valid: bool },
    /// Every worker has exited; nothing follows
    Completed,
}

type JobQueue = Arc<Mutex<mpsc::Receiver<ProxyRecord>>>;

pub struct WorkerPool {
    probe: Arc<dyn Probe>,
    rounds: u32,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(probe: Arc<dyn Probe>, rounds: u32, concurrency: usize) -> Self {
        Self {
            probe,
            rounds: rounds.max(1),
            concurrency: concurrency.max(1),
        }
    }

    /// Start the feeder and workers. The returned handle resolves after
    /// [`PoolEvent::Completed`] has been sent.
    ///
    /// Cancelling `cancel` stops the feeder before its next enqueue and stops
    /// workers from claiming further jobs; jobs already claimed run to the end.
    pub fn spawn(
        self,
        jobs: Vec<ProxyRecord>,
        events: mpsc::Sender<PoolEvent>,
        reporter: Reporter,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let (job_tx, job_rx) = mpsc::channel(self.concurrency);
        let queue: JobQueue = Arc::new(Mutex::new(job_rx));

        let feeder = tokio::spawn(feed(jobs, job_tx, cancel.clone()));

        let mut workers = JoinSet::new();
        for id in 0..self.concurrency {
            workers.spawn(work(
                id,
                Arc::clone(&queue),
                Arc::clone(&self.probe),
                self.rounds,
                events.clone(),
                reporter.clone(),
                cancel.clone(),
            ));
        }

        tokio::spawn(async move {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!("worker ended abnormally: {e}");
                }
            }
            if let Err(e) = feeder.await {
                warn!("feeder ended abnormally: {e}");
            }
            let _ = events.send(PoolEvent::Completed).await;
        })
    }
}

async fn feed(jobs: Vec<ProxyRecord>, queue: mpsc::Sender<ProxyRecord>, cancel: CancellationToken) {
    for job in jobs {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = queue.send(job) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    // dropping the sender closes the queue; queued jobs are still drained
}

async fn work(
    id: usize,
    queue: JobQueue,
    probe: Arc<dyn Probe>,
    rounds: u32,
    events: mpsc::Sender<PoolEvent>,
    reporter: Reporter,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = queue.recv() => job,
            }
        };
        let Some(proxy) = job else { break };

        let outcome = check_rounds(probe.as_ref(), proxy, rounds).await;
        let valid = outcome.valid;

        if valid {
            let _ = events.send(PoolEvent::Valid(outcome)).await;
        } else if let Some(err) = &outcome.last_error {
            let p = &outcome.proxy;
            debug!(worker = id, host = %p.host, port = %p.port, protocol = %p.protocol, "failed: {err}");
            reporter.log(format!(
                "{}:{} ({}) -> Failed: {}",
                p.host, p.port, p.protocol, err
            ));
        }

        let _ = events.send(PoolEvent::Progress { valid }).await;
    }
}

/// Probe `proxy` up to `rounds` times, stopping at the first failure
pub async fn check_rounds(probe: &dyn Probe, proxy: ProxyRecord, rounds: u32) -> CheckOutcome {
    let rounds = rounds.max(1);
    for attempt in 1..=rounds {
        if let Err(err) = probe.probe(&proxy).await {
            return CheckOutcome::failed(proxy, attempt, err);
        }
    }
    CheckOutcome::passed(proxy, rounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::error::ProbeError;
    use crate::proxy::models::Protocol;
    use crate::proxy::testing::ScriptedProbe;
    use std::collections::HashSet;
    use std::time::Duration;

    fn jobs(count: usize) -> Vec<ProxyRecord> {
        (0..count)
            .map(|i| ProxyRecord::new(&format!("10.0.0.{i}"), "8080", Protocol::Http, "t"))
            .collect()
    }

    async fn drain(mut rx: mpsc::Receiver<PoolEvent>) -> (usize, Vec<CheckOutcome>) {
        let mut progress = 0;
        let mut valid = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                PoolEvent::Valid(outcome) => valid.push(outcome),
                PoolEvent::Progress { .. } => progress += 1,
                PoolEvent::Completed => break,
            }
        }
        (progress, valid)
    }

    #[tokio::test]
    async fn test_check_rounds_all_pass() {
        let probe = ScriptedProbe::passing();
        let proxy = ProxyRecord::new("1.1.1.1", "80", Protocol::Http, "t");
        let outcome = check_rounds(&probe, proxy, 3).await;
        assert!(outcome.valid);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test]
    async fn test_check_rounds_stops_at_first_failure() {
        let probe = ScriptedProbe::passing().fail_after(1);
        let proxy = ProxyRecord::new("1.1.1.1", "80", Protocol::Http, "t");
        let outcome = check_rounds(&probe, proxy, 5).await;
        assert!(!outcome.valid);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(probe.calls(), 2);
        assert!(matches!(outcome.last_error, Some(ProbeError::Dial(_))));
    }

    #[tokio::test]
    async fn test_every_job_claimed_once() {
        for (count, concurrency) in [(1, 1), (7, 3), (20, 4), (16, 16)] {
            let probe = Arc::new(ScriptedProbe::passing());
            let (tx, rx) = mpsc::channel(8);
            let handle = WorkerPool::new(probe.clone(), 1, concurrency).spawn(
                jobs(count),
                tx,
                Reporter::silent(),
                CancellationToken::new(),
            );

            let (progress, valid) = drain(rx).await;
            handle.await.unwrap();

            assert_eq!(progress, count);
            assert_eq!(valid.len(), count);
            let claimed = probe.hosts();
            assert_eq!(claimed.len(), count);
            assert_eq!(claimed.iter().collect::<HashSet<_>>().len(), count);
        }
    }

    #[tokio::test]
    async fn test_failures_emit_progress_only() {
        let probe = Arc::new(ScriptedProbe::passing().with_failing_host("10.0.0.1"));
        let (tx, rx) = mpsc::channel(8);
        let handle = WorkerPool::new(probe, 2, 2).spawn(
            jobs(3),
            tx,
            Reporter::silent(),
            CancellationToken::new(),
        );

        let (progress, valid) = drain(rx).await;
        handle.await.unwrap();

        assert_eq!(progress, 3);
        assert_eq!(valid.len(), 2);
        assert!(valid.iter().all(|o| o.attempts == 2));
        assert!(valid.iter().all(|o| o.proxy.host != "10.0.0.1"));
    }

    #[tokio::test]
    async fn test_cancelled_pool_claims_nothing() {
        let probe = Arc::new(ScriptedProbe::passing());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (tx, rx) = mpsc::channel(8);
        let handle = WorkerPool::new(probe.clone(), 1, 4).spawn(
            jobs(50),
            tx,
            Reporter::silent(),
            cancel,
        );

        let (progress, _) = drain(rx).await;
        handle.await.unwrap();

        assert_eq!(progress, 0);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_job_claimed_after_cancel() {
        let cancel = CancellationToken::new();
        let probe = Arc::new(
            ScriptedProbe::passing()
                .with_delay(Duration::from_millis(5))
                .watching(cancel.clone()),
        );

        let (tx, mut rx) = mpsc::channel(1000);
        let handle = WorkerPool::new(probe.clone(), 1, 3).spawn(
            jobs(60),
            tx,
            Reporter::silent(),
            cancel.clone(),
        );

        let mut valid = 0;
        let mut progress = 0;
        while let Some(event) = rx.recv().await {
            match event {
                PoolEvent::Valid(_) => {
                    valid += 1;
                    if valid == 4 {
                        cancel.cancel();
                    }
                }
                PoolEvent::Progress { .. } => progress += 1,
                PoolEvent::Completed => break,
            }
        }
        handle.await.unwrap();

        assert_eq!(probe.calls_after_cancel(), 0);
        assert!(probe.calls() >= 4);
        assert!(probe.calls() < 60);
        // claimed jobs still report, even those finishing after the cancel
        assert_eq!(progress, probe.calls());
    }

    #[tokio::test]
    async fn test_empty_job_set_completes() {
        let probe = Arc::new(ScriptedProbe::passing());
        let (tx, rx) = mpsc::channel(8);
        let handle = WorkerPool::new(probe, 1, 3).spawn(
            Vec::new(),
            tx,
            Reporter::silent(),
            CancellationToken::new(),
        );

        let (progress, valid) = drain(rx).await;
        handle.await.unwrap();
        assert_eq!(progress, 0);
        assert!(valid.is_empty());
    }
}
