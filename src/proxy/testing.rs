//! Scripted probe for exercising the pipeline without a network

use crate::proxy::error::ProbeError;
use crate::proxy::models::ProxyRecord;
use crate::proxy::probe::Probe;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct ScriptedProbe {
    pass_only: Option<HashSet<String>>,
    failing_hosts: HashSet<String>,
    fail_after: Option<usize>,
    delay: Option<Duration>,
    watched: Option<CancellationToken>,
    calls: AtomicUsize,
    calls_after_cancel: AtomicUsize,
    hosts: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn passing() -> Self {
        Self::default()
    }

    /// Passes only for the given `host:port` addresses
    pub fn only(addresses: &[&str]) -> Self {
        Self {
            pass_only: Some(addresses.iter().map(|a| a.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn with_failing_host(mut self, host: &str) -> Self {
        self.failing_hosts.insert(host.to_string());
        self
    }

    /// Every call after the first `n` fails
    pub fn fail_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Count calls that start while `cancel` is already cancelled
    pub fn watching(mut self, cancel: CancellationToken) -> Self {
        self.watched = Some(cancel);
        self
    }

    pub fn calls_after_cancel(&self) -> usize {
        self.calls_after_cancel.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Hosts in the order they were probed
    pub fn hosts(&self) -> Vec<String> {
        self.hosts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, proxy: &ProxyRecord) -> Result<(), ProbeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.hosts.lock().unwrap().push(proxy.host.clone());
        if self.watched.as_ref().is_some_and(|c| c.is_cancelled()) {
            self.calls_after_cancel.fetch_add(1, Ordering::SeqCst);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let allowed = self
            .pass_only
            .as_ref()
            .map_or(true, |only| only.contains(&proxy.address()));
        let exhausted = self.fail_after.is_some_and(|n| call >= n);

        if allowed && !exhausted && !self.failing_hosts.contains(&proxy.host) {
            Ok(())
        } else {
            Err(ProbeError::Dial("connection refused".to_string()))
        }
    }
}
