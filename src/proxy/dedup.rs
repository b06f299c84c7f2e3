//! Collapses candidate records into one record per `host:port`
//!
//! Policy is last-write-wins: records are applied in the order they are
//! pushed and a later record with the same address replaces the earlier one,
//! protocol and source included. Sources are fetched concurrently, so which
//! list wins for a shared address depends on fetch completion order and is
//! deliberately left unspecified. The position of an address in the output is
//! the position where it was first seen.

use crate::proxy::models::ProxyRecord;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Default)]
pub struct Deduplicator {
    filter: Option<String>,
    index: HashMap<String, usize>,
    records: Vec<ProxyRecord>,
    filtered_out: usize,
}

impl Deduplicator {
    /// `filter` keeps only records whose protocol tag matches,
    /// case-insensitively. `None` or an empty string keeps everything.
    pub fn new(filter: Option<&str>) -> Self {
        let filter = filter
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty());

        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn push(&mut self, record: ProxyRecord) {
        if let Some(filter) = &self.filter {
            if !record.protocol.as_str().eq_ignore_ascii_case(filter) {
                self.filtered_out += 1;
                return;
            }
        }

        let key = record.address();
        match self.index.get(&key) {
            Some(&slot) => self.records[slot] = record,
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = ProxyRecord>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    /// Consume record batches until every sender is dropped
    pub async fn collect_from(&mut self, mut rx: mpsc::Receiver<Vec<ProxyRecord>>) {
        while let Some(batch) = rx.recv().await {
            self.extend(batch);
        }
    }

    pub fn finish(self) -> DedupSet {
        if self.filtered_out > 0 {
            trace!(dropped = self.filtered_out, "records dropped by protocol filter");
        }

        DedupSet {
            records: self.records,
        }
    }
}

/// Unique-by-address candidates ready to be checked
#[derive(Debug, Clone, Default)]
pub struct DedupSet {
    records: Vec<ProxyRecord>,
}

impl DedupSet {
    /// Number of proxies the run will check, used for progress accounting
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<ProxyRecord> {
        self.records
    }
}

/// Filter and deduplicate a batch in one call
pub fn deduplicate<I>(records: I, filter: Option<&str>) -> DedupSet
where
    I: IntoIterator<Item = ProxyRecord>,
{
    let mut dedup = Deduplicator::new(filter);
    dedup.extend(records);
    dedup.finish()
}
