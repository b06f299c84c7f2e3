//! Human-readable status stream consumed by whatever displays the run

use crate::proxy::models::RunSummary;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Log(String),
    Progress {
        checked: usize,
        total: usize,
        valid: usize,
    },
    /// Sent exactly once per run
    Finished(RunSummary),
}

pub type StatusSender = mpsc::UnboundedSender<StatusUpdate>;
pub type StatusReceiver = mpsc::UnboundedReceiver<StatusUpdate>;

pub fn status_channel() -> (StatusSender, StatusReceiver) {
    mpsc::unbounded_channel()
}

/// Cloneable handle for emitting status updates; silent when nobody listens
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<StatusSender>,
}

impl Reporter {
    pub fn new(tx: Option<StatusSender>) -> Self {
        Self { tx }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn log(&self, message: impl Into<String>) {
        self.send(StatusUpdate::Log(message.into()));
    }

    pub fn progress(&self, checked: usize, total: usize, valid: usize) {
        self.send(StatusUpdate::Progress {
            checked,
            total,
            valid,
        });
    }

    pub fn finished(&self, summary: RunSummary) {
        self.send(StatusUpdate::Finished(summary));
    }

    fn send(&self, update: StatusUpdate) {
        if let Some(tx) = &self.tx {
            // a dropped display must not fail the run
            let _ = tx.send(update);
        }
    }
}
