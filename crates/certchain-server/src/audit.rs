//! Audit trail outbox.
//!
//! Secondary audit writes (certificate events, follow-up transaction rows and
//! settlements) are emitted here instead of being written inline. A worker
//! drains the queue into the [`Store`], retrying failed writes up to a bound.
//! Records that exhaust their attempts are kept in a dead-letter list and
//! logged at error level with their full content, so nothing is dropped
//! silently.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::{NewCertificateEvent, NewWeb3Tx, TxSettlement};
use crate::store::{Store, StoreError};

/// A pending audit write.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Event(NewCertificateEvent),
    Transaction(NewWeb3Tx),
    Settlement { tx_id: Uuid, settlement: TxSettlement },
}

/// A record that could not be written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub record: AuditRecord,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub written: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
}

struct Pending {
    record: AuditRecord,
    attempts: u32,
}

pub struct AuditOutbox {
    store: Arc<dyn Store>,
    max_attempts: u32,
    queue: Mutex<VecDeque<Pending>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    notify: Notify,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AuditOutbox {
    pub fn new(store: Arc<dyn Store>, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            queue: Mutex::new(VecDeque::new()),
            dead_letters: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Queues a record and wakes the worker. Never fails.
    pub fn emit(&self, record: AuditRecord) {
        locked(&self.queue).push_back(Pending {
            record,
            attempts: 0,
        });
        self.notify.notify_one();
    }

    pub fn pending(&self) -> usize {
        locked(&self.queue).len()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        locked(&self.dead_letters).clone()
    }

    async fn write(&self, record: &AuditRecord) -> Result<(), StoreError> {
        match record {
            AuditRecord::Event(event) => {
                self.store.insert_event(event.clone()).await?;
            }
            AuditRecord::Transaction(tx) => {
                self.store.insert_web3_tx(tx.clone()).await?;
            }
            AuditRecord::Settlement { tx_id, settlement } => {
                if self.store.settle_web3_tx(*tx_id, settlement).await?.is_none() {
                    warn!(tx_id = %tx_id, "Transaction row missing or already settled");
                }
            }
        }
        Ok(())
    }

    /// Makes one write attempt for every queued record.
    pub async fn drain(&self) -> DrainReport {
        let batch: Vec<Pending> = locked(&self.queue).drain(..).collect();
        let mut report = DrainReport::default();

        for mut pending in batch {
            pending.attempts += 1;
            match self.write(&pending.record).await {
                Ok(()) => report.written += 1,
                Err(e) if pending.attempts >= self.max_attempts => {
                    let record = serde_json::to_string(&pending.record).unwrap_or_default();
                    error!(
                        attempts = pending.attempts,
                        record = %record,
                        "Audit record dead-lettered: {}",
                        e
                    );
                    locked(&self.dead_letters).push(DeadLetter {
                        record: pending.record,
                        attempts: pending.attempts,
                        last_error: e.to_string(),
                    });
                    report.dead_lettered += 1;
                }
                Err(e) => {
                    warn!(attempts = pending.attempts, "Audit write failed, will retry: {}", e);
                    locked(&self.queue).push_back(pending);
                    report.requeued += 1;
                }
            }
        }

        if report != DrainReport::default() {
            debug!(?report, "Audit outbox drained");
        }
        report
    }

    /// Worker loop: drains whenever records arrive, and every `retry_every`
    /// while retries are outstanding.
    pub async fn run(self: Arc<Self>, retry_every: Duration) {
        loop {
            if self.pending() == 0 {
                self.notify.notified().await;
            } else {
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = tokio::time::sleep(retry_every) => {}
                }
            }
            self.drain().await;
        }
    }
}
