use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per invoice id.
///
/// Every send path holds the invoice's lock from the read that decides what
/// to send until the ledger write, so the batch and a manual "send next"
/// cannot both deliver the same slot from this process.
#[derive(Default, Clone)]
pub struct InvoiceLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl InvoiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, invoice_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(invoice_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drops entries nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
