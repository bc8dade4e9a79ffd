use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<i64, Arc<Mutex<()>>>;

/// One async mutex per document id. Entries are removed once the last
/// holder or waiter is gone, so the map only tracks documents in flight.
#[derive(Clone, Default)]
pub struct DocumentLocks {
    map: Arc<StdMutex<LockMap>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, document_id: i64) -> DocumentLockGuard {
        let mutex = {
            let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(document_id).or_default().clone()
        };
        let guard = mutex.lock_owned().await;
        DocumentLockGuard {
            document_id,
            map: self.map.clone(),
            guard: Some(guard),
        }
    }

    /// Number of documents with a live lock entry.
    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.map.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct DocumentLockGuard {
    document_id: i64,
    map: Arc<StdMutex<LockMap>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentLockGuard {
    fn drop(&mut self) {
        // release first so the count below only sees the map and any waiters
        drop(self.guard.take());

        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = map.get(&self.document_id) {
            if Arc::strong_count(entry) == 1 {
                map.remove(&self.document_id);
            }
        }
    }
}
