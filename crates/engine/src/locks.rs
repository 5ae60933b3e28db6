//! In-process mutual exclusion scoped to one document.
//!
//! Transitions on the same document queue behind each other; different
//! documents never contend. Each entry counts its holder and waiters and is
//! dropped when that count reaches zero, including when a waiting `acquire`
//! is cancelled, so the registry stays proportional to in-flight work.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use docflow_core::domain::document::DocumentId;

#[derive(Debug, Default)]
struct Entry {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

type Registry = Arc<Mutex<HashMap<DocumentId, Entry>>>;

#[derive(Clone, Debug, Default)]
pub struct DocumentLocks {
    registry: Registry,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, document_id: &DocumentId) -> DocumentGuard {
        let (registration, lock) = Registration::register(&self.registry, document_id);
        // Dropping this future mid-wait drops `registration`, which unregisters.
        let guard = lock.lock_owned().await;

        DocumentGuard { _guard: guard, _registration: registration }
    }

    /// Number of documents currently locked or awaited.
    pub fn active(&self) -> usize {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

/// Counts one holder or waiter against a registry entry for as long as it lives.
struct Registration {
    registry: Registry,
    document_id: DocumentId,
}

impl Registration {
    fn register(registry: &Registry, document_id: &DocumentId) -> (Self, Arc<AsyncMutex<()>>) {
        let lock = {
            let mut entries = registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let entry = entries.entry(document_id.clone()).or_default();
            entry.users += 1;
            Arc::clone(&entry.lock)
        };
        (Self { registry: Arc::clone(registry), document_id: document_id.clone() }, lock)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut entries = self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let idle = match entries.get_mut(&self.document_id) {
            Some(entry) => {
                entry.users = entry.users.saturating_sub(1);
                entry.users == 0
            }
            None => false,
        };
        if idle {
            entries.remove(&self.document_id);
        }
    }
}

/// Held for the duration of one transition. Fields drop in order: the lock
/// is released before the registration is counted out.
pub struct DocumentGuard {
    _guard: OwnedMutexGuard<()>,
    _registration: Registration,
}
