//! Registry of live connection tasks.
//!
//! The one piece of state shared across all connections: shutdown needs to
//! enumerate whatever is still alive after the drain deadline and force-close
//! it. Registration is race-free with respect to that enumeration: the
//! registry lock spans both the insertion and the spawn, so a task is either
//! not started yet or visible to `abort_all`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::AbortHandle;
use tokio_util::task::TaskTracker;

use crate::observer::ServerObserver;

#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionRegistry {
    slots: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    /// Spawns a connection task on the tracker and registers it for forced
    /// shutdown. The entry is removed when the task ends (normal return,
    /// panic or abort alike) via the drop guard owned by the task future.
    pub(crate) fn spawn_on(
        &self,
        tracker: &TaskTracker,
        observer: Arc<dyn ServerObserver>,
        task: impl Future<Output = ()> + Send + 'static,
    ) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = RegistryGuard { registry: self.clone(), id, observer };

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = tracker.spawn(async move {
            guard.observer.task_started();
            let _guard = guard;
            task.await;
        });
        slots.insert(id, handle.abort_handle());
    }

    /// Force-closes every task still registered. Returns how many were hit.
    pub(crate) fn abort_all(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let count = slots.len();
        for (_, handle) in slots.drain() {
            handle.abort();
        }
        count
    }

    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn remove(&self, id: u64) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
    }
}

/// Deregisters the task and reports its exit, whichever way it ended.
struct RegistryGuard {
    registry: ConnectionRegistry,
    id: u64,
    observer: Arc<dyn ServerObserver>,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        self.observer.task_exited();
    }
}
