use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::EmployeeId;

/// Per-employee mutual exclusion for operations that mutate a pointer.
///
/// Handles are created on demand and dropped from the map once no task holds or
/// awaits them, so the map stays bounded by the number of in-flight ids.
#[derive(Default)]
pub struct IdLocks {
    locks: Mutex<HashMap<EmployeeId, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of a serialized operation
pub struct IdLockGuard<'a> {
    owner: &'a IdLocks,
    id: EmployeeId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, id: &EmployeeId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(id.clone()).or_default().clone()
    }

    pub async fn lock(&self, id: &EmployeeId) -> IdLockGuard<'_> {
        let guard = self.handle(id).lock_owned().await;
        IdLockGuard {
            owner: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    /// Lock two ids in a fixed order so opposing renames cannot deadlock
    pub async fn lock_pair(&self, a: &EmployeeId, b: &EmployeeId) -> (IdLockGuard<'_>, Option<IdLockGuard<'_>>) {
        if a == b {
            return (self.lock(a).await, None);
        }
        let (first, second) = if a.as_str() < b.as_str() { (a, b) } else { (b, a) };
        let first = self.lock(first).await;
        let second = self.lock(second).await;
        (first, Some(second))
    }

    /// Number of ids with a live handle
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: &EmployeeId) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Only the map itself still holds the handle: nobody waits on it
        if locks.get(id).is_some_and(|handle| Arc::strong_count(handle) == 1) {
            locks.remove(id);
        }
    }
}

impl Drop for IdLockGuard<'_> {
    fn drop(&mut self) {
        // Release the mutex (and its Arc) before pruning
        self.guard.take();
        self.owner.release(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn id(raw: &str) -> EmployeeId {
        EmployeeId::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn same_id_is_serialized() {
        let locks = Arc::new(IdLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&id("42")).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn distinct_ids_do_not_block_each_other() {
        let locks = IdLocks::new();
        let _a = locks.lock(&id("1")).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(&id("2"))).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn pair_locking_handles_both_orders() {
        let locks = Arc::new(IdLocks::new());
        let l1 = locks.clone();
        let l2 = locks.clone();

        let forward = tokio::spawn(async move {
            for _ in 0..20 {
                let _g = l1.lock_pair(&id("a"), &id("b")).await;
                tokio::task::yield_now().await;
            }
        });
        let backward = tokio::spawn(async move {
            for _ in 0..20 {
                let _g = l2.lock_pair(&id("b"), &id("a")).await;
                tokio::task::yield_now().await;
            }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            forward.await.unwrap();
            backward.await.unwrap();
        })
        .await
        .expect("opposing pair locks must not deadlock");
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn pair_with_same_id_locks_once() {
        let locks = IdLocks::new();
        let (_first, second) = locks.lock_pair(&id("7"), &id("7")).await;
        assert!(second.is_none());
    }
}
