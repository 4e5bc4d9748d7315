use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::core::Result;

/// Per-entity async lock. Structural operations (publish, publish_changes,
/// withdraw) serialize on the entity id; different entities proceed in
/// parallel.
///
/// The map holds weak references: a guard keeps its mutex alive, and dead
/// entries are pruned on the next `acquire`, so the map does not grow with
/// every entity id ever locked.
#[derive(Default)]
pub struct EntityLockService {
    locks: StdMutex<HashMap<Uuid, Weak<Mutex<()>>>>,
}

impl EntityLockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, entity_id: Uuid) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self.locks.lock()?;
            map.retain(|_, entry| entry.strong_count() > 0);
            match map.get(&entity_id).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(Mutex::new(()));
                    map.insert(entity_id, Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        Ok(lock.lock_owned().await)
    }

    /// Lock several entities at once, always in id order, so overlapping
    /// multi-entity operations cannot deadlock on each other.
    pub async fn acquire_all(&self, ids: &[Uuid]) -> Result<Vec<OwnedMutexGuard<()>>> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            guards.push(self.acquire(id).await?);
        }
        Ok(guards)
    }
}
