use std::sync::atomic::{AtomicI32, Ordering};
use tracing::error;

use crate::protocol::EntityId;

/// Default first id, above the range the host hands out to real entities
pub const DEFAULT_ENTITY_ID_SEED: EntityId = 100_000;

/// Hands out display entity ids. Ids are never reused, so a stale message
/// can never address a newer entity.
#[derive(Debug)]
pub struct EntityIdAllocator {
    next: AtomicI32,
}

impl EntityIdAllocator {
    pub fn new(seed: EntityId) -> Self {
        Self {
            next: AtomicI32::new(seed),
        }
    }

    /// Next unused id. None once the id space is exhausted.
    pub fn allocate(&self) -> Option<EntityId> {
        match self
            .next
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
        {
            Ok(id) => Some(id),
            Err(last) => {
                error!("Entity id space exhausted at {}", last);
                None
            }
        }
    }

    /// The id the next call to `allocate` returns
    pub fn peek(&self) -> EntityId {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for EntityIdAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_ENTITY_ID_SEED)
    }
}
