//! Entity Registry
//!
//! An id-to-entity lookup shared by collaborators, for example to map a
//! picked color id back to the shape that drew it.
//!
//! The registry is an ordinary value. Whoever owns a session creates one and
//! hands clones of it to the collaborators that need it; clones share the
//! same entries. There is no process-wide instance.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Identifier handed out by a [`Registry`].
///
/// Ids start at 1 and are never reused within one registry, so 0 is free to
/// mean "nothing" (e.g. the background in a picking buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

/// Thread-safe id-to-entity map with shared ownership.
pub struct Registry<T> {
    entries: Arc<DashMap<EntityId, T>>,
    next: Arc<AtomicU32>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Store `entity` and return its new id.
    pub fn register(&self, entity: T) -> EntityId {
        let id = EntityId(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(id, entity);
        tracing::trace!(%id, "registered entity");
        id
    }

    /// Remove an entity, returning it if it was present.
    pub fn remove(&self, id: EntityId) -> Option<T> {
        self.entries.remove(&id).map(|(_, entity)| entity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `f` to the entity, if present, without cloning it.
    pub fn with<R>(&self, id: EntityId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.entries.get(&id).map(|entry| f(entry.value()))
    }
}

impl<T: Clone> Registry<T> {
    /// A copy of the entity, if present.
    pub fn get(&self, id: EntityId) -> Option<T> {
        self.with(id, T::clone)
    }
}

impl<T> Clone for Registry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            next: Arc::clone(&self.next),
        }
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn ids_start_at_one_and_are_not_reused() {
        let registry = Registry::new();
        let a = registry.register("axis");
        let b = registry.register("plane");
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);

        assert_eq!(registry.remove(a), Some("axis"));
        let c = registry.register("point");
        assert_eq!(c.raw(), 3);
        assert!(!registry.contains(a));
    }

    #[test]
    fn clones_share_entries() {
        let registry = Registry::new();
        let view = registry.clone();
        let id = registry.register(String::from("edge"));

        assert_eq!(view.get(id).as_deref(), Some("edge"));
        assert_eq!(view.with(id, String::len), Some(4));
        view.remove(id);
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_registration() {
        let registry = Registry::new();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for i in 0..25 {
                        registry.register(t * 100 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 100);
    }
}
