//! Consumer-side scratch cache keyed on arena generation.
//!
//! Code that builds expensive per-scope structures (index tables, views
//! over arena blocks) can park them in a [`GenerationCache`]. The cache is
//! reused while the arena stays in the same scope generation and rebuilt
//! on the first access after the generation changes.

use loam_core::{ArenaId, GenerationId};

use crate::arena::Arena;

/// A value valid for one arena scope generation.
#[derive(Debug)]
pub struct GenerationCache<T> {
    key: Option<(ArenaId, GenerationId)>,
    value: Option<T>,
    rebuilds: u64,
}

impl<T> GenerationCache<T> {
    /// An empty cache.
    pub fn new() -> Self {
        Self {
            key: None,
            value: None,
            rebuilds: 0,
        }
    }

    /// The cached value for `arena`'s current generation, building it with
    /// `build` if the cache is empty or stale.
    pub fn get_or_insert_with(&mut self, arena: &Arena, build: impl FnOnce() -> T) -> &mut T {
        let key = (arena.id(), arena.generation());
        if self.key != Some(key) {
            self.value = None;
            self.key = Some(key);
        }
        self.value.get_or_insert_with(|| {
            self.rebuilds += 1;
            build()
        })
    }

    /// The cached value, if it is still valid for `arena`.
    pub fn get(&self, arena: &Arena) -> Option<&T> {
        if self.is_valid_for(arena) {
            self.value.as_ref()
        } else {
            None
        }
    }

    /// Whether the cache holds a value for `arena`'s current generation.
    pub fn is_valid_for(&self, arena: &Arena) -> bool {
        self.value.is_some() && self.key == Some((arena.id(), arena.generation()))
    }

    /// Drop the cached value.
    pub fn invalidate(&mut self) {
        self.key = None;
        self.value = None;
    }

    /// Number of times the value has been built.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }
}

impl<T> Default for GenerationCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AllocationPolicy, ArenaConfig, LearningPolicy};

    fn arena() -> Arena {
        Arena::new(
            "cache",
            ArenaConfig::new(1024)
                .with_allocation(AllocationPolicy::Strict)
                .with_learning(LearningPolicy::None),
        )
        .unwrap()
    }

    #[test]
    fn reused_within_generation() {
        let mut arena = arena();
        let mut cache = GenerationCache::new();
        arena.enter(None).unwrap();
        *cache.get_or_insert_with(&arena, || 1) += 1;
        assert_eq!(*cache.get_or_insert_with(&arena, || 100), 2);
        assert_eq!(cache.rebuilds(), 1);
    }

    #[test]
    fn rebuilt_after_generation_changes() {
        let mut arena = arena();
        let mut cache = GenerationCache::new();
        arena.enter(None).unwrap();
        cache.get_or_insert_with(&arena, || vec![1, 2, 3]);
        arena.close().unwrap();
        assert!(cache.is_valid_for(&arena), "closing does not bump the generation");

        arena.enter(None).unwrap();
        assert!(cache.get(&arena).is_none());
        assert_eq!(cache.get_or_insert_with(&arena, Vec::new).len(), 0);
        assert_eq!(cache.rebuilds(), 2);
    }

    #[test]
    fn nested_entry_keeps_cache() {
        let mut arena = arena();
        let mut cache = GenerationCache::new();
        arena.enter(None).unwrap();
        cache.get_or_insert_with(&arena, || 7u32);
        arena.enter(Some(arena.id())).unwrap();
        assert_eq!(cache.get(&arena), Some(&7));
    }

    #[test]
    fn invalidate_clears() {
        let mut arena = arena();
        let mut cache = GenerationCache::new();
        arena.enter(None).unwrap();
        cache.get_or_insert_with(&arena, || 1u8);
        cache.invalidate();
        assert!(!cache.is_valid_for(&arena));
    }

    #[test]
    fn different_arenas_do_not_share() {
        let mut a = arena();
        let mut b = arena();
        a.enter(None).unwrap();
        b.enter(None).unwrap();
        let mut cache = GenerationCache::new();
        cache.get_or_insert_with(&a, || 'a');
        assert!(cache.get(&b).is_none());
    }
}
