use crate::core::{StorageError, StorageResult};
use std::fmt;

/// Generational entity identifier.
///
/// Same contract as [`Handle`](crate::core::Handle): equality requires both
/// the index and the generation to match, and a destroyed entity never
/// compares equal to whatever later reuses its slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index, used to address the sparse arrays of component storages.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

/// Allocates and recycles entity ids.
///
/// Destroyed slots go onto a LIFO free list and have their generation
/// bumped immediately, so `create` hands back the new generation on reuse.
#[derive(Debug, Default)]
pub struct EntityManager {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_list: Vec<u32>,
    count: usize,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> StorageResult<Entity> {
        if let Some(index) = self.free_list.pop() {
            let i = index as usize;
            self.alive[i] = true;
            self.count += 1;
            return Ok(Entity::new(index, self.generations[i]));
        }

        let index = u32::try_from(self.generations.len())
            .ok()
            .filter(|i| *i != u32::MAX)
            .ok_or(StorageError::IndexExhausted)?;
        self.generations.try_reserve(1)?;
        self.alive.try_reserve(1)?;
        self.generations.push(0);
        self.alive.push(true);
        self.count += 1;
        Ok(Entity::new(index, 0))
    }

    /// Returns false for stale or already destroyed entities.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let i = entity.index as usize;
        self.alive[i] = false;
        self.generations[i] = self.generations[i].wrapping_add(1);
        self.free_list.push(entity.index);
        self.count -= 1;
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        let i = entity.index as usize;
        i < self.alive.len() && self.alive[i] && self.generations[i] == entity.generation
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Live entities in index order.
    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .map(|(i, _)| Entity::new(i as u32, self.generations[i]))
    }

    pub fn clear(&mut self) {
        let live: Vec<Entity> = self.iter_alive().collect();
        for entity in live {
            self.destroy(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycled_entity_has_new_generation() {
        let mut manager = EntityManager::new();
        let a = manager.create().unwrap();
        assert!(manager.destroy(a));
        let b = manager.create().unwrap();
        assert_eq!(a.index(), b.index());
        assert_eq!(b.generation(), a.generation() + 1);
        assert!(!manager.is_alive(a));
        assert!(manager.is_alive(b));
    }

    #[test]
    fn double_destroy_is_rejected() {
        let mut manager = EntityManager::new();
        let e = manager.create().unwrap();
        assert!(manager.destroy(e));
        assert!(!manager.destroy(e));
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn iter_alive_skips_destroyed() {
        let mut manager = EntityManager::new();
        let entities: Vec<_> = (0..4).map(|_| manager.create().unwrap()).collect();
        manager.destroy(entities[1]);
        let alive: Vec<_> = manager.iter_alive().collect();
        assert_eq!(alive, vec![entities[0], entities[2], entities[3]]);
    }

    #[test]
    fn invalid_entity_is_never_alive() {
        let mut manager = EntityManager::new();
        manager.create().unwrap();
        assert!(!manager.is_alive(Entity::INVALID));
    }
}
