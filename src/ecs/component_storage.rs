use super::Entity;
use crate::core::StorageResult;
use std::any::Any;

/// Sparse-set storage for components of type `T`.
///
/// `sparse` maps `entity.index` to a position in the parallel `dense` and
/// `dense_entities` arrays. Removal swaps the last dense element into the
/// hole, so the dense arrays stay gap-free and are iterated directly.
pub struct ComponentStorage<T> {
    dense: Vec<T>,
    dense_entities: Vec<Entity>,
    sparse: Vec<Option<u32>>,
}

impl<T> Default for ComponentStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ComponentStorage<T> {
    pub fn new() -> Self {
        Self {
            dense: Vec::new(),
            dense_entities: Vec::new(),
            sparse: Vec::new(),
        }
    }

    fn dense_index(&self, entity: Entity) -> Option<usize> {
        let i = (*self.sparse.get(entity.index() as usize)?)? as usize;
        (self.dense_entities[i] == entity).then_some(i)
    }

    /// Add or replace the component of `entity`.
    ///
    /// A stale entity occupying the same index is overwritten in place.
    /// Returns the replaced value when `entity` itself already had one.
    pub fn insert(&mut self, entity: Entity, value: T) -> StorageResult<Option<T>> {
        let idx = entity.index() as usize;
        if idx >= self.sparse.len() {
            self.sparse.try_reserve(idx + 1 - self.sparse.len())?;
            self.sparse.resize(idx + 1, None);
        }

        if let Some(dense_idx) = self.sparse[idx] {
            let di = dense_idx as usize;
            let previous = std::mem::replace(&mut self.dense[di], value);
            let same = self.dense_entities[di] == entity;
            self.dense_entities[di] = entity;
            return Ok(same.then_some(previous));
        }

        self.dense.try_reserve(1)?;
        self.dense_entities.try_reserve(1)?;
        self.sparse[idx] = Some(self.dense.len() as u32);
        self.dense.push(value);
        self.dense_entities.push(entity);
        Ok(None)
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.dense_index(entity).map(|i| &self.dense[i])
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.dense_index(entity).map(|i| &mut self.dense[i])
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.dense_index(entity).is_some()
    }

    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let dense_idx = self.dense_index(entity)?;
        self.sparse[entity.index() as usize] = None;

        let last = self.dense.len() - 1;
        if dense_idx != last {
            let moved = self.dense_entities[last];
            self.sparse[moved.index() as usize] = Some(dense_idx as u32);
        }
        self.dense_entities.swap_remove(dense_idx);
        Some(self.dense.swap_remove(dense_idx))
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Owning entities in dense order.
    pub fn entities(&self) -> &[Entity] {
        &self.dense_entities
    }

    /// Component values in dense order, parallel to [`entities`](Self::entities).
    pub fn components(&self) -> &[T] {
        &self.dense
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.dense_entities.iter().copied().zip(self.dense.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.dense_entities.iter().copied().zip(self.dense.iter_mut())
    }

    pub fn clear(&mut self) {
        self.dense.clear();
        self.dense_entities.clear();
        self.sparse.clear();
    }

    /// Verifies the sparse/dense bijection. Linear in the storage size.
    pub fn check_integrity(&self) -> bool {
        if self.dense.len() != self.dense_entities.len() {
            return false;
        }
        let forward = self.dense_entities.iter().enumerate().all(|(i, e)| {
            self.sparse.get(e.index() as usize).copied().flatten() == Some(i as u32)
        });
        let mapped = self.sparse.iter().filter(|s| s.is_some()).count();
        forward && mapped == self.dense.len()
    }
}

/// Type-erased view of a component storage.
///
/// The scene keeps every storage behind this trait so destroying an entity
/// can strip it from storages whose component type it does not know.
pub trait AnyComponentStorage: Any {
    fn remove_entity(&mut self, entity: Entity) -> bool;
    fn contains_entity(&self, entity: Entity) -> bool;
    fn len(&self) -> usize;
    fn entities(&self) -> &[Entity];
    fn clear(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> AnyComponentStorage for ComponentStorage<T> {
    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn contains_entity(&self, entity: Entity) -> bool {
        self.contains(entity)
    }

    fn len(&self) -> usize {
        ComponentStorage::len(self)
    }

    fn entities(&self) -> &[Entity] {
        ComponentStorage::entities(self)
    }

    fn clear(&mut self) {
        ComponentStorage::clear(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(index: u32) -> Entity {
        Entity::new(index, 0)
    }

    #[test]
    fn swap_remove_keeps_other_values() {
        let mut storage = ComponentStorage::new();
        storage.insert(entity(0), 1).unwrap();
        storage.insert(entity(5), 2).unwrap();
        storage.insert(entity(10), 3).unwrap();

        assert_eq!(storage.remove(entity(5)), Some(2));
        assert_eq!(storage.get(entity(10)), Some(&3));
        assert_eq!(storage.get(entity(0)), Some(&1));
        assert_eq!(storage.get(entity(5)), None);
        assert_eq!(storage.len(), 2);
        assert!(storage.check_integrity());
    }

    #[test]
    fn remove_last_element() {
        let mut storage = ComponentStorage::new();
        storage.insert(entity(1), "a").unwrap();
        storage.insert(entity(2), "b").unwrap();
        assert_eq!(storage.remove(entity(2)), Some("b"));
        assert_eq!(storage.entities(), &[entity(1)]);
        assert!(storage.check_integrity());
    }

    #[test]
    fn replace_returns_previous() {
        let mut storage = ComponentStorage::new();
        assert_eq!(storage.insert(entity(3), 1.0).unwrap(), None);
        assert_eq!(storage.insert(entity(3), 2.0).unwrap(), Some(1.0));
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(entity(3)), Some(&2.0));
    }

    #[test]
    fn stale_entity_does_not_resolve() {
        let mut storage = ComponentStorage::new();
        let old = Entity::new(4, 0);
        let new = Entity::new(4, 1);
        storage.insert(old, 'x').unwrap();
        assert_eq!(storage.get(new), None);
        assert!(storage.remove(new).is_none());

        // Inserting for the recycled entity overwrites the stale record.
        assert_eq!(storage.insert(new, 'y').unwrap(), None);
        assert_eq!(storage.get(old), None);
        assert_eq!(storage.get(new), Some(&'y'));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn iteration_follows_dense_order() {
        let mut storage = ComponentStorage::new();
        for i in [7, 2, 9] {
            storage.insert(entity(i), i * 10).unwrap();
        }
        let collected: Vec<(u32, u32)> = storage.iter().map(|(e, v)| (e.index(), *v)).collect();
        assert_eq!(collected, vec![(7, 70), (2, 20), (9, 90)]);
    }

    #[test]
    fn type_erased_removal() {
        let mut storage: Box<dyn AnyComponentStorage> = Box::new(ComponentStorage::<u8>::new());
        storage
            .as_any_mut()
            .downcast_mut::<ComponentStorage<u8>>()
            .unwrap()
            .insert(entity(1), 9)
            .unwrap();
        assert!(storage.contains_entity(entity(1)));
        assert!(storage.remove_entity(entity(1)));
        assert!(!storage.remove_entity(entity(1)));
        assert_eq!(storage.len(), 0);
    }
}
